use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use crate::catalog::{
    Destination, DestinationLookup, DirectoryFingerprintSource, FingerprintSource, PublishMode,
    StaticFingerprintSource, TableId,
};
use crate::changeset::{ChangeSet, ChangeSetResolver, OverrideList, WorkSet};
use crate::config::Config;
use crate::error::Result;
use crate::local::{DirectoryExtractor, DirectoryPublisher};
use crate::pipeline::{Extractor, Orchestrator, OrchestratorOptions, Publisher};
use crate::state::{open_registry, open_store, ItemRegistry, StateStore};
use crate::summary::{ResultAggregator, RunSummary, SummaryEntry};

const KEEP_FILE: &str = ".gitkeep";

#[derive(Debug, Default)]
pub struct SeedReport {
    pub written: Vec<TableId>,
    /// Tables left alone because they already had a stored fingerprint.
    pub skipped: Vec<TableId>,
}

/// Wires a fingerprint source, a state store and the orchestrator into one
/// invocation.
pub struct SyncRunner {
    source: Arc<dyn FingerprintSource>,
    store: Arc<dyn StateStore>,
    destinations: DestinationLookup,
    fallback_unit: Option<String>,
    orchestrator: Orchestrator,
}

impl SyncRunner {
    pub fn new(
        source: Arc<dyn FingerprintSource>,
        store: Arc<dyn StateStore>,
        extractor: Arc<dyn Extractor>,
        publisher: Arc<dyn Publisher>,
        options: OrchestratorOptions,
    ) -> Self {
        let orchestrator = Orchestrator::new(extractor, publisher, Arc::clone(&store), options);
        Self {
            source,
            store,
            destinations: DestinationLookup::new(),
            fallback_unit: None,
            orchestrator,
        }
    }

    pub fn with_destinations(mut self, destinations: DestinationLookup) -> Self {
        self.destinations = destinations;
        self
    }

    /// Remembers create-mode item ids in `registry` so changed tables update
    /// the item they created instead of creating another.
    pub fn with_registry(mut self, registry: Arc<ItemRegistry>) -> Self {
        self.orchestrator = self.orchestrator.with_registry(registry);
        self
    }

    /// Tables without a destination entry are created in `unit` instead of
    /// failing with `NoDestination`.
    pub fn with_fallback_unit(mut self, unit: impl Into<String>) -> Self {
        self.fallback_unit = Some(unit.into());
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = DirectoryFingerprintSource::new(&config.catalog.directory)
            .with_pattern(&config.catalog.pattern);

        let source: Arc<dyn FingerprintSource> = match &config.catalog.fingerprints {
            Some(path) => Arc::new(StaticFingerprintSource::from_file(path)),
            None => Arc::new(catalog.clone()),
        };
        let store = open_store(config.environment, &config.state)?;
        let registry = open_registry(config.environment, &config.state)?;

        let runner = Self::new(
            source,
            store,
            Arc::new(DirectoryExtractor::new(catalog)),
            Arc::new(DirectoryPublisher::new(&config.publish_dir)),
            OrchestratorOptions::from(config),
        )
        .with_registry(registry);

        Ok(match &config.destinations {
            Some(path) => runner.with_destinations(DestinationLookup::load(path)?),
            None => runner.with_fallback_unit(&config.default_unit),
        })
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn FingerprintSource> {
        &self.source
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        self.orchestrator.registry()
    }

    /// Resolves the work set without touching anything.
    pub async fn plan(&self, overrides: &OverrideList) -> Result<ChangeSet> {
        ChangeSetResolver::new(self.source.as_ref(), self.store.as_ref())
            .resolve(overrides)
            .await
    }

    /// Full run. Global failures end up in the summary rather than as an `Err`.
    pub async fn run(&self, overrides: &OverrideList) -> RunSummary {
        let mut aggregator = ResultAggregator::new();

        if let Err(e) = clean_output_dir(&self.orchestrator.options().output_dir).await {
            aggregator.record_global_error(e);
            return aggregator.finish();
        }

        let changes = match self.plan(overrides).await {
            Ok(changes) => changes,
            Err(e) => {
                aggregator.record_global_error(e);
                return aggregator.finish();
            }
        };

        let ChangeSet { work, unknown, stale } = changes;
        aggregator.set_stale(stale);

        let offset = work.len();
        for (i, table) in unknown.into_iter().enumerate() {
            aggregator.record(offset + i, SummaryEntry::unknown_table(table));
        }

        if work.is_empty() {
            info!("No tables require processing");
        } else {
            match self.destinations_for(&work).await {
                Ok(destinations) => self.orchestrator.execute(work, &destinations, &mut aggregator).await,
                Err(e) => aggregator.record_global_error(e),
            }
        }

        aggregator.finish()
    }

    /// Writes every current fingerprint to the store without publishing.
    /// With `missing_only`, tables that already have an entry are skipped.
    pub async fn seed(&self, missing_only: bool) -> Result<SeedReport> {
        let snapshot = self.source.current_fingerprints().await?;
        let mut report = SeedReport::default();

        for record in snapshot.iter() {
            let written = if missing_only {
                self.store.compare_and_set(&record.table, None, &record.fingerprint).await?
            } else {
                self.store.commit(&record.table, &record.fingerprint).await?;
                true
            };

            if written {
                debug!("Seeded {} with {}", record.table, record.fingerprint.short());
                report.written.push(record.table.clone());
            } else {
                report.skipped.push(record.table.clone());
            }
        }

        info!("Seeded {} tables ({} skipped)", report.written.len(), report.skipped.len());
        Ok(report)
    }

    /// Configured update entries win. Otherwise an item created by an earlier
    /// run is updated in place, and anything left falls back to creating in
    /// the fallback unit.
    async fn destinations_for(&self, work: &WorkSet) -> Result<DestinationLookup> {
        let created = self.registry().get_all().await?;
        let mut destinations = self.destinations.clone();

        for item in work.iter() {
            let configured = destinations.get(&item.table).map(Destination::mode);
            if configured == Some(PublishMode::Update) {
                continue;
            }
            let reused = match created.get(&item.table) {
                Some(existing) => {
                    debug!("{} was created earlier as {:?}", item.table, existing.item_id);
                    destinations.insert(item.table.clone(), existing.clone())
                }
                None => false,
            };
            if !reused && configured.is_none() {
                if let Some(unit) = &self.fallback_unit {
                    destinations.insert(item.table.clone(), Destination::new(unit.as_str()));
                }
            }
        }
        Ok(destinations)
    }
}

/// Empties `dir`, creating it if needed. A `.gitkeep` marker survives.
pub async fn clean_output_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == KEEP_FILE {
            continue;
        }
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
        debug!("Removed {}", path.display());
    }
    Ok(())
}
