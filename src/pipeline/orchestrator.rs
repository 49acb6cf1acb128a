use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use crate::catalog::{Destination, DestinationLookup, PublishMode};
use crate::changeset::WorkSet;
use crate::config::{Config, TimeoutConfig};
use crate::error::{FailureCause, Stage};
use crate::state::{ItemRegistry, StateStore};
use crate::summary::{Outcome, ResultAggregator, SummaryEntry};
use super::batch::{plan_batches, Batch, PlannedItem};
use super::collaborators::{ArtifactHandle, Extracted, Extractor, Publisher};
use super::retry::RetryPolicy;
use super::unit::{BatchTracker, ItemState};

#[derive(Debug, Clone, Default)]
pub struct StageTimeouts {
    pub extract: Option<Duration>,
    pub package: Option<Duration>,
    pub publish: Option<Duration>,
    pub commit: Option<Duration>,
}

impl From<&TimeoutConfig> for StageTimeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            extract: config.extract_secs.map(Duration::from_secs),
            package: config.package_secs.map(Duration::from_secs),
            publish: config.publish_secs.map(Duration::from_secs),
            commit: config.commit_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub batch_updates: bool,
    pub timeouts: StageTimeouts,
    pub retry: RetryPolicy,
}

impl OrchestratorOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            concurrency: 4,
            batch_updates: true,
            timeouts: StageTimeouts::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_updates(mut self, batch_updates: bool) -> Self {
        self.batch_updates = batch_updates;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl From<&Config> for OrchestratorOptions {
    fn from(config: &Config) -> Self {
        Self::new(&config.output_dir)
            .with_concurrency(config.concurrency)
            .with_batch_updates(config.batch_updates)
            .with_timeouts(StageTimeouts::from(&config.timeouts))
            .with_retry(RetryPolicy::from(&config.retry))
    }
}

#[derive(Clone)]
struct Collaborators {
    extractor: Arc<dyn Extractor>,
    publisher: Arc<dyn Publisher>,
    store: Arc<dyn StateStore>,
    registry: Arc<ItemRegistry>,
    options: OrchestratorOptions,
}

/// Drives every work item through extract, package, publish, verify and
/// commit. A failing item is held back without affecting any other item.
pub struct Orchestrator {
    inner: Arc<Collaborators>,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        publisher: Arc<dyn Publisher>,
        store: Arc<dyn StateStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Collaborators {
                extractor,
                publisher,
                store,
                registry: Arc::new(ItemRegistry::in_memory()),
                options,
            }),
        }
    }

    /// Where item ids assigned by create-mode publishes are recorded.
    pub fn with_registry(mut self, registry: Arc<ItemRegistry>) -> Self {
        Arc::make_mut(&mut self.inner).registry = registry;
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.inner.options
    }

    pub fn registry(&self) -> &Arc<ItemRegistry> {
        &self.inner.registry
    }

    /// Processes `work` and records one entry per item, keyed by its
    /// position in the work set.
    pub async fn execute(&self, work: WorkSet, destinations: &DestinationLookup, aggregator: &mut ResultAggregator) {
        let plan = plan_batches(work.into_items(), destinations, self.inner.options.batch_updates);

        for (position, item) in plan.unroutable {
            warn!("{} has no destination entry; holding back", item.table);
            let outcome = Outcome::failure(FailureCause::NoDestination, Stage::Package);
            aggregator.record(position, SummaryEntry::for_item(&item, outcome));
        }

        info!(
            "Processing {} batches with concurrency {}",
            plan.batches.len(),
            self.inner.options.concurrency
        );

        let max_concurrent = self.inner.options.concurrency.max(1);
        let mut join_set = JoinSet::new();

        for batch in plan.batches {
            if join_set.len() >= max_concurrent {
                if let Some(result) = join_set.join_next().await {
                    Self::collect(result, aggregator);
                }
            }
            join_set.spawn(supervise(Arc::clone(&self.inner), batch));
        }

        while let Some(result) = join_set.join_next().await {
            Self::collect(result, aggregator);
        }
    }

    fn collect(result: Result<Vec<(usize, SummaryEntry)>, JoinError>, aggregator: &mut ResultAggregator) {
        match result {
            Ok(entries) => {
                for (position, entry) in entries {
                    aggregator.record(position, entry);
                }
            }
            Err(e) => error!("Batch supervisor failed: {}", e),
        }
    }
}

/// Runs the batch on its own task so a panic inside a collaborator only
/// takes down this batch's unfinished items.
async fn supervise(inner: Arc<Collaborators>, batch: Batch) -> Vec<(usize, SummaryEntry)> {
    let tracker = BatchTracker::new(&batch);
    let description = batch.describe();

    match tokio::spawn(run_batch(inner, batch, tracker.clone())).await {
        Ok(()) => tracker.into_entries(None),
        Err(e) => {
            let message = format!("{} aborted: {}", description, panic_message(e));
            error!("{}", message);
            tracker.into_entries(Some(&message))
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "task cancelled".to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

async fn bounded<T, F>(limit: Option<Duration>, fut: F) -> Result<T, FailureCause>
where
    F: Future<Output = Result<T, FailureCause>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            Err(FailureCause::Timeout {
                after_ms: limit.as_millis() as u64,
            })
        }),
        None => fut.await,
    }
}

async fn run_batch(inner: Arc<Collaborators>, batch: Batch, tracker: BatchTracker) {
    info!("Starting {}", batch.describe());
    let options = &inner.options;
    let output = options.output_dir.as_path();

    let mut extracted: Vec<(usize, Extracted)> = Vec::new();
    for (index, planned) in batch.items.iter().enumerate() {
        tracker.advance(index, ItemState::Extracting);
        let table = &planned.item.table;

        let result = bounded(options.timeouts.extract, async {
            inner.extractor.extract(table, output).await.map_err(|e| e.into_cause(1))
        })
        .await;

        match result {
            Ok(part) => {
                info!("Extracted {} ({} rows)", table, part.source_count);
                extracted.push((index, part));
            }
            Err(cause) => tracker.hold_back(index, cause, Stage::Extract),
        }
    }

    if extracted.is_empty() {
        return;
    }

    for (index, _) in &extracted {
        tracker.advance(*index, ItemState::Packaging);
    }
    let parts: Vec<Extracted> = extracted.iter().map(|(_, part)| part.clone()).collect();
    let packaged = bounded(options.timeouts.package, async {
        inner
            .extractor
            .package(output, &batch.key.unit, &parts)
            .await
            .map_err(|e| e.into_cause(1))
    })
    .await;

    let artifact = match packaged {
        Ok(artifact) => artifact,
        Err(cause) => {
            for (index, _) in &extracted {
                tracker.hold_back(*index, cause.clone(), Stage::Package);
            }
            return;
        }
    };

    for (index, part) in &extracted {
        publish_and_commit(&inner, &tracker, *index, &batch.items[*index], &artifact, part.source_count).await;
    }

    if tracker.all_committed() {
        match inner.publisher.release(&artifact).await {
            Ok(()) => debug!("Released artifact {}", artifact.id),
            Err(e) => warn!("Could not release artifact {}: {}", artifact.id, e),
        }
    } else {
        warn!(
            "Keeping artifact {} at {} for inspection",
            artifact.id,
            artifact.location.display()
        );
    }
}

async fn publish_and_commit(
    inner: &Collaborators,
    tracker: &BatchTracker,
    index: usize,
    planned: &PlannedItem,
    artifact: &ArtifactHandle,
    source_count: u64,
) {
    let options = &inner.options;
    let table = &planned.item.table;

    tracker.advance(index, ItemState::Publishing);
    let label = format!("publish {}", table);
    let published = bounded(
        options.timeouts.publish,
        options
            .retry
            .run(&label, || inner.publisher.publish(artifact, table, &planned.destination)),
    )
    .await;

    let published = match published {
        Ok(published) => published,
        Err(cause) => {
            tracker.hold_back(index, cause, Stage::Publish);
            return;
        }
    };

    tracker.advance(index, ItemState::Verifying);
    let outcome = if published.final_count == source_count {
        Outcome::Success {
            published_count: published.final_count,
        }
    } else {
        Outcome::CountMismatch {
            source_count,
            final_count: published.final_count,
        }
    };

    if planned.destination.mode() == PublishMode::Create {
        if let Some(item_id) = &published.item_id {
            let created = Destination::new(planned.destination.unit.as_str()).with_item_id(item_id.as_str());
            if let Err(e) = inner.registry.record(table, &created).await {
                error!("{} published as {} but the item id was not recorded: {}", table, item_id, e);
                let cause = FailureCause::StateCommitFailed { message: e.to_string() };
                tracker.hold_back(index, cause, Stage::Commit);
                return;
            }
        }
    }

    let fingerprint = &planned.item.current;
    let committed = bounded(options.timeouts.commit, async {
        inner
            .store
            .commit(table, fingerprint)
            .await
            .map_err(|e| FailureCause::StateCommitFailed { message: e.to_string() })
    })
    .await;

    match committed {
        Ok(()) => {
            info!("Committed {} at {}", table, fingerprint.short());
            let item_id = published.item_id.or_else(|| planned.destination.item_id.clone());
            tracker.commit(index, outcome, item_id);
        }
        Err(cause) => {
            error!("{} published but not committed: {}", table, cause);
            tracker.hold_back(index, cause, Stage::Commit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use crate::catalog::{Destination, Fingerprint, TableId};
    use crate::changeset::{WorkItem, WorkReason};
    use crate::pipeline::{CollaboratorError, Published};
    use crate::state::InMemoryStateStore;

    const ITEM_A: &str = "2d8b4ef1-6c5e-4c43-9f4e-0c1c8f7b9a10";
    const ITEM_B: &str = "7c1e0a52-33b4-4d8e-a1f2-9b0c6d5e4f31";

    fn table(name: &str) -> TableId {
        TableId::parse(name).unwrap()
    }

    struct BundlingExtractor;

    #[async_trait]
    impl Extractor for BundlingExtractor {
        async fn extract(&self, table: &TableId, output: &Path) -> Result<Extracted, CollaboratorError> {
            Ok(Extracted {
                artifact: ArtifactHandle::new(table.as_str(), output.join(table.as_str())),
                source_count: 10,
            })
        }

        async fn package(
            &self,
            output: &Path,
            unit: &str,
            parts: &[Extracted],
        ) -> Result<ArtifactHandle, CollaboratorError> {
            Ok(ArtifactHandle::new(format!("{}-{}", unit, parts.len()), output.join(unit)))
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        artifacts: Mutex<Vec<String>>,
        released: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            artifact: &ArtifactHandle,
            table: &TableId,
            _destination: &Destination,
        ) -> Result<Published, CollaboratorError> {
            self.artifacts.lock().unwrap().push(artifact.id.clone());
            if table.as_str() == "sgid.a.panics" {
                panic!("publisher exploded");
            }
            Ok(Published { final_count: 10, item_id: None })
        }

        async fn release(&self, artifact: &ArtifactHandle) -> Result<(), CollaboratorError> {
            self.released.lock().unwrap().push(artifact.id.clone());
            Ok(())
        }
    }

    fn work(names: &[&str]) -> WorkSet {
        let mut set = WorkSet::new();
        for name in names {
            set.push(WorkItem::new(table(name), Fingerprint::new(format!("{name}-fp")), WorkReason::Changed));
        }
        set
    }

    #[tokio::test]
    async fn test_update_batch_shares_one_artifact_and_releases_it() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryStateStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(BundlingExtractor),
            publisher.clone(),
            store.clone(),
            OrchestratorOptions::new("/tmp/hashsync-out"),
        );
        let destinations = DestinationLookup::new()
            .with(table("sgid.a.one"), Destination::new("web").with_item_id(ITEM_A))
            .with(table("sgid.a.two"), Destination::new("web").with_item_id(ITEM_B));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.one", "sgid.a.two"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        assert_eq!(summary.success_count(), 2);
        assert_eq!(*publisher.artifacts.lock().unwrap(), vec!["web-2".to_string(), "web-2".to_string()]);
        assert_eq!(*publisher.released.lock().unwrap(), vec!["web-2".to_string()]);
        assert_eq!(summary.entries[0].item_id.as_deref(), Some(ITEM_A));
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_panicking_batch_is_isolated() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryStateStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(BundlingExtractor),
            publisher.clone(),
            store.clone(),
            OrchestratorOptions::new("/tmp/hashsync-out").with_batch_updates(false),
        );
        let destinations = DestinationLookup::new()
            .with(table("sgid.a.panics"), Destination::new("web").with_item_id(ITEM_A))
            .with(table("sgid.a.fine"), Destination::new("web").with_item_id(ITEM_B));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.panics", "sgid.a.fine"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        assert_eq!(summary.entries.len(), 2);
        match &summary.entries[0].outcome {
            Outcome::Failure { cause: FailureCause::Internal { message }, stage } => {
                assert_eq!(*stage, Stage::Publish);
                assert!(message.contains("publisher exploded"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(summary.entries[1].outcome.is_success());

        let stored = store.get_all().await.unwrap();
        assert!(!stored.contains_key(&table("sgid.a.panics")));
        assert!(stored.contains_key(&table("sgid.a.fine")));
        assert!(publisher.released.lock().unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_stage_timeout_holds_back_item() {
        struct SlowExtractor;

        #[async_trait]
        impl Extractor for SlowExtractor {
            async fn extract(&self, table: &TableId, output: &Path) -> Result<Extracted, CollaboratorError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                BundlingExtractor.extract(table, output).await
            }
        }

        let store = Arc::new(InMemoryStateStore::new());
        let timeouts = StageTimeouts {
            extract: Some(Duration::from_millis(20)),
            ..StageTimeouts::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(SlowExtractor),
            Arc::new(RecordingPublisher::default()),
            store.clone(),
            OrchestratorOptions::new("/tmp/hashsync-out").with_timeouts(timeouts),
        );
        let destinations = DestinationLookup::new().with(table("sgid.a.one"), Destination::new("web"));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.one"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        assert_eq!(
            summary.entries[0].outcome,
            Outcome::failure(FailureCause::Timeout { after_ms: 20 }, Stage::Extract)
        );
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_package_failure_holds_back_whole_batch() {
        struct BrokenPackager;

        #[async_trait]
        impl Extractor for BrokenPackager {
            async fn extract(&self, table: &TableId, output: &Path) -> Result<Extracted, CollaboratorError> {
                BundlingExtractor.extract(table, output).await
            }

            async fn package(
                &self,
                _output: &Path,
                _unit: &str,
                _parts: &[Extracted],
            ) -> Result<ArtifactHandle, CollaboratorError> {
                Err(CollaboratorError::Extraction("disk full".into()))
            }
        }

        let publisher = Arc::new(RecordingPublisher::default());
        let store = Arc::new(InMemoryStateStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(BrokenPackager),
            publisher.clone(),
            store.clone(),
            OrchestratorOptions::new("/tmp/hashsync-out"),
        );
        let destinations = DestinationLookup::new()
            .with(table("sgid.a.one"), Destination::new("web").with_item_id(ITEM_A))
            .with(table("sgid.a.two"), Destination::new("web").with_item_id(ITEM_B));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.one", "sgid.a.two"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        let expected = Outcome::failure(FailureCause::Extraction { message: "disk full".into() }, Stage::Package);
        assert_eq!(summary.entries.len(), 2);
        assert!(summary.entries.iter().all(|e| e.outcome == expected));
        assert!(publisher.artifacts.lock().unwrap().is_empty());
        assert!(publisher.released.lock().unwrap().is_empty());
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_timeout_bounds_every_retry() {
        #[derive(Default)]
        struct UnavailablePublisher {
            calls: Mutex<u32>,
        }

        #[async_trait]
        impl Publisher for UnavailablePublisher {
            async fn publish(
                &self,
                _artifact: &ArtifactHandle,
                _table: &TableId,
                _destination: &Destination,
            ) -> Result<Published, CollaboratorError> {
                *self.calls.lock().unwrap() += 1;
                Err(CollaboratorError::Publish("503".into()))
            }
        }

        let publisher = Arc::new(UnavailablePublisher::default());
        let store = Arc::new(InMemoryStateStore::new());
        let timeouts = StageTimeouts {
            publish: Some(Duration::from_millis(30)),
            ..StageTimeouts::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(BundlingExtractor),
            publisher.clone(),
            store.clone(),
            OrchestratorOptions::new("/tmp/hashsync-out")
                .with_timeouts(timeouts)
                .with_retry(RetryPolicy::new(10, Duration::from_millis(200), 1.0)),
        );
        let destinations = DestinationLookup::new().with(table("sgid.a.one"), Destination::new("web").with_item_id(ITEM_A));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.one"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        assert_eq!(
            summary.entries[0].outcome,
            Outcome::failure(FailureCause::Timeout { after_ms: 30 }, Stage::Publish)
        );
        assert_eq!(*publisher.calls.lock().unwrap(), 1);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_timeout_holds_back_and_keeps_artifact() {
        struct StalledStore;

        #[async_trait]
        impl StateStore for StalledStore {
            async fn get_all(&self) -> crate::error::Result<crate::state::StoredFingerprints> {
                Ok(Default::default())
            }

            async fn commit(&self, _table: &TableId, _fingerprint: &Fingerprint) -> crate::error::Result<()> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }

            async fn compare_and_set(
                &self,
                _table: &TableId,
                _expected: Option<&Fingerprint>,
                _fingerprint: &Fingerprint,
            ) -> crate::error::Result<bool> {
                Ok(false)
            }

            fn describe(&self) -> String {
                "stalled".to_string()
            }
        }

        let publisher = Arc::new(RecordingPublisher::default());
        let timeouts = StageTimeouts {
            commit: Some(Duration::from_millis(20)),
            ..StageTimeouts::default()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(BundlingExtractor),
            publisher.clone(),
            Arc::new(StalledStore),
            OrchestratorOptions::new("/tmp/hashsync-out").with_timeouts(timeouts),
        );
        let destinations = DestinationLookup::new().with(table("sgid.a.one"), Destination::new("web").with_item_id(ITEM_A));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.one"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        assert_eq!(
            summary.entries[0].outcome,
            Outcome::failure(FailureCause::Timeout { after_ms: 20 }, Stage::Commit)
        );
        assert_eq!(publisher.artifacts.lock().unwrap().len(), 1);
        assert!(publisher.released.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_item_id_recorded_before_commit() {
        struct CreatingPublisher;

        #[async_trait]
        impl Publisher for CreatingPublisher {
            async fn publish(
                &self,
                _artifact: &ArtifactHandle,
                _table: &TableId,
                _destination: &Destination,
            ) -> Result<Published, CollaboratorError> {
                Ok(Published { final_count: 10, item_id: Some(ITEM_B.to_string()) })
            }
        }

        let registry = Arc::new(ItemRegistry::in_memory());
        let store = Arc::new(InMemoryStateStore::new());
        let orchestrator = Orchestrator::new(
            Arc::new(BundlingExtractor),
            Arc::new(CreatingPublisher),
            store.clone(),
            OrchestratorOptions::new("/tmp/hashsync-out"),
        )
        .with_registry(registry.clone());
        let destinations = DestinationLookup::new()
            .with(table("sgid.a.new"), Destination::new("web"))
            .with(table("sgid.a.old"), Destination::new("web").with_item_id(ITEM_A));

        let mut aggregator = ResultAggregator::new();
        orchestrator.execute(work(&["sgid.a.new", "sgid.a.old"]), &destinations, &mut aggregator).await;
        let summary = aggregator.finish();

        assert_eq!(summary.success_count(), 2);
        let created = registry.get_all().await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(
            created.get(&table("sgid.a.new")),
            Some(&Destination::new("web").with_item_id(ITEM_B))
        );
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    #[test]
    fn test_timeouts_from_config() {
        let timeouts = StageTimeouts::from(&TimeoutConfig {
            extract_secs: Some(600),
            package_secs: None,
            publish_secs: Some(900),
            commit_secs: Some(30),
        });
        assert_eq!(timeouts.extract, Some(Duration::from_secs(600)));
        assert_eq!(timeouts.package, None);
        assert_eq!(timeouts.commit, Some(Duration::from_secs(30)));
    }
}
