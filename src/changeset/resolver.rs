use std::collections::BTreeMap;
use tracing::{debug, info};
use crate::catalog::{CatalogSnapshot, FingerprintSource, TableId};
use crate::error::Result;
use crate::state::{StateStore, StoredFingerprints};
use super::work::{OverrideList, WorkItem, WorkReason, WorkSet};

/// What a run has to do, derived from one catalog snapshot and one read of
/// the state store.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub work: WorkSet,
    /// Override entries the catalog does not know, in the order given.
    pub unknown: Vec<TableId>,
    /// Stored entries for tables no longer in the catalog. Reported, never purged.
    pub stale: Vec<TableId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.work.is_empty() && self.unknown.is_empty()
    }

    pub fn by_reason(&self) -> BTreeMap<WorkReason, usize> {
        let mut counts: BTreeMap<WorkReason, usize> = BTreeMap::new();
        for item in self.work.iter() {
            *counts.entry(item.reason).or_default() += 1;
        }
        counts
    }
}

pub struct ChangeSetResolver<'a> {
    source: &'a dyn FingerprintSource,
    store: &'a dyn StateStore,
}

impl<'a> ChangeSetResolver<'a> {
    pub fn new(source: &'a dyn FingerprintSource, store: &'a dyn StateStore) -> Self {
        Self { source, store }
    }

    /// Reads both inputs once. Either read failing is a global error.
    pub async fn resolve(&self, overrides: &OverrideList) -> Result<ChangeSet> {
        let current = self.source.current_fingerprints().await?;
        info!("Catalog {} reports {} tables", self.source.describe(), current.len());

        let stored = self.store.get_all().await?;
        info!("State store {} holds {} entries", self.store.describe(), stored.len());

        let changes = Self::diff(&current, &stored, overrides);
        info!(
            "Resolved {} work items ({} unknown, {} stale)",
            changes.work.len(),
            changes.unknown.len(),
            changes.stale.len()
        );
        for (reason, count) in changes.by_reason() {
            info!("   {} {}", count, reason);
        }
        Ok(changes)
    }

    /// Pure diff of `current` against `stored`. A non-empty override list
    /// replaces change detection entirely.
    pub fn diff(current: &CatalogSnapshot, stored: &StoredFingerprints, overrides: &OverrideList) -> ChangeSet {
        let mut changes = ChangeSet::default();

        if overrides.is_empty() {
            for record in current.iter() {
                let reason = match stored.get(&record.table) {
                    None => WorkReason::Missing,
                    Some(previous) if previous != &record.fingerprint => WorkReason::Changed,
                    Some(_) => {
                        debug!("{} unchanged", record.table);
                        continue;
                    }
                };
                changes.work.push(WorkItem::new(record.table.clone(), record.fingerprint.clone(), reason));
            }
        } else {
            for record in current.iter().filter(|r| overrides.contains(&r.table)) {
                changes.work.push(WorkItem::new(
                    record.table.clone(),
                    record.fingerprint.clone(),
                    WorkReason::ForcedOverride,
                ));
            }
            changes.unknown = overrides
                .iter()
                .filter(|t| !current.contains(t))
                .cloned()
                .collect();
        }

        let mut stale: Vec<TableId> = stored
            .keys()
            .filter(|t| !current.contains(t))
            .cloned()
            .collect();
        stale.sort();
        changes.stale = stale;

        changes
    }
}
