use std::collections::HashMap;
use async_trait::async_trait;
use tracing::warn;
use crate::error::Result;
use super::table::{Fingerprint, FingerprintRecord, TableId};

/// Produces the current fingerprint of every candidate table.
///
/// Implementations must be side-effect free. Any failure to reach the
/// upstream catalog is reported as `HashSyncError::SourceUnavailable`, which
/// aborts the whole run.
#[async_trait]
pub trait FingerprintSource: Send + Sync {
    async fn current_fingerprints(&self) -> Result<CatalogSnapshot>;

    fn describe(&self) -> String;
}

/// Ordered snapshot of the catalog. Keeps the order tables were reported in
/// so run summaries are deterministic.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    records: Vec<FingerprintRecord>,
    index: HashMap<TableId, usize>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record. A table already present keeps its first fingerprint.
    pub fn push(&mut self, record: FingerprintRecord) -> bool {
        if self.index.contains_key(&record.table) {
            warn!("Duplicate catalog entry for {}, keeping the first", record.table);
            return false;
        }
        self.index.insert(record.table.clone(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn get(&self, table: &TableId) -> Option<&Fingerprint> {
        self.index.get(table).map(|&i| &self.records[i].fingerprint)
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.index.contains_key(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerprintRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<FingerprintRecord> for CatalogSnapshot {
    fn from_iter<I: IntoIterator<Item = FingerprintRecord>>(iter: I) -> Self {
        let mut snapshot = CatalogSnapshot::new();
        for record in iter {
            snapshot.push(record);
        }
        snapshot
    }
}
