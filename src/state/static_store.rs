use async_trait::async_trait;
use tracing::info;
use crate::catalog::{Fingerprint, TableId};
use crate::error::Result;
use super::document::StoredFingerprints;
use super::StateStore;

/// Non-persistent store for local and offline runs. Serves a fixed map and
/// accepts commits without recording them, so every run sees the same state.
#[derive(Debug, Default)]
pub struct StaticStateStore {
    hashes: StoredFingerprints,
}

impl StaticStateStore {
    pub fn new(hashes: StoredFingerprints) -> Self {
        Self { hashes }
    }
}

#[async_trait]
impl StateStore for StaticStateStore {
    async fn get_all(&self) -> Result<StoredFingerprints> {
        info!("Static state: serving {} configured table hashes", self.hashes.len());
        Ok(self.hashes.clone())
    }

    async fn get(&self, table: &TableId) -> Result<Option<Fingerprint>> {
        Ok(self.hashes.get(table).cloned())
    }

    async fn commit(&self, table: &TableId, fingerprint: &Fingerprint) -> Result<()> {
        info!("Static state: would update hash for {} to {} (not persisted)", table, fingerprint.short());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        table: &TableId,
        _expected: Option<&Fingerprint>,
        fingerprint: &Fingerprint,
    ) -> Result<bool> {
        self.commit(table, fingerprint).await?;
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("static ({} entries, not persisted)", self.hashes.len())
    }
}
