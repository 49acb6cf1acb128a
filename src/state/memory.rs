use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::catalog::{Fingerprint, TableId};
use crate::error::Result;
use super::document::StoredFingerprints;
use super::StateStore;

/// Process-local store. Each commit is a single map insert under the write
/// lock, so readers never see a half-applied commit.
#[derive(Default)]
pub struct InMemoryStateStore {
    hashes: RwLock<StoredFingerprints>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: StoredFingerprints) -> Self {
        Self {
            hashes: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get_all(&self) -> Result<StoredFingerprints> {
        Ok(self.hashes.read().await.clone())
    }

    async fn get(&self, table: &TableId) -> Result<Option<Fingerprint>> {
        Ok(self.hashes.read().await.get(table).cloned())
    }

    async fn commit(&self, table: &TableId, fingerprint: &Fingerprint) -> Result<()> {
        self.hashes.write().await.insert(table.clone(), fingerprint.clone());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        table: &TableId,
        expected: Option<&Fingerprint>,
        fingerprint: &Fingerprint,
    ) -> Result<bool> {
        let mut hashes = self.hashes.write().await;
        if hashes.get(table) != expected {
            return Ok(false);
        }
        hashes.insert(table.clone(), fingerprint.clone());
        Ok(true)
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_commits_to_distinct_keys() {
        let store = Arc::new(InMemoryStateStore::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let table = TableId::parse(&format!("sgid.test.t{i}")).unwrap();
                store.commit(&table, &Fingerprint::new(format!("fp{i}"))).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 32);
        let t7 = TableId::parse("sgid.test.t7").unwrap();
        assert_eq!(all.get(&t7), Some(&Fingerprint::new("fp7")));
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_expectation() {
        let table = TableId::parse("sgid.water.lakes").unwrap();
        let store = InMemoryStateStore::new();
        store.commit(&table, &Fingerprint::new("v1")).await.unwrap();

        let stale = Fingerprint::new("v0");
        assert!(!store.compare_and_set(&table, Some(&stale), &Fingerprint::new("v2")).await.unwrap());
        assert_eq!(store.get(&table).await.unwrap(), Some(Fingerprint::new("v1")));
    }
}
