mod document;
mod file;
mod memory;
mod registry;
mod static_store;

use std::sync::Arc;
use async_trait::async_trait;
use tracing::info;
use crate::catalog::{Fingerprint, TableId};
use crate::config::{Environment, StateConfig};
use crate::error::{HashSyncError, Result};

pub use document::{StateDocument, StoredFingerprints};
pub use file::JsonFileStateStore;
pub use memory::InMemoryStateStore;
pub use registry::{CreatedItems, ItemRegistry};
pub use static_store::StaticStateStore;

/// Durable record of the last fingerprint successfully published per table.
///
/// A missing entry means the table was never published. `commit` is an
/// atomic upsert of one key: implementations must keep concurrent commits to
/// different keys from losing each other's writes, and must never expose a
/// half-applied commit to readers.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_all(&self) -> Result<StoredFingerprints>;

    async fn get(&self, table: &TableId) -> Result<Option<Fingerprint>> {
        Ok(self.get_all().await?.remove(table))
    }

    async fn commit(&self, table: &TableId, fingerprint: &Fingerprint) -> Result<()>;

    /// Writes `fingerprint` only if the stored value equals `expected`
    /// (`None` meaning no entry). Returns whether the write happened.
    async fn compare_and_set(
        &self,
        table: &TableId,
        expected: Option<&Fingerprint>,
        fingerprint: &Fingerprint,
    ) -> Result<bool>;

    fn describe(&self) -> String;
}

/// Picks the backend for `environment`. Dev runs get the static substitute
/// map; staging and prod persist to the configured document.
pub fn open_store(environment: Environment, config: &StateConfig) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match environment {
        Environment::Dev => Arc::new(StaticStateStore::new(config.static_hashes.clone())),
        Environment::Staging | Environment::Prod => {
            let path = config.path.as_ref().ok_or_else(|| {
                HashSyncError::Config(format!(
                    "state.path is required in the {} environment",
                    environment.as_str()
                ))
            })?;
            Arc::new(JsonFileStateStore::new(path))
        }
    };

    info!("Using {} state store for {}", store.describe(), environment.as_str());
    Ok(store)
}

/// Registry for item ids created by publishing. Dev runs keep it in memory;
/// staging and prod persist it next to the state document unless
/// `state.items_path` says otherwise.
pub fn open_registry(environment: Environment, config: &StateConfig) -> Result<Arc<ItemRegistry>> {
    if !environment.is_persistent() {
        return Ok(Arc::new(ItemRegistry::in_memory()));
    }
    let path = match (&config.items_path, &config.path) {
        (Some(items), _) => items.clone(),
        (None, Some(state)) => state.with_extension("items.json"),
        (None, None) => {
            return Err(HashSyncError::Config(format!(
                "state.path is required in the {} environment",
                environment.as_str()
            )))
        }
    };
    let registry = ItemRegistry::open(path);
    info!("Using {} for {}", registry.describe(), environment.as_str());
    Ok(Arc::new(registry))
}
