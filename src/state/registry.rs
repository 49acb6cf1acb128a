//! Item ids assigned by create-mode publishes.
//!
//! A table published in create mode gets a new destination item. Recording
//! it here lets later runs route the table to that item in update mode.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use crate::catalog::{Destination, TableId};
use crate::error::{HashSyncError, Result};

pub type CreatedItems = BTreeMap<TableId, Destination>;

pub struct ItemRegistry {
    path: Option<PathBuf>,
    cached: Mutex<Option<CreatedItems>>,
}

impl ItemRegistry {
    /// Process-local registry. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            cached: Mutex::new(Some(CreatedItems::new())),
        }
    }

    /// Registry backed by a JSON document, created on first record.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("item registry {}", path.display()),
            None => "in-memory item registry".to_string(),
        }
    }

    async fn read_document(path: &Path) -> Result<CreatedItems> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => Ok(CreatedItems::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| HashSyncError::StateStore(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No item registry at {}", path.display());
                Ok(CreatedItems::new())
            }
            Err(e) => Err(HashSyncError::StateStore(format!("{}: {}", path.display(), e))),
        }
    }

    async fn write_document(path: &Path, items: &CreatedItems) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| HashSyncError::StateStore(format!("{}: {}", dir.display(), e)))?;
            }
        }

        let json = serde_json::to_vec_pretty(items)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| HashSyncError::StateStore(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| HashSyncError::StateStore(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn loaded<'a>(&self, cached: &'a mut Option<CreatedItems>) -> Result<&'a mut CreatedItems> {
        if cached.is_none() {
            let items = match &self.path {
                Some(path) => Self::read_document(path).await?,
                None => CreatedItems::new(),
            };
            *cached = Some(items);
        }
        Ok(cached.get_or_insert_with(CreatedItems::new))
    }

    pub async fn get_all(&self) -> Result<CreatedItems> {
        let mut cached = self.cached.lock().await;
        Ok(self.loaded(&mut cached).await?.clone())
    }

    /// Remembers `destination` for `table`. Written to disk before the
    /// in-memory copy changes, so a failed write changes nothing.
    pub async fn record(&self, table: &TableId, destination: &Destination) -> Result<()> {
        let mut cached = self.cached.lock().await;
        let items = self.loaded(&mut cached).await?;

        let mut next = items.clone();
        next.insert(table.clone(), destination.clone());
        if let Some(path) = &self.path {
            Self::write_document(path, &next).await?;
        }
        *items = next;

        info!(
            "Recorded {} as item {} in {}",
            table,
            destination.item_id.as_deref().unwrap_or("-"),
            destination.unit
        );
        Ok(())
    }
}

impl Default for ItemRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}
