//! JSON document state store.
//!
//! Persists a single [`StateDocument`] per environment. Every commit writes a
//! `.tmp` sibling and renames it over the document, so a reader either sees
//! the previous document or the new one, never a partial write.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};
use crate::catalog::{Fingerprint, TableId};
use crate::error::{HashSyncError, Result};
use super::document::{StateDocument, StoredFingerprints};
use super::StateStore;

pub struct JsonFileStateStore {
    path: PathBuf,
    cached: Mutex<Option<StateDocument>>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(path: &Path) -> Result<StateDocument> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => StateDocument::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No state document at {}; starting with empty hash map", path.display());
                Ok(StateDocument::empty())
            }
            Err(e) => Err(HashSyncError::StateStore(format!("{}: {}", path.display(), e))),
        }
    }

    async fn write_document(path: &Path, document: &StateDocument) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    HashSyncError::StateStore(format!("{}: {}", dir.display(), e))
                })?;
            }
        }

        let json = document.to_json()?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| HashSyncError::StateStore(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| HashSyncError::StateStore(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn take_current(&self, cached: &mut Option<StateDocument>) -> Result<StateDocument> {
        match cached.take() {
            Some(doc) => Ok(doc),
            None => Self::read_document(&self.path).await,
        }
    }

    /// Applies `next` to disk first and only then to the cache, so a failed
    /// write leaves both untouched.
    async fn replace(&self, cached: &mut Option<StateDocument>, next: StateDocument) -> Result<()> {
        Self::write_document(&self.path, &next).await?;
        *cached = Some(next);
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get_all(&self) -> Result<StoredFingerprints> {
        let mut cached = self.cached.lock().await;
        let document = Self::read_document(&self.path).await?;
        info!("Loaded {} table hash entries from {}", document.table_hashes.len(), self.path.display());
        let hashes = document.table_hashes.clone();
        *cached = Some(document);
        Ok(hashes)
    }

    async fn get(&self, table: &TableId) -> Result<Option<Fingerprint>> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = Some(Self::read_document(&self.path).await?);
        }
        Ok(cached.as_ref().and_then(|d| d.table_hashes.get(table).cloned()))
    }

    async fn commit(&self, table: &TableId, fingerprint: &Fingerprint) -> Result<()> {
        let mut cached = self.cached.lock().await;
        let current = self.take_current(&mut cached).await?;
        let next = current.with_entry(table, fingerprint);
        *cached = Some(current);

        self.replace(&mut cached, next).await?;
        debug!("Updated hash for {} to {}", table, fingerprint.short());
        Ok(())
    }

    async fn compare_and_set(
        &self,
        table: &TableId,
        expected: Option<&Fingerprint>,
        fingerprint: &Fingerprint,
    ) -> Result<bool> {
        let mut cached = self.cached.lock().await;
        let current = self.take_current(&mut cached).await?;

        if current.table_hashes.get(table) != expected {
            *cached = Some(current);
            return Ok(false);
        }

        let next = current.with_entry(table, fingerprint);
        *cached = Some(current);
        self.replace(&mut cached, next).await?;
        Ok(true)
    }

    fn describe(&self) -> String {
        format!("json file {}", self.path.display())
    }
}
