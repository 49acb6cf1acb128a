use std::path::{Path, PathBuf};
use async_trait::async_trait;
use glob::glob;
use tracing::{debug, warn};
use crate::error::{HashSyncError, Result};
use super::source::{CatalogSnapshot, FingerprintSource};
use super::table::{Fingerprint, FingerprintRecord, TableId};

pub const DEFAULT_PATTERN: &str = "**/*.ndjson";

/// Treats every file matching `pattern` under `root` as a table. The table
/// id is the file stem and the fingerprint is the SHA-256 of the contents.
#[derive(Debug, Clone)]
pub struct DirectoryFingerprintSource {
    root: PathBuf,
    pattern: String,
}

impl DirectoryFingerprintSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pattern: DEFAULT_PATTERN.to_string(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `table`, if the catalog currently has one.
    pub fn table_path(&self, table: &TableId) -> Result<Option<PathBuf>> {
        Ok(self
            .matching_files()?
            .into_iter()
            .find(|p| Self::table_id_for(p).as_ref() == Some(table)))
    }

    fn matching_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(HashSyncError::SourceUnavailable(format!(
                "catalog directory {} does not exist",
                self.root.display()
            )));
        }

        let pattern = self.root.join(&self.pattern);
        let pattern_str = pattern.to_string_lossy();

        let mut files: Vec<PathBuf> = glob(&pattern_str)
            .map_err(|e| HashSyncError::SourceUnavailable(e.to_string()))?
            .filter_map(|r| r.ok())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    fn table_id_for(path: &Path) -> Option<TableId> {
        let stem = path.file_stem()?.to_str()?;
        TableId::parse(stem).ok()
    }
}

#[async_trait]
impl FingerprintSource for DirectoryFingerprintSource {
    async fn current_fingerprints(&self) -> Result<CatalogSnapshot> {
        let mut snapshot = CatalogSnapshot::new();

        for path in self.matching_files()? {
            let Some(table) = Self::table_id_for(&path) else {
                warn!("Skipping {}: file name is not a valid table name", path.display());
                continue;
            };

            let content = tokio::fs::read(&path).await.map_err(|e| {
                HashSyncError::SourceUnavailable(format!("{}: {}", path.display(), e))
            })?;

            let fingerprint = Fingerprint::sha256(&content);
            debug!("{} -> {}", table, fingerprint.short());
            snapshot.push(FingerprintRecord::new(table, fingerprint));
        }

        Ok(snapshot)
    }

    fn describe(&self) -> String {
        format!("directory {} ({})", self.root.display(), self.pattern)
    }
}
