use std::fs;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use serde::Deserialize;
use crate::error::{HashSyncError, Result};
use super::source::{CatalogSnapshot, FingerprintSource};
use super::table::FingerprintRecord;

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    tables: Vec<FingerprintRecord>,
}

/// Serves a fixed snapshot, either built in code or read from a YAML
/// document of the form `tables: [{table, fingerprint}]`.
pub struct StaticFingerprintSource {
    records: Vec<FingerprintRecord>,
    origin: Option<PathBuf>,
}

impl StaticFingerprintSource {
    pub fn new(records: Vec<FingerprintRecord>) -> Self {
        Self { records, origin: None }
    }

    /// The file is read on every snapshot so edits between runs are seen.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            records: Vec::new(),
            origin: Some(path.into()),
        }
    }

    fn read_file(path: &Path) -> Result<Vec<FingerprintRecord>> {
        let content = fs::read_to_string(path).map_err(|e| {
            HashSyncError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let raw: RawCatalog = serde_yaml::from_str(&content).map_err(|e| {
            HashSyncError::SourceUnavailable(format!("{}: {}", path.display(), e))
        })?;
        Ok(raw.tables)
    }
}

#[async_trait]
impl FingerprintSource for StaticFingerprintSource {
    async fn current_fingerprints(&self) -> Result<CatalogSnapshot> {
        match &self.origin {
            Some(path) => Ok(Self::read_file(path)?.into_iter().collect()),
            None => Ok(self.records.iter().cloned().collect()),
        }
    }

    fn describe(&self) -> String {
        match &self.origin {
            Some(path) => format!("static catalog {}", path.display()),
            None => format!("static catalog ({} tables)", self.records.len()),
        }
    }
}
