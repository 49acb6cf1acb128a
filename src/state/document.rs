use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::catalog::{Fingerprint, TableId};
use crate::error::Result;

pub type StoredFingerprints = HashMap<TableId, Fingerprint>;

/// On-disk layout: one document per environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateDocument {
    pub updated_at: DateTime<Utc>,
    pub table_hashes: StoredFingerprints,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateDocumentCompat {
    Structured(StructuredCompat),
    Legacy(StoredFingerprints),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StructuredCompat {
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    table_hashes: StoredFingerprints,
}

impl StateDocument {
    pub fn empty() -> Self {
        Self {
            updated_at: Utc::now(),
            table_hashes: HashMap::new(),
        }
    }

    /// Accepts both the structured layout and a bare `{table: hash}` map.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::empty());
        }
        match serde_json::from_str::<StateDocumentCompat>(content)? {
            StateDocumentCompat::Structured(doc) => Ok(Self {
                updated_at: doc.updated_at.unwrap_or_else(Utc::now),
                table_hashes: doc.table_hashes,
            }),
            StateDocumentCompat::Legacy(table_hashes) => Ok(Self {
                updated_at: Utc::now(),
                table_hashes,
            }),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn with_entry(&self, table: &TableId, fingerprint: &Fingerprint) -> Self {
        let mut next = self.clone();
        next.table_hashes.insert(table.clone(), fingerprint.clone());
        next.updated_at = Utc::now();
        next
    }
}
