use std::fmt;
use std::sync::OnceLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::error::{HashSyncError, Result};

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9_\-]+(\.[a-z0-9_\-]+)*$").expect("static identifier pattern")
    })
}

/// Whether `raw` is a dotted identifier made of `[a-z0-9_-]` segments, once
/// lower-cased.
pub(crate) fn is_identifier(raw: &str) -> bool {
    identifier_pattern().is_match(&raw.trim().to_lowercase())
}

/// Schema-qualified table name. Always stored lower-cased so the catalog and
/// the state document agree regardless of how either spelled it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableId(String);

impl TableId {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(HashSyncError::InvalidTable("empty table name".into()));
        }
        if !identifier_pattern().is_match(&normalized) {
            return Err(HashSyncError::InvalidTable(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Keeps a name that failed validation as typed. Such an id never equals
    /// a parsed one, so it only ever resolves as an unknown table.
    pub(crate) fn verbatim(raw: &str) -> Self {
        Self(raw.trim().to_string())
    }

    /// Last dotted segment.
    pub fn short_name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl TryFrom<String> for TableId {
    type Error = HashSyncError;

    fn try_from(value: String) -> Result<Self> {
        TableId::parse(&value)
    }
}

impl From<TableId> for String {
    fn from(id: TableId) -> Self {
        id.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque content digest. Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn sha256(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub table: TableId,
    pub fingerprint: Fingerprint,
}

impl FingerprintRecord {
    pub fn new(table: TableId, fingerprint: Fingerprint) -> Self {
        Self { table, fingerprint }
    }
}
