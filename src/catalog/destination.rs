use std::collections::HashMap;
use std::fs;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use crate::error::{HashSyncError, Result};
use super::table::{is_identifier, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// The destination service already exists and is overwritten in place.
    Update,
    /// No service exists yet; publishing creates one.
    Create,
}

impl PublishMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishMode::Update => "update",
            PublishMode::Create => "create",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Publishing unit. Tables are only ever batched with others of the same unit.
    pub unit: String,
    #[serde(default)]
    pub item_id: Option<String>,
}

impl Destination {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            item_id: None,
        }
    }

    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn mode(&self) -> PublishMode {
        match self.item_id {
            Some(_) => PublishMode::Update,
            None => PublishMode::Create,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDestinationEntry {
    table: String,
    #[serde(flatten)]
    destination: Destination,
}

#[derive(Debug, Deserialize)]
struct RawDestinations {
    #[serde(default)]
    destinations: Vec<RawDestinationEntry>,
}

/// Maps each table to where it gets published.
#[derive(Debug, Clone, Default)]
pub struct DestinationLookup {
    entries: HashMap<TableId, Destination>,
}

impl DestinationLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries whose item id is set but is not a UUID belong to services
    /// maintained elsewhere and are skipped.
    pub fn insert(&mut self, table: TableId, destination: Destination) -> bool {
        if let Some(item_id) = &destination.item_id {
            if Uuid::parse_str(item_id).is_err() {
                debug!("Ignoring destination for {}: item id {} is not a UUID", table, item_id);
                return false;
            }
        }
        self.entries.insert(table, destination);
        true
    }

    pub fn with(mut self, table: TableId, destination: Destination) -> Self {
        self.insert(table, destination);
        self
    }

    pub fn get(&self, table: &TableId) -> Option<&Destination> {
        self.entries.get(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            HashSyncError::Destination(format!("{}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let raw: RawDestinations = serde_yaml::from_str(content)?;
        let mut lookup = Self::new();
        for entry in raw.destinations {
            let table = TableId::parse(&entry.table)?;
            if !is_identifier(&entry.destination.unit) {
                return Err(HashSyncError::Destination(format!(
                    "invalid unit '{}' for {}",
                    entry.destination.unit, table
                )));
            }
            lookup.insert(table, entry.destination);
        }
        Ok(lookup)
    }

    /// Every table goes to `unit` in create mode. Used when no destinations
    /// document is configured.
    pub fn uniform(unit: &str, tables: impl IntoIterator<Item = TableId>) -> Self {
        let mut lookup = Self::new();
        for table in tables {
            lookup.insert(table, Destination::new(unit));
        }
        lookup
    }
}
