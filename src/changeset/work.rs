use std::collections::HashSet;
use std::fmt;
use serde::Serialize;
use crate::catalog::{Fingerprint, TableId};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkReason {
    /// Stored fingerprint differs from the current one.
    Changed,
    /// No stored fingerprint: never published.
    Missing,
    /// Named explicitly by the caller.
    ForcedOverride,
}

impl WorkReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkReason::Changed => "changed",
            WorkReason::Missing => "missing",
            WorkReason::ForcedOverride => "forced",
        }
    }
}

impl fmt::Display for WorkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    pub table: TableId,
    pub current: Fingerprint,
    pub reason: WorkReason,
}

impl WorkItem {
    pub fn new(table: TableId, current: Fingerprint, reason: WorkReason) -> Self {
        Self { table, current, reason }
    }
}

/// Ordered work items, at most one per table.
#[derive(Debug, Clone, Default)]
pub struct WorkSet {
    items: Vec<WorkItem>,
    tables: HashSet<TableId>,
}

impl WorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false, leaving the set unchanged, if the table already has an item.
    pub fn push(&mut self, item: WorkItem) -> bool {
        if !self.tables.insert(item.table.clone()) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.tables.contains(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }
}

/// Explicit table list that replaces change detection for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideList {
    tables: Vec<TableId>,
}

impl OverrideList {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(tables: impl IntoIterator<Item = TableId>) -> Self {
        let mut seen = HashSet::new();
        let tables = tables.into_iter().filter(|t| seen.insert(t.clone())).collect();
        Self { tables }
    }

    /// Parses `a,b, c`. Blank segments are ignored. A name that is not a
    /// valid identifier is kept as typed so it surfaces as an unknown table
    /// instead of failing the whole list.
    pub fn parse(raw: &str) -> Self {
        let tables: Vec<TableId> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| {
                TableId::parse(name).unwrap_or_else(|e| {
                    warn!("{}", e);
                    TableId::verbatim(name)
                })
            })
            .collect();
        Self::new(tables)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.tables.contains(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableId> {
        self.tables.iter()
    }
}
