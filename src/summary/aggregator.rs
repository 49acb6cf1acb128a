use std::fmt::Display;
use chrono::Utc;
use tracing::{error, warn};
use crate::catalog::TableId;
use super::outcome::{Outcome, SummaryEntry};
use super::report::RunSummary;

/// Collects outcomes as they arrive, in any order, and hands back a summary
/// in work-set order.
pub struct ResultAggregator {
    started_at: chrono::DateTime<Utc>,
    entries: Vec<(usize, SummaryEntry)>,
    global_errors: Vec<String>,
    stale: Vec<TableId>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            entries: Vec::new(),
            global_errors: Vec::new(),
            stale: Vec::new(),
        }
    }

    pub fn set_stale(&mut self, stale: Vec<TableId>) {
        self.stale = stale;
    }

    /// `position` is the entry's place in the work set.
    pub fn record(&mut self, position: usize, entry: SummaryEntry) {
        match &entry.outcome {
            Outcome::Failure { cause, stage } => {
                warn!("{} held back at {}: {}", entry.table, stage, cause);
            }
            Outcome::CountMismatch { source_count, final_count } => {
                warn!("{} count mismatch: source {} vs published {}", entry.table, source_count, final_count);
            }
            Outcome::Success { .. } => {}
        }
        self.entries.push((position, entry));
    }

    pub fn record_global_error(&mut self, err: impl Display) {
        error!("Run aborted: {}", err);
        self.global_errors.push(err.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(mut self) -> RunSummary {
        self.entries.sort_by_key(|(position, _)| *position);
        RunSummary {
            started_at: self.started_at,
            finished_at: Utc::now(),
            entries: self.entries.into_iter().map(|(_, e)| e).collect(),
            global_errors: self.global_errors,
            stale: self.stale,
        }
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}
