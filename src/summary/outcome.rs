use serde::Serialize;
use crate::catalog::{Fingerprint, PublishMode, TableId};
use crate::changeset::{WorkItem, WorkReason};
use crate::error::{FailureCause, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        published_count: u64,
    },
    Failure {
        cause: FailureCause,
        stage: Stage,
    },
    /// Published, but the destination holds a different number of rows.
    CountMismatch {
        source_count: u64,
        final_count: u64,
    },
}

impl Outcome {
    pub fn failure(cause: FailureCause, stage: Stage) -> Self {
        Outcome::Failure { cause, stage }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure { .. })
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, Outcome::CountMismatch { .. })
    }

    /// Mismatches still commit; retrying a persistent discrepancy would never end.
    pub fn should_commit(&self) -> bool {
        !self.is_failure()
    }

    /// Rows went in but none came out.
    pub fn possible_data_loss(&self) -> bool {
        matches!(self, Outcome::CountMismatch { source_count, final_count } if *source_count > 0 && *final_count == 0)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Failure { .. } => "failed",
            Outcome::CountMismatch { .. } => "mismatch",
        }
    }
}

/// One row of the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub table: TableId,
    pub reason: WorkReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PublishMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub elapsed_ms: u64,
}

impl SummaryEntry {
    pub fn for_item(item: &WorkItem, outcome: Outcome) -> Self {
        Self {
            table: item.table.clone(),
            reason: item.reason,
            fingerprint: Some(item.current.clone()),
            outcome,
            mode: None,
            item_id: None,
            elapsed_ms: 0,
        }
    }

    /// Override entry naming a table the catalog does not have.
    pub fn unknown_table(table: TableId) -> Self {
        Self {
            table,
            reason: WorkReason::ForcedOverride,
            fingerprint: None,
            outcome: Outcome::failure(FailureCause::UnknownTable, Stage::Resolve),
            mode: None,
            item_id: None,
            elapsed_ms: 0,
        }
    }

    pub fn with_mode(mut self, mode: PublishMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_item_id(mut self, item_id: Option<String>) -> Self {
        self.item_id = item_id;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }
}
