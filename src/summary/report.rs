use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;
use tracing::info;
use crate::catalog::{PublishMode, TableId};
use crate::error::Stage;
use super::outcome::{Outcome, SummaryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// A global error aborted the run before any table was processed.
    Failed,
    CompletedWithErrors,
    /// Everything committed, but some counts did not match.
    CompletedWithAnomalies,
    Succeeded,
    NothingToDo,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Failed => "failed",
            RunStatus::CompletedWithErrors => "completed with errors",
            RunStatus::CompletedWithAnomalies => "completed with anomalies",
            RunStatus::Succeeded => "succeeded",
            RunStatus::NothingToDo => "nothing to do",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            RunStatus::Failed => "🔴",
            RunStatus::CompletedWithErrors => "🟡",
            RunStatus::CompletedWithAnomalies => "🟠",
            RunStatus::Succeeded => "🟢",
            RunStatus::NothingToDo => "🔵",
        }
    }
}

/// Everything that happened in one invocation. Read-only once built.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<SummaryEntry>,
    pub global_errors: Vec<String>,
    pub stale: Vec<TableId>,
}

impl RunSummary {
    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    pub fn failures_by_stage(&self) -> BTreeMap<Stage, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            if let Outcome::Failure { stage, .. } = &entry.outcome {
                *counts.entry(*stage).or_default() += 1;
            }
        }
        counts
    }

    pub fn mismatch_count(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_mismatch()).count()
    }

    pub fn possible_data_loss(&self) -> Vec<&SummaryEntry> {
        self.entries.iter().filter(|e| e.outcome.possible_data_loss()).collect()
    }

    pub fn failures(&self) -> Vec<&SummaryEntry> {
        self.entries.iter().filter(|e| e.outcome.is_failure()).collect()
    }

    /// Tables whose fingerprint was committed this run.
    pub fn committed(&self) -> Vec<&SummaryEntry> {
        self.entries.iter().filter(|e| e.outcome.should_commit()).collect()
    }

    pub fn has_any_failure(&self) -> bool {
        !self.global_errors.is_empty() || self.entries.iter().any(|e| e.outcome.is_failure())
    }

    pub fn status(&self) -> RunStatus {
        if !self.global_errors.is_empty() {
            RunStatus::Failed
        } else if self.failure_count() > 0 {
            RunStatus::CompletedWithErrors
        } else if self.mismatch_count() > 0 {
            RunStatus::CompletedWithAnomalies
        } else if !self.entries.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::NothingToDo
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn rows(&self) -> Vec<SummaryRow> {
        self.entries.iter().map(SummaryRow::from).collect()
    }

    pub fn log_summary(&self) {
        let rule = "=".repeat(72);
        info!("{}", rule);
        info!("HASHSYNC RUN SUMMARY");
        info!("{}", rule);
        info!("Tables processed: {}", self.entries.len());

        let updated = self.committed_in_mode(PublishMode::Update);
        let created = self.committed_in_mode(PublishMode::Create);
        info!("✅ Updated: {}", updated.len());
        for table in &updated {
            info!("   • {}", table);
        }
        info!("🚀 Published: {}", created.len());
        for table in &created {
            info!("   • {}", table);
        }

        let failures = self.failures();
        if !failures.is_empty() {
            info!("❌ Held back: {}", failures.len());
            for entry in failures {
                if let Outcome::Failure { cause, stage } = &entry.outcome {
                    let retry = if cause.is_transient() { " (may clear on the next run)" } else { "" };
                    info!("   • {} [{} at {}] {}{}", entry.table, cause.code(), stage, cause, retry);
                }
            }
            for (stage, count) in self.failures_by_stage() {
                info!("   {} failed at {}", count, stage);
            }
        }

        if self.mismatch_count() > 0 {
            info!("⚠ Count mismatches: {}", self.mismatch_count());
            for entry in self.entries.iter().filter(|e| e.outcome.is_mismatch()) {
                if let Outcome::CountMismatch { source_count, final_count } = &entry.outcome {
                    let flag = if entry.outcome.possible_data_loss() { " (possible data loss)" } else { "" };
                    info!("   • {}: source {} vs published {}{}", entry.table, source_count, final_count, flag);
                }
            }
        }

        if !self.global_errors.is_empty() {
            info!("🚨 Global errors: {}", self.global_errors.len());
            for err in &self.global_errors {
                info!("   • {}", err);
            }
        }

        if !self.stale.is_empty() {
            info!("Stale state entries (no longer in catalog): {}", self.stale.len());
            for table in &self.stale {
                info!("   • {}", table);
            }
        }

        info!("⏱ Elapsed: {:.1}s", self.elapsed().num_milliseconds() as f64 / 1000.0);
        let status = self.status();
        info!("{} Run {}", status.symbol(), status.as_str());
        info!("{}", rule);
    }

    fn committed_in_mode(&self, mode: PublishMode) -> Vec<&TableId> {
        self.entries
            .iter()
            .filter(|e| e.outcome.should_commit() && e.mode == Some(mode))
            .map(|e| &e.table)
            .collect()
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct SummaryRow {
    #[tabled(rename = "Table")]
    pub table: String,
    #[tabled(rename = "Reason")]
    pub reason: String,
    #[tabled(rename = "Mode")]
    pub mode: String,
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
    #[tabled(rename = "Time")]
    pub elapsed: String,
}

impl From<&SummaryEntry> for SummaryRow {
    fn from(entry: &SummaryEntry) -> Self {
        let (outcome, detail) = match &entry.outcome {
            Outcome::Success { published_count } => {
                ("✓ success".to_string(), format!("{} rows", published_count))
            }
            Outcome::Failure { cause, stage } => {
                (format!("✗ {}", cause.code()), format!("{}: {}", stage, cause))
            }
            Outcome::CountMismatch { source_count, final_count } => {
                ("⚠ mismatch".to_string(), format!("{} → {}", source_count, final_count))
            }
        };

        SummaryRow {
            table: entry.table.to_string(),
            reason: entry.reason.to_string(),
            mode: entry.mode.map(|m| m.as_str().to_string()).unwrap_or_else(|| "-".to_string()),
            outcome,
            detail,
            elapsed: format!("{:.1}s", entry.elapsed_ms as f64 / 1000.0),
        }
    }
}
