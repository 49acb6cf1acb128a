use std::fmt;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Extract,
    Package,
    Publish,
    Verify,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Extract => "extract",
            Stage::Package => "package",
            Stage::Publish => "publish",
            Stage::Verify => "verify",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single work item was held back. These never propagate past the
/// orchestrator; they end up in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    UnknownTable,

    NoDestination,

    Extraction {
        message: String,
    },

    Publish {
        message: String,
        attempts: u32,
    },

    PublishRejected {
        message: String,
    },

    Timeout {
        after_ms: u64,
    },

    StateCommitFailed {
        message: String,
    },

    Internal {
        message: String,
    },
}

impl FailureCause {
    pub fn code(&self) -> &'static str {
        match self {
            FailureCause::UnknownTable => "UNKNOWN_TABLE",
            FailureCause::NoDestination => "NO_DESTINATION",
            FailureCause::Extraction { .. } => "EXTRACTION_ERROR",
            FailureCause::Publish { .. } => "PUBLISH_ERROR",
            FailureCause::PublishRejected { .. } => "PUBLISH_REJECTED",
            FailureCause::Timeout { .. } => "TIMEOUT",
            FailureCause::StateCommitFailed { .. } => "STATE_COMMIT_FAILED",
            FailureCause::Internal { .. } => "INTERNAL",
        }
    }

    /// Whether simply re-running later has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureCause::Publish { .. }
                | FailureCause::Timeout { .. }
                | FailureCause::StateCommitFailed { .. }
        )
    }

    pub fn hint(&self) -> String {
        match self {
            FailureCause::UnknownTable => {
                "The table is not in the source catalog:\n  \
                 • Check the spelling of the forced table name\n  \
                 • Table names are schema-qualified, e.g. boundaries.counties".to_string()
            }

            FailureCause::NoDestination => {
                "No destination entry exists for this table:\n  \
                 • Add it to the destinations document\n  \
                 • Entries with a non-UUID item id are skipped on load".to_string()
            }

            FailureCause::Extraction { .. } => {
                "Extraction failed:\n  \
                 • Verify the source table is readable\n  \
                 • Check for malformed rows".to_string()
            }

            FailureCause::Publish { attempts, .. } => {
                format!(
                    "Publishing failed after {attempts} attempt(s):\n  \
                     • The table will be retried on the next run\n  \
                     • Check the publishing target's status"
                )
            }

            FailureCause::PublishRejected { .. } => {
                "The publishing target rejected the artifact:\n  \
                 • Retrying will not help until the cause is fixed\n  \
                 • Compare the source schema with the destination".to_string()
            }

            FailureCause::Timeout { after_ms } => {
                format!(
                    "Stage timed out after {after_ms}ms:\n  \
                     • Raise the stage timeout in the config\n  \
                     • The table will be retried on the next run"
                )
            }

            FailureCause::StateCommitFailed { .. } => {
                "Publish succeeded but the fingerprint was not recorded:\n  \
                 • The table will be republished on the next run\n  \
                 • Check that the state store is writable".to_string()
            }

            FailureCause::Internal { .. } => {
                "An unexpected error occurred while processing the table".to_string()
            }
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::UnknownTable => write!(f, "Table not found in source catalog"),
            FailureCause::NoDestination => write!(f, "No destination entry for table"),
            FailureCause::Extraction { message } => write!(f, "Extraction failed: {message}"),
            FailureCause::Publish { message, attempts } => {
                write!(f, "Publish failed: {message}")?;
                if *attempts > 1 {
                    write!(f, " (after {attempts} attempts)")?;
                }
                Ok(())
            }
            FailureCause::PublishRejected { message } => write!(f, "Publish rejected: {message}"),
            FailureCause::Timeout { after_ms } => write!(f, "Timed out after {after_ms}ms"),
            FailureCause::StateCommitFailed { message } => {
                write!(f, "State commit failed: {message}")
            }
            FailureCause::Internal { message } => write!(f, "Internal error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes() {
        assert_eq!(FailureCause::UnknownTable.code(), "UNKNOWN_TABLE");
        assert_eq!(FailureCause::NoDestination.code(), "NO_DESTINATION");
        assert_eq!(FailureCause::Extraction { message: "m".into() }.code(), "EXTRACTION_ERROR");
        assert_eq!(FailureCause::Publish { message: "m".into(), attempts: 1 }.code(), "PUBLISH_ERROR");
        assert_eq!(FailureCause::PublishRejected { message: "m".into() }.code(), "PUBLISH_REJECTED");
        assert_eq!(FailureCause::Timeout { after_ms: 5 }.code(), "TIMEOUT");
        assert_eq!(FailureCause::StateCommitFailed { message: "m".into() }.code(), "STATE_COMMIT_FAILED");
        assert_eq!(FailureCause::Internal { message: "m".into() }.code(), "INTERNAL");
    }

    #[test]
    fn test_display_publish_single_attempt() {
        let cause = FailureCause::Publish { message: "503".into(), attempts: 1 };
        assert_eq!(cause.to_string(), "Publish failed: 503");
    }

    #[test]
    fn test_display_publish_multiple_attempts() {
        let cause = FailureCause::Publish { message: "503".into(), attempts: 4 };
        assert_eq!(cause.to_string(), "Publish failed: 503 (after 4 attempts)");
    }

    #[test]
    fn test_display_timeout() {
        let cause = FailureCause::Timeout { after_ms: 30000 };
        assert_eq!(cause.to_string(), "Timed out after 30000ms");
    }

    #[test]
    fn test_transient_classification() {
        assert!(FailureCause::Timeout { after_ms: 1 }.is_transient());
        assert!(FailureCause::StateCommitFailed { message: "x".into() }.is_transient());
        assert!(!FailureCause::PublishRejected { message: "x".into() }.is_transient());
        assert!(!FailureCause::UnknownTable.is_transient());
    }

    #[test]
    fn test_hint_mentions_attempts() {
        let cause = FailureCause::Publish { message: "x".into(), attempts: 3 };
        assert!(cause.hint().contains("3 attempt(s)"));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Extract.to_string(), "extract");
        assert_eq!(Stage::Commit.as_str(), "commit");
    }
}
