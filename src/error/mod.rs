mod cause;

use thiserror::Error;

pub use cause::{FailureCause, Stage};

#[derive(Error, Debug)]
pub enum HashSyncError {
    #[error("Fingerprint source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid table identifier: {0}")]
    InvalidTable(String),

    #[error("Destination lookup error: {0}")]
    Destination(String),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HashSyncError>;
