use std::path::{Path, PathBuf};
use async_trait::async_trait;
use thiserror::Error;
use crate::catalog::{Destination, TableId};
use crate::error::FailureCause;

/// Where an extracted or packaged artifact lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub id: String,
    pub location: PathBuf,
}

impl ArtifactHandle {
    pub fn new(id: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            location: location.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub artifact: ArtifactHandle,
    /// Rows in the source at extraction time.
    pub source_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Rows the destination reports after publishing.
    pub final_count: u64,
    /// Identifier of the destination resource, newly assigned in create mode.
    pub item_id: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{0}")]
    Extraction(String),

    /// Publish failed in a way that may succeed if tried again.
    #[error("{0}")]
    Publish(String),

    /// The destination refused the artifact. Retrying will not help.
    #[error("{0}")]
    Rejected(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Publish(_))
    }

    pub fn into_cause(self, attempts: u32) -> FailureCause {
        match self {
            CollaboratorError::Extraction(message) => FailureCause::Extraction { message },
            CollaboratorError::Publish(message) => FailureCause::Publish { message, attempts },
            CollaboratorError::Rejected(message) => FailureCause::PublishRejected { message },
        }
    }
}

/// Turns tables into portable artifacts.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, table: &TableId, output: &Path) -> Result<Extracted, CollaboratorError>;

    /// Combines the artifacts of one batch into a single artifact. The default
    /// only handles single-table batches.
    async fn package(
        &self,
        _output: &Path,
        _unit: &str,
        parts: &[Extracted],
    ) -> Result<ArtifactHandle, CollaboratorError> {
        match parts {
            [single] => Ok(single.artifact.clone()),
            _ => Err(CollaboratorError::Extraction(format!(
                "cannot package {} artifacts together",
                parts.len()
            ))),
        }
    }
}

/// Pushes artifacts to the publishing target.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `table` out of `artifact`. A packaged artifact may hold
    /// several tables, so the table is named explicitly.
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        table: &TableId,
        destination: &Destination,
    ) -> Result<Published, CollaboratorError>;

    /// Called once every table in the artifact published cleanly.
    async fn release(&self, _artifact: &ArtifactHandle) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SingleOnly;

    #[async_trait]
    impl Extractor for SingleOnly {
        async fn extract(&self, table: &TableId, output: &Path) -> Result<Extracted, CollaboratorError> {
            Ok(Extracted {
                artifact: ArtifactHandle::new(table.as_str(), output.join(table.as_str())),
                source_count: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_default_package_passes_single_artifact_through() {
        let extractor = SingleOnly;
        let table = TableId::parse("sgid.a.one").unwrap();
        let part = extractor.extract(&table, Path::new("/tmp/out")).await.unwrap();

        let artifact = extractor.package(Path::new("/tmp/out"), "web", &[part.clone()]).await.unwrap();
        assert_eq!(artifact, part.artifact);

        let err = extractor.package(Path::new("/tmp/out"), "web", &[part.clone(), part]).await;
        assert!(matches!(err, Err(CollaboratorError::Extraction(_))));
    }

    #[test]
    fn test_into_cause() {
        assert!(CollaboratorError::Publish("503".into()).is_transient());
        assert!(!CollaboratorError::Rejected("schema".into()).is_transient());
        assert_eq!(
            CollaboratorError::Publish("503".into()).into_cause(3),
            FailureCause::Publish { message: "503".into(), attempts: 3 }
        );
    }
}
