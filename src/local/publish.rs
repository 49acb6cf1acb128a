use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;
use crate::catalog::{Destination, PublishMode, TableId};
use crate::pipeline::{ArtifactHandle, CollaboratorError, Published, Publisher};
use super::{count_rows, table_file_name};

/// Publishes into `root/<unit>/<item id>.ndjson`. Create mode assigns a
/// fresh item id; update mode overwrites the existing file in place.
pub struct DirectoryPublisher {
    root: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn item_path(&self, unit: &str, item_id: &str) -> PathBuf {
        self.root.join(unit).join(format!("{}.ndjson", item_id))
    }

    fn source_file(artifact: &ArtifactHandle, table: &TableId) -> PathBuf {
        if artifact.location.is_dir() {
            artifact.location.join(table_file_name(table))
        } else {
            artifact.location.clone()
        }
    }
}

fn publish_error(path: &Path, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Publish(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl Publisher for DirectoryPublisher {
    async fn publish(
        &self,
        artifact: &ArtifactHandle,
        table: &TableId,
        destination: &Destination,
    ) -> Result<Published, CollaboratorError> {
        let source = Self::source_file(artifact, table);
        if !source.is_file() {
            return Err(CollaboratorError::Rejected(format!(
                "artifact {} does not contain {}",
                artifact.id, table
            )));
        }

        let item_id = match (destination.mode(), &destination.item_id) {
            (PublishMode::Update, Some(id)) => id.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        let target = self.item_path(&destination.unit, &item_id);
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| publish_error(dir, e))?;
        }

        let tmp = target.with_extension("ndjson.tmp");
        tokio::fs::copy(&source, &tmp).await.map_err(|e| publish_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &target).await.map_err(|e| publish_error(&target, e))?;

        let published = tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| publish_error(&target, e))?;
        let final_count = count_rows(&published)
            .map_err(|e| CollaboratorError::Rejected(format!("{}: {}", target.display(), e)))?;

        info!(
            "{} {} as {} ({} rows)",
            if destination.mode() == PublishMode::Update { "Updated" } else { "Published" },
            table,
            item_id,
            final_count
        );
        Ok(Published {
            final_count,
            item_id: Some(item_id),
        })
    }

    async fn release(&self, artifact: &ArtifactHandle) -> Result<(), CollaboratorError> {
        let location = &artifact.location;
        let removed = if location.is_dir() {
            tokio::fs::remove_dir_all(location).await
        } else {
            tokio::fs::remove_file(location).await
        };
        match removed {
            Ok(()) => {
                debug!("Removed temporary artifact {}", location.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(publish_error(location, e)),
        }
    }
}
