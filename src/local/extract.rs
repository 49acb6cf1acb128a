use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;
use crate::catalog::{DirectoryFingerprintSource, TableId};
use crate::pipeline::{ArtifactHandle, CollaboratorError, Extracted, Extractor};
use super::{count_rows, table_file_name};

/// Copies catalog files into the output directory. Bundles several tables
/// into a subdirectory when a batch is packaged together.
pub struct DirectoryExtractor {
    catalog: DirectoryFingerprintSource,
}

impl DirectoryExtractor {
    pub fn new(catalog: DirectoryFingerprintSource) -> Self {
        Self { catalog }
    }

    fn locate(&self, table: &TableId) -> Result<PathBuf, CollaboratorError> {
        self.catalog
            .table_path(table)
            .map_err(|e| CollaboratorError::Extraction(e.to_string()))?
            .ok_or_else(|| {
                CollaboratorError::Extraction(format!(
                    "no file for {} under {}",
                    table,
                    self.catalog.root().display()
                ))
            })
    }
}

fn extraction_error(path: &Path, e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Extraction(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl Extractor for DirectoryExtractor {
    async fn extract(&self, table: &TableId, output: &Path) -> Result<Extracted, CollaboratorError> {
        let source = self.locate(table)?;
        let content = tokio::fs::read_to_string(&source)
            .await
            .map_err(|e| extraction_error(&source, e))?;
        let source_count = count_rows(&content).map_err(|e| extraction_error(&source, e))?;

        tokio::fs::create_dir_all(output)
            .await
            .map_err(|e| extraction_error(output, e))?;
        let target = output.join(table_file_name(table));
        tokio::fs::write(&target, &content)
            .await
            .map_err(|e| extraction_error(&target, e))?;

        debug!("Copied {} to {}", source.display(), target.display());
        Ok(Extracted {
            artifact: ArtifactHandle::new(table.as_str(), target),
            source_count,
        })
    }

    async fn package(
        &self,
        output: &Path,
        unit: &str,
        parts: &[Extracted],
    ) -> Result<ArtifactHandle, CollaboratorError> {
        if let [single] = parts {
            return Ok(single.artifact.clone());
        }

        let id = format!("{}-{}", unit, &Uuid::new_v4().simple().to_string()[..8]);
        let bundle = output.join(&id);
        tokio::fs::create_dir_all(&bundle)
            .await
            .map_err(|e| extraction_error(&bundle, e))?;

        for part in parts {
            let Some(name) = part.artifact.location.file_name() else {
                return Err(extraction_error(&part.artifact.location, "artifact has no file name"));
            };
            let target = bundle.join(name);
            tokio::fs::rename(&part.artifact.location, &target)
                .await
                .map_err(|e| extraction_error(&part.artifact.location, e))?;
        }

        debug!("Packaged {} tables into {}", parts.len(), bundle.display());
        Ok(ArtifactHandle::new(id, bundle))
    }
}
