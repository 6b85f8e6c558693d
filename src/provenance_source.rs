use crate::error::AppError;
use crate::metadata::Thumbnails;
use crate::provenance::{C2paData, MinimalC2pa};
use async_trait::async_trait;
use std::path::Path;

/// Reads Content Credentials out of a local file.
///
/// A file without a manifest is `Ok(None)`, not an error.
#[async_trait]
pub trait ProvenanceSource: Send + Sync {
    async fn extract_provenance(&self, path: &Path) -> Result<Option<C2paData>, AppError>;
    async fn extract_minimal(&self, path: &Path) -> Result<Option<MinimalC2pa>, AppError>;
    async fn extract_thumbnails(&self, path: &Path) -> Result<Thumbnails, AppError>;
}
