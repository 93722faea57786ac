use crate::domain::artifacts::ArtifactKey;
use crate::error::PipelineError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Store `bytes` under `key`. Readers never observe a partial write.
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<(), PipelineError>;

    /// Fetch the bytes stored under `key`, `None` if nothing is stored.
    async fn get(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, PipelineError>;

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, PipelineError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &ArtifactKey) -> Result<(), PipelineError>;
}
