use crate::domain::artifacts::ArtifactKey;
use crate::error::PipelineError;
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Stores artifacts as files named after their key inside one directory.
#[derive(Clone, Debug)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.file_name())
    }
}

/// Write into a temporary sibling, then rename over the destination.
/// The temporary file is removed if anything fails before the rename.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl StoragePort for FsStorage {
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<(), PipelineError> {
        let dir = self.root.clone();
        let path = self.path_for(key);
        tokio::task::spawn_blocking(move || write_atomically(&dir, &path, &bytes))
            .await
            .map_err(|e| PipelineError::internal(format!("storage task failed: {}", e)))?
            .map_err(|e| PipelineError::storage(format!("failed to write {}: {}", key, e)))
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, PipelineError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::storage(format!(
                "failed to read {}: {}",
                key, e
            ))),
        }
    }

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, PipelineError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn delete(&self, key: &ArtifactKey) -> Result<(), PipelineError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::storage(format!(
                "failed to delete {}: {}",
                key, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let key = ArtifactKey::results("job-1");

        assert_eq!(storage.get(&key).await.unwrap(), None);
        storage.put(&key, b"{\"ok\":true}".to_vec()).await.unwrap();

        assert!(storage.exists(&key).await.unwrap());
        assert!(dir.path().join("job-1_results.json").exists());
        assert_eq!(
            storage.get(&key).await.unwrap().unwrap(),
            b"{\"ok\":true}".to_vec()
        );

        storage.delete(&key).await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());
        // deleting twice is fine
        storage.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path());
        let key = ArtifactKey::thumbnail("job-1", 2);

        storage.put(&key, vec![1, 2, 3]).await.unwrap();
        storage.put(&key, vec![4, 5]).await.unwrap();

        assert_eq!(storage.get(&key).await.unwrap().unwrap(), vec![4, 5]);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_put_creates_missing_root() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("nested").join("results"));
        storage
            .put(&ArtifactKey::results("job-2"), vec![0])
            .await
            .unwrap();
        assert!(dir.path().join("nested/results/job-2_results.json").exists());
    }

    #[tokio::test]
    async fn test_put_into_unwritable_root_fails_as_storage_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let storage = FsStorage::new(&blocker);

        let err = storage
            .put(&ArtifactKey::results("job-3"), vec![0])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }
}
