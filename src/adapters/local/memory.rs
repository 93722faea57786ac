//! In-process adapters: the job repository and a map-backed storage.

use crate::domain::artifacts::ArtifactKey;
use crate::domain::jobs::JobRecord;
use crate::error::PipelineError;
use crate::ports::repository::{JobRepository, RecordUpdate};
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Job records kept for the lifetime of the process.
///
/// Each record sits behind its own lock; the outer map lock is only held
/// long enough to find or insert an entry.
#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    records: Arc<RwLock<HashMap<String, Arc<Mutex<JobRecord>>>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, job_id: &str) -> Option<Arc<Mutex<JobRecord>>> {
        self.records.read().await.get(job_id).cloned()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn insert(&self, record: JobRecord) -> Result<(), PipelineError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.job_id) {
            return Err(PipelineError::internal(format!(
                "job {} already exists",
                record.job_id
            )));
        }
        records.insert(record.job_id.clone(), Arc::new(Mutex::new(record)));
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, PipelineError> {
        match self.entry(job_id).await {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        job_id: &str,
        update: RecordUpdate,
    ) -> Result<Option<JobRecord>, PipelineError> {
        let Some(entry) = self.entry(job_id).await else {
            return Ok(None);
        };
        let mut record = entry.lock().await;
        update(&mut *record);
        Ok(Some(record.clone()))
    }

    async fn delete(&self, job_id: &str) -> Result<Option<JobRecord>, PipelineError> {
        let removed = self.records.write().await.remove(job_id);
        match removed {
            Some(entry) => Ok(Some(entry.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}

/// Artifacts held in memory, for tests and throwaway runs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<RwLock<HashMap<ArtifactKey, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<ArtifactKey> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn put(&self, key: &ArtifactKey, bytes: Vec<u8>) -> Result<(), PipelineError> {
        self.objects.write().await.insert(key.clone(), bytes);
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn exists(&self, key: &ArtifactKey) -> Result<bool, PipelineError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &ArtifactKey) -> Result<(), PipelineError> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}
