use crate::domain::jobs::JobRecord;
use crate::error::PipelineError;
use async_trait::async_trait;

/// Mutation applied to a single record under its lock.
pub type RecordUpdate = Box<dyn FnOnce(&mut JobRecord) + Send>;

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a freshly created record
    async fn insert(&self, record: JobRecord) -> Result<(), PipelineError>;

    /// Snapshot of a record, `None` if the id is unknown
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, PipelineError>;

    /// Apply `update` atomically and return the new snapshot.
    /// Returns `None` if the record no longer exists.
    async fn update(
        &self,
        job_id: &str,
        update: RecordUpdate,
    ) -> Result<Option<JobRecord>, PipelineError>;

    /// Remove a record, returning its last state
    async fn delete(&self, job_id: &str) -> Result<Option<JobRecord>, PipelineError>;

    /// Ids of every known job
    async fn list_ids(&self) -> Result<Vec<String>, PipelineError>;
}
