use crate::application::worker::AnalysisWorker;
use crate::config::PipelineConfig;
use crate::domain::artifacts::ArtifactKey;
use crate::domain::jobs::{AnalysisResult, JobRecord, JobStatus};
use crate::error::{PipelineError, ServiceError, ServiceResult};
use crate::ports::decoder::DecoderFactory;
use crate::ports::repository::JobRepository;
use crate::ports::storage::StoragePort;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

struct RunningJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Entry point for submitting, tracking and removing analysis jobs.
///
/// At most `max_concurrent_pipelines` jobs run at once and at most
/// `max_queued_pipelines` more wait for a slot; past that, submissions are
/// rejected with [`ServiceError::Overloaded`].
pub struct OrchestratorService<S, R, D> {
    storage: Arc<S>,
    repo: Arc<R>,
    worker: AnalysisWorker<S, R, D>,
    config: Arc<PipelineConfig>,
    /// One permit per admitted job, held until its pipeline returns
    queue_slots: Arc<Semaphore>,
    /// One permit per running pipeline
    run_slots: Arc<Semaphore>,
    running: Arc<Mutex<HashMap<String, RunningJob>>>,
}

impl<S, R, D> OrchestratorService<S, R, D>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    pub fn new(storage: Arc<S>, repo: Arc<R>, decoders: Arc<D>, config: PipelineConfig) -> Self {
        let config = Arc::new(config);
        let concurrent = config.max_concurrent_pipelines.max(1);
        let admitted = concurrent + config.max_queued_pipelines;

        Self {
            worker: AnalysisWorker::new(
                Arc::clone(&storage),
                Arc::clone(&repo),
                decoders,
                Arc::clone(&config),
            ),
            storage,
            repo,
            config,
            queue_slots: Arc::new(Semaphore::new(admitted)),
            run_slots: Arc::new(Semaphore::new(concurrent)),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a job for the video stored at `video_path` and start its
    /// pipeline in the background. Returns the initial record.
    pub async fn submit(
        &self,
        job_id: &str,
        filename: &str,
        video_path: PathBuf,
    ) -> ServiceResult<JobRecord> {
        let ticket = self.admit()?;

        let mut record = JobRecord::new(job_id, filename, video_path.clone());
        record.note("Waiting for a pipeline slot");
        self.repo.insert(record.clone()).await?;
        info!(job_id, filename, "job submitted");

        self.spawn_pipeline(ticket, job_id.to_string(), video_path)
            .await;
        Ok(record)
    }

    /// Start the pipeline of an already registered job. Returns as soon as
    /// the pipeline is scheduled.
    pub async fn start_pipeline(&self, video_path: PathBuf, job_id: &str) -> ServiceResult<()> {
        let record = self.get_status(job_id).await?;
        if record.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Job {} already finished",
                job_id
            )));
        }
        if self.running.lock().await.contains_key(job_id) {
            return Err(ServiceError::Conflict(format!(
                "Job {} is already running",
                job_id
            )));
        }

        let ticket = self.admit()?;
        self.spawn_pipeline(ticket, job_id.to_string(), video_path)
            .await;
        Ok(())
    }

    fn admit(&self) -> ServiceResult<OwnedSemaphorePermit> {
        Arc::clone(&self.queue_slots)
            .try_acquire_owned()
            .map_err(|_| {
                warn!("pipeline queue is full, rejecting submission");
                ServiceError::Overloaded
            })
    }

    async fn spawn_pipeline(
        &self,
        ticket: OwnedSemaphorePermit,
        job_id: String,
        video_path: PathBuf,
    ) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = self.worker.clone();
        let run_slots = Arc::clone(&self.run_slots);
        let running = Arc::clone(&self.running);
        let id = job_id.clone();

        // the task deregisters itself under this lock, so it must not be
        // released before the entry is inserted
        let mut jobs = self.running.lock().await;
        let handle = tokio::spawn(async move {
            let _ticket = ticket;
            let slot = tokio::select! {
                slot = run_slots.acquire_owned() => slot.ok(),
                _ = token.cancelled() => None,
            };
            match slot {
                Some(_slot) => worker.run(&id, &video_path, token).await,
                None => worker.record_failure(&id, PipelineError::Cancelled).await,
            }
            running.lock().await.remove(&id);
        });
        jobs.insert(job_id, RunningJob { cancel, handle });
    }

    pub async fn get_status(&self, job_id: &str) -> ServiceResult<JobRecord> {
        self.repo
            .get(job_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Job not found: {}", job_id)))
    }

    /// Results of a completed job.
    pub async fn get_result(&self, job_id: &str) -> ServiceResult<AnalysisResult> {
        let record = self.get_status(job_id).await?;
        if record.status != JobStatus::Completed {
            return Err(ServiceError::Conflict(format!(
                "Job not completed yet: {}",
                job_id
            )));
        }
        record.results.ok_or_else(|| {
            PipelineError::internal(format!("completed job {} has no results", job_id)).into()
        })
    }

    pub async fn list_jobs(&self) -> ServiceResult<Vec<String>> {
        Ok(self.repo.list_ids().await?)
    }

    /// Keys of the artifacts currently stored for a job.
    pub async fn list_artifact_keys(&self, job_id: &str) -> ServiceResult<Vec<ArtifactKey>> {
        self.get_status(job_id).await?;
        self.stored_artifacts(job_id).await
    }

    async fn stored_artifacts(&self, job_id: &str) -> ServiceResult<Vec<ArtifactKey>> {
        let mut keys = Vec::new();
        for key in ArtifactKey::all_for(job_id, self.config.thumbnail_ratios.len()) {
            if self.storage.exists(&key).await? {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Bytes of one stored artifact.
    pub async fn artifact(&self, key: &ArtifactKey) -> ServiceResult<Vec<u8>> {
        self.storage
            .get(key)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Artifact not found: {}", key)))
    }

    /// Cancel a running pipeline, remove the job's artifacts and forget the
    /// job. Returns the record as it was last seen.
    pub async fn delete_job(&self, job_id: &str) -> ServiceResult<JobRecord> {
        self.get_status(job_id).await?;

        let running = self.running.lock().await.remove(job_id);
        if let Some(job) = running {
            job.cancel.cancel();
            if let Err(e) = job.handle.await {
                warn!(job_id, error = %e, "pipeline task ended abnormally");
            }
        }

        for key in self.stored_artifacts(job_id).await? {
            self.storage.delete(&key).await?;
        }

        let record = self
            .repo
            .delete(job_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Job not found: {}", job_id)))?;
        info!(job_id, "job deleted");
        Ok(record)
    }

    /// Ask a processing job to stop. The job ends in `error` with
    /// "job cancelled" once its pipeline notices.
    pub async fn cancel_job(&self, job_id: &str) -> ServiceResult<()> {
        let record = self.get_status(job_id).await?;
        if record.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Job {} already finished",
                job_id
            )));
        }

        let cancelled = match self.running.lock().await.get(job_id) {
            Some(job) => {
                job.cancel.cancel();
                true
            }
            None => false,
        };
        if !cancelled {
            // never scheduled, nothing will pick the token up
            let message = PipelineError::Cancelled.to_string();
            self.repo
                .update(job_id, Box::new(move |r: &mut JobRecord| r.fail(message)))
                .await?;
        }

        info!(job_id, "cancellation requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::memory::{InMemoryJobRepository, MemoryStorage};
    use crate::adapters::synthetic::{SyntheticDecoderFactory, SyntheticVideo};
    use std::time::Duration;

    type Service =
        OrchestratorService<MemoryStorage, InMemoryJobRepository, SyntheticDecoderFactory>;

    fn service_with(config: PipelineConfig) -> (Service, MemoryStorage, InMemoryJobRepository) {
        let storage = MemoryStorage::new();
        let repo = InMemoryJobRepository::new();
        let factory = SyntheticDecoderFactory::new(SyntheticVideo::hard_cut(100, 50));
        let service = OrchestratorService::new(
            Arc::new(storage.clone()),
            Arc::new(repo.clone()),
            Arc::new(factory),
            config,
        );
        (service, storage, repo)
    }

    fn service() -> (Service, MemoryStorage, InMemoryJobRepository) {
        service_with(PipelineConfig::default())
    }

    async fn wait_until_finished(service: &Service, job_id: &str) -> JobRecord {
        for _ in 0..500 {
            let record = service.get_status(job_id).await.unwrap();
            if record.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_submitted_job_completes() {
        let (service, _, _) = service();
        let record = service
            .submit("job-1", "clip.mp4", PathBuf::from("uploads/job-1.mp4"))
            .await
            .unwrap();
        assert_eq!(record.status, JobStatus::Processing);
        assert_eq!(record.progress, 0);

        let finished = wait_until_finished(&service, "job-1").await;
        assert_eq!(finished.status, JobStatus::Completed);

        let result = service.get_result("job-1").await.unwrap();
        assert_eq!(result.scene_detection.total_scenes, 2);
        assert_eq!(service.list_artifact_keys("job-1").await.unwrap().len(), 6);
        assert_eq!(service.list_jobs().await.unwrap(), vec!["job-1".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (service, _, _) = service();
        assert!(matches!(
            service.get_status("ghost").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.get_result("ghost").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_job("ghost").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.cancel_job("ghost").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.list_artifact_keys("ghost").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_results_of_processing_job_conflict() {
        let (service, _, repo) = service();
        repo.insert(JobRecord::new("job-2", "clip.mp4", PathBuf::from("clip.mp4")))
            .await
            .unwrap();

        let err = service.get_result("job-2").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(err.to_string(), "Job not completed yet: job-2");
    }

    #[tokio::test]
    async fn test_submissions_past_the_queue_are_rejected() {
        let (service, _, _) = service_with(PipelineConfig {
            max_concurrent_pipelines: 1,
            max_queued_pipelines: 0,
            ..PipelineConfig::default()
        });

        service
            .submit("job-1", "a.mp4", PathBuf::from("a.mp4"))
            .await
            .unwrap();
        let err = service
            .submit("job-2", "b.mp4", PathBuf::from("b.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Overloaded));
        assert!(matches!(
            service.get_status("job-2").await,
            Err(ServiceError::NotFound(_))
        ));

        wait_until_finished(&service, "job-1").await;
        // the ticket is handed back once the pipeline returns
        for _ in 0..100 {
            if service.queue_slots.available_permits() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        service
            .submit("job-3", "c.mp4", PathBuf::from("c.mp4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let (service, _, _) = service_with(PipelineConfig {
            max_concurrent_pipelines: 1,
            max_queued_pipelines: 1,
            ..PipelineConfig::default()
        });
        service
            .submit("job-1", "a.mp4", PathBuf::from("a.mp4"))
            .await
            .unwrap();
        service
            .submit("job-2", "b.mp4", PathBuf::from("b.mp4"))
            .await
            .unwrap();

        service.cancel_job("job-2").await.unwrap();

        let cancelled = wait_until_finished(&service, "job-2").await;
        assert_eq!(cancelled.status, JobStatus::Error);
        assert_eq!(cancelled.error.as_deref(), Some("job cancelled"));
        let finished = wait_until_finished(&service, "job-1").await;
        assert_eq!(finished.status, JobStatus::Completed);

        assert!(matches!(
            service.cancel_job("job-1").await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_of_unscheduled_job_fails_it() {
        let (service, _, repo) = service();
        repo.insert(JobRecord::new("job-4", "clip.mp4", PathBuf::from("clip.mp4")))
            .await
            .unwrap();

        service.cancel_job("job-4").await.unwrap();
        let record = service.get_status("job-4").await.unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.error.as_deref(), Some("job cancelled"));
    }

    #[tokio::test]
    async fn test_start_pipeline_for_registered_job() {
        let (service, _, repo) = service();
        repo.insert(JobRecord::new("job-5", "clip.mp4", PathBuf::from("clip.mp4")))
            .await
            .unwrap();

        service
            .start_pipeline(PathBuf::from("clip.mp4"), "job-5")
            .await
            .unwrap();
        let finished = wait_until_finished(&service, "job-5").await;
        assert_eq!(finished.status, JobStatus::Completed);

        assert!(matches!(
            service.start_pipeline(PathBuf::from("clip.mp4"), "job-5").await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_completed_job_removes_everything() {
        let (service, storage, _) = service();
        service
            .submit("job-1", "clip.mp4", PathBuf::from("clip.mp4"))
            .await
            .unwrap();
        wait_until_finished(&service, "job-1").await;

        let removed = service.delete_job("job-1").await.unwrap();
        assert_eq!(removed.job_id, "job-1");
        assert!(storage.keys().await.is_empty());
        assert!(matches!(
            service.get_status("job-1").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(service.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_in_flight_job_waits_for_the_pipeline() {
        let (service, storage, _) = service();
        service
            .submit("job-1", "clip.mp4", PathBuf::from("clip.mp4"))
            .await
            .unwrap();

        service.delete_job("job-1").await.unwrap();

        assert!(storage.keys().await.is_empty());
        assert!(service.running.lock().await.is_empty());
        assert!(matches!(
            service.get_status("job-1").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_artifact_lookup() {
        let (service, storage, _) = service();
        let key = ArtifactKey::thumbnail("job-1", 0);
        storage.put(&key, vec![0xff, 0xd8]).await.unwrap();

        assert_eq!(service.artifact(&key).await.unwrap(), vec![0xff, 0xd8]);
        assert!(matches!(
            service.artifact(&ArtifactKey::thumbnail("job-1", 1)).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
