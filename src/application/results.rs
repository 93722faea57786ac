use crate::domain::artifacts::ArtifactKey;
use crate::domain::jobs::AnalysisResult;
use crate::error::PipelineError;
use crate::ports::storage::StoragePort;
use std::sync::Arc;

/// Persists the aggregated analysis as one JSON document per job.
pub struct ResultsWriter<S> {
    storage: Arc<S>,
}

impl<S: StoragePort> ResultsWriter<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Stamp `results_file` and store the document.
    ///
    /// The name is set before serializing so the stored document equals the
    /// returned value.
    pub async fn write(
        &self,
        job_id: &str,
        mut result: AnalysisResult,
    ) -> Result<AnalysisResult, PipelineError> {
        let key = ArtifactKey::results(job_id);
        result.results_file = key.file_name();
        let document = serde_json::to_vec_pretty(&result)?;
        self.storage.put(&key, document).await?;
        Ok(result)
    }

    pub async fn read(&self, job_id: &str) -> Result<Option<AnalysisResult>, PipelineError> {
        match self.storage.get(&ArtifactKey::results(job_id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
