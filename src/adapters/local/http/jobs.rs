use super::SharedState;
use crate::domain::jobs::{AnalysisResult, JobRecord};
use crate::error::ServiceResult;
use crate::ports::decoder::DecoderFactory;
use crate::ports::repository::JobRepository;
use crate::ports::storage::StoragePort;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::io::ErrorKind;

pub async fn health() -> Json<Value> {
    Json(json!({
        "message": "Video Analysis Pipeline API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

pub async fn job_status<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    Path(job_id): Path<String>,
) -> ServiceResult<Json<JobRecord>>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    Ok(Json(state.service.get_status(&job_id).await?))
}

pub async fn results<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    Path(job_id): Path<String>,
) -> ServiceResult<Json<AnalysisResult>>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    Ok(Json(state.service.get_result(&job_id).await?))
}

pub async fn list_jobs<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
) -> ServiceResult<Json<Value>>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    let jobs = state.service.list_jobs().await?;
    Ok(Json(json!({ "jobs": jobs })))
}

pub async fn delete_job<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    Path(job_id): Path<String>,
) -> ServiceResult<Json<Value>>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    let record = state.service.delete_job(&job_id).await?;

    // the upload belongs to this layer, the service never touches it
    match tokio::fs::remove_file(&record.video_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(job_id = %job_id, error = %e, "could not remove upload"),
    }

    Ok(Json(json!({ "message": "Job deleted successfully" })))
}

pub async fn cancel_job<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    Path(job_id): Path<String>,
) -> ServiceResult<Json<Value>>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    state.service.cancel_job(&job_id).await?;
    Ok(Json(json!({ "message": "Job cancellation requested" })))
}
