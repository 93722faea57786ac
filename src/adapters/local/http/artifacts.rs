use super::SharedState;
use crate::domain::artifacts::ArtifactKey;
use crate::error::{ServiceError, ServiceResult};
use crate::ports::decoder::DecoderFactory;
use crate::ports::repository::JobRepository;
use crate::ports::storage::StoragePort;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

pub async fn download_results<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    Path(job_id): Path<String>,
) -> ServiceResult<impl IntoResponse>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    state.service.get_status(&job_id).await?;
    let key = ArtifactKey::results(job_id.as_str());
    let document = state.service.artifact(&key).await?;

    let disposition = format!(
        "attachment; filename=\"analysis_results_{}.json\"",
        job_id
    );
    Ok((
        [
            (header::CONTENT_TYPE, key.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    ))
}

pub async fn thumbnail<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    Path(filename): Path<String>,
) -> ServiceResult<impl IntoResponse>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    let key = ArtifactKey::parse_thumbnail(&filename)
        .ok_or_else(|| ServiceError::NotFound(format!("Thumbnail not found: {}", filename)))?;
    let image = state.service.artifact(&key).await?;
    Ok(([(header::CONTENT_TYPE, key.content_type())], image))
}
