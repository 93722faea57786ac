use super::SharedState;
use crate::application::orchestrator::OrchestratorService;
use crate::error::{PipelineError, ServiceError, ServiceResult};
use crate::ports::decoder::DecoderFactory;
use crate::ports::repository::JobRepository;
use crate::ports::storage::StoragePort;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::{BoxError, Json};
use futures::{Stream, TryStreamExt};
use serde_json::{json, Value};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tracing::{info, warn};

const DEFAULT_EXTENSION: &str = "mp4";

// Accepts a multipart upload, saves the first file field and submits it.
pub async fn upload_video<S, R, D>(
    State(state): State<SharedState<S, R, D>>,
    mut multipart: Multipart,
) -> ServiceResult<Json<Value>>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidUpload(e.to_string()))?
    {
        let file_name = if let Some(file_name) = field.file_name() {
            file_name.to_owned()
        } else {
            continue;
        };

        let content_type = field.content_type().unwrap_or_default();
        if !content_type.starts_with("video/") {
            return Err(ServiceError::InvalidUpload(String::from(
                "File must be a video",
            )));
        }

        let job_id = OrchestratorService::<S, R, D>::new_job_id();
        let path = state
            .upload_dir
            .join(format!("{}.{}", job_id, extension_of(&file_name)));
        info!(
            job_id = %job_id,
            file_name = %file_name,
            path = %path.display(),
            "saving upload"
        );
        let submitted = match stream_to_file(&path, field).await {
            Ok(()) => state.service.submit(&job_id, &file_name, path.clone()).await,
            Err(e) => Err(e.into()),
        };

        return match submitted {
            Ok(record) => Ok(Json(json!({
                "job_id": record.job_id,
                "status": record.status,
                "message": "Video uploaded successfully. Analysis started.",
            }))),
            Err(e) => {
                // nothing will ever read this upload
                discard_upload(&path).await;
                Err(e)
            }
        };
    }

    Err(ServiceError::InvalidUpload(String::from(
        "No file in upload",
    )))
}

async fn discard_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove rejected upload"),
    }
}

/// Extension to save an upload under. Anything that is not a short
/// alphanumeric suffix falls back to `mp4`.
pub fn extension_of(file_name: &str) -> String {
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext)
            if !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => String::from(DEFAULT_EXTENSION),
    }
}

// Save a `Stream` to a file
pub async fn stream_to_file<S, E>(path: &Path, stream: S) -> Result<(), PipelineError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    async {
        let body_with_io_error = stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = BufWriter::new(File::create(path).await?);
        tokio::io::copy(&mut body_reader, &mut file).await?;
        file.flush().await?;

        Ok::<_, io::Error>(())
    }
    .await
    .map_err(|err| PipelineError::storage(format!("failed to save upload: {}", err)))
}
