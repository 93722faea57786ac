//! Error types shared by the pipeline, its ports and the service layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure of a pipeline stage or of a port used by one.
///
/// The message of the error is what ends up verbatim in the job record.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The container could not be opened or carries no usable video stream.
    #[error("validation error: {0}")]
    Validation(String),

    /// A frame could not be read in the middle of the stream.
    #[error("decode error: {0}")]
    Decode(String),

    /// An artifact could not be written, read or removed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("job cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Internal(format!("results serialization failed: {}", err))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Internal(format!("thumbnail encoding failed: {}", err))
    }
}

/// Errors surfaced to the collaborators that submit, query and delete jobs.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown job or artifact.
    #[error("{0}")]
    NotFound(String),

    /// The job is not in a state that allows the request.
    #[error("{0}")]
    Conflict(String),

    #[error("Too many pipelines queued, try again later")]
    Overloaded,

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            ServiceError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_messages_name_the_kind() {
        assert_eq!(
            PipelineError::decode("corrupt packet").to_string(),
            "decode error: corrupt packet"
        );
        assert_eq!(PipelineError::Cancelled.to_string(), "job cancelled");
    }

    #[test]
    fn test_service_error_status_codes() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Overloaded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::from(PipelineError::storage("disk full")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
