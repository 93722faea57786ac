//! HTTP inbound adapter.
//!
//! Exposes upload, status, results, artifact download and job management
//! over JSON. Every route goes through [`OrchestratorService`]; this layer
//! only owns the upload directory.

mod artifacts;
mod jobs;
mod upload;

use crate::application::orchestrator::OrchestratorService;
use crate::ports::decoder::DecoderFactory;
use crate::ports::repository::JobRepository;
use crate::ports::storage::StoragePort;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub struct AppState<S, R, D> {
    pub service: OrchestratorService<S, R, D>,
    /// Directory uploaded videos are streamed into
    pub upload_dir: PathBuf,
}

pub type SharedState<S, R, D> = Arc<AppState<S, R, D>>;

pub fn router<S, R, D>(state: SharedState<S, R, D>, allowed_origin: Option<&str>) -> Router
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    Router::new()
        .route("/", get(jobs::health))
        .route("/upload-video", post(upload::upload_video::<S, R, D>))
        .route("/job-status/:job_id", get(jobs::job_status::<S, R, D>))
        .route("/results/:job_id", get(jobs::results::<S, R, D>))
        .route(
            "/download-results/:job_id",
            get(artifacts::download_results::<S, R, D>),
        )
        .route("/thumbnail/:filename", get(artifacts::thumbnail::<S, R, D>))
        .route("/jobs", get(jobs::list_jobs::<S, R, D>))
        .route("/job/:job_id", delete(jobs::delete_job::<S, R, D>))
        .route("/job/:job_id/cancel", post(jobs::cancel_job::<S, R, D>))
        .layer(DefaultBodyLimit::disable())
        .layer(cors(allowed_origin))
        .with_state(state)
}

fn cors(allowed_origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "invalid allowed origin, allowing any");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::memory::{InMemoryJobRepository, MemoryStorage};
    use crate::adapters::synthetic::{SyntheticDecoderFactory, SyntheticVideo};
    use crate::config::PipelineConfig;
    use crate::domain::artifacts::ArtifactKey;
    use crate::domain::jobs::JobRecord;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        storage: MemoryStorage,
        repo: InMemoryJobRepository,
        uploads: TempDir,
    }

    fn app() -> TestApp {
        let storage = MemoryStorage::new();
        let repo = InMemoryJobRepository::new();
        let uploads = tempdir().unwrap();
        let service = OrchestratorService::new(
            Arc::new(storage.clone()),
            Arc::new(repo.clone()),
            Arc::new(SyntheticDecoderFactory::new(SyntheticVideo::hard_cut(100, 50))),
            PipelineConfig::default(),
        );
        let state = Arc::new(AppState {
            service,
            upload_dir: uploads.path().to_path_buf(),
        });
        TestApp {
            router: router(state, None),
            storage,
            repo,
            uploads,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    async fn get(router: &Router, uri: &str) -> Response {
        send(router, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn multipart(filename: &str, content_type: &str, data: &str) -> Request<Body> {
        let body = format!(
            "--BOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: {}\r\n\r\n\
             {}\r\n\
             --BOUNDARY--\r\n",
            filename, content_type, data
        );
        Request::post("/upload-video")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let response = get(&app.router, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["message"], "Video Analysis Pipeline API");
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn test_upload_then_fetch_results() {
        let app = app();
        let request = multipart("clip.mp4", "video/mp4", "not really a video");
        let response = send(&app.router, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        let job_id = body["job_id"].as_str().unwrap().to_string();
        assert_eq!(body["status"], "processing");
        assert!(app.uploads.path().join(format!("{}.mp4", job_id)).exists());

        let mut status = Value::Null;
        for _ in 0..500 {
            status = json(get(&app.router, &format!("/job-status/{}", job_id)).await).await;
            if status["status"] != "processing" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status["status"], "completed");
        assert_eq!(status["progress"], 100);
        assert!(status.get("video_path").is_none());

        let results = json(get(&app.router, &format!("/results/{}", job_id)).await).await;
        assert_eq!(results["scene_detection"]["total_scenes"], 2);

        let download = get(&app.router, &format!("/download-results/{}", job_id)).await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert!(download.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains(&job_id));

        let thumb = get(&app.router, &format!("/thumbnail/{}_thumb_0.jpg", job_id)).await;
        assert_eq!(thumb.status(), StatusCode::OK);
        assert_eq!(thumb.headers()[header::CONTENT_TYPE], "image/jpeg");

        let jobs = json(get(&app.router, "/jobs").await).await;
        assert_eq!(jobs["jobs"], serde_json::json!([job_id]));

        let deleted = send(
            &app.router,
            Request::delete(format!("/job/{}", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(app.storage.keys().await.is_empty());
        assert!(!app.uploads.path().join(format!("{}.mp4", job_id)).exists());
        assert_eq!(
            get(&app.router, &format!("/job-status/{}", job_id))
                .await
                .status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_upload_rejects_non_video() {
        let app = app();
        let response = send(&app.router, multipart("notes.txt", "text/plain", "hello")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("video"));
        assert_eq!(std::fs::read_dir(app.uploads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let app = app();
        let response = get(&app.router, "/job-status/ghost").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["detail"], "Job not found: ghost");
        assert_eq!(
            get(&app.router, "/download-results/ghost").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_results_of_processing_job_is_409() {
        let app = app();
        app.repo
            .insert(JobRecord::new("job-7", "clip.mp4", "clip.mp4".into()))
            .await
            .unwrap();
        let response = get(&app.router, "/results/job-7").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cancel_finished_job_is_409() {
        let app = app();
        let mut record = JobRecord::new("job-8", "clip.mp4", "clip.mp4".into());
        record.fail("decode error: broken");
        app.repo.insert(record).await.unwrap();

        let response = send(
            &app.router,
            Request::post("/job/job-8/cancel").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_thumbnail_lookup() {
        let app = app();
        app.storage
            .put(&ArtifactKey::thumbnail("job-9", 1), vec![0xff, 0xd8])
            .await
            .unwrap();

        assert_eq!(
            get(&app.router, "/thumbnail/job-9_thumb_1.jpg").await.status(),
            StatusCode::OK
        );
        assert_eq!(
            get(&app.router, "/thumbnail/job-9_thumb_2.jpg").await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get(&app.router, "/thumbnail/..%2Fsecret.jpg").await.status(),
            StatusCode::NOT_FOUND
        );
    }
}
