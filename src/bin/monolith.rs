//! Monolith Binary - Local deployment of the video analysis API
//!
//! This is the main entry point for local development and single-server deployment.
//! It wires up:
//! - Local adapters (filesystem storage, in-memory job repository)
//! - The libav decoder
//! - HTTP inbound adapter

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vidlens::adapters::ffmpeg::FfmpegDecoderFactory;
use vidlens::adapters::local::{router, AppState, FsStorage, InMemoryJobRepository};
use vidlens::{LocalConfig, OrchestratorService, PipelineConfig};

#[tokio::main]
async fn main() {
    let config = LocalConfig::from_env();
    let pipeline = PipelineConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 1. Adapters (Local implementations)
    let upload_dir = PathBuf::from(&config.upload_dir);
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .expect("Failed to create upload directory");
    tokio::fs::create_dir_all(&config.results_dir)
        .await
        .expect("Failed to create results directory");

    let storage = Arc::new(FsStorage::new(&config.results_dir));
    let repo = Arc::new(InMemoryJobRepository::new());
    let decoders = Arc::new(FfmpegDecoderFactory::new());

    // 2. Application Services
    tracing::info!(
        pass_mode = ?pipeline.pass_mode,
        max_concurrent = pipeline.max_concurrent_pipelines,
        max_queued = pipeline.max_queued_pipelines,
        "pipeline configured"
    );
    let service = OrchestratorService::new(storage, repo, decoders, pipeline);

    // 3. HTTP Layer
    let state = Arc::new(AppState {
        service,
        upload_dir,
    });
    let app = router(state, config.allowed_origin.as_deref());

    // 4. Start Server
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    tracing::info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
