//! Configuration loaded from the environment.

use std::env;
use std::str::FromStr;

/// Frame ratios sampled for thumbnails (10%, 25%, 50%, 75%, 90%).
pub const DEFAULT_THUMBNAIL_RATIOS: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Configuration for the HTTP monolith.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Directory receiving uploaded videos
    pub upload_dir: String,
    /// Directory holding results documents and thumbnails
    pub results_dir: String,
    /// Origin allowed by CORS, any origin when unset
    pub allowed_origin: Option<String>,
}

impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("8000")),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| String::from("uploads")),
            results_dir: env::var("RESULTS_DIR").unwrap_or_else(|_| String::from("results")),
            allowed_origin: env::var("ALLOWED_ORIGIN").ok(),
        }
    }
}

/// How the two statistics passes read the video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PassMode {
    /// Frame statistics and scene detection each decode the whole stream.
    #[default]
    Separate,
    /// One decode feeds both accumulators.
    Combined,
}

impl FromStr for PassMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "separate" => Ok(PassMode::Separate),
            "combined" => Ok(PassMode::Combined),
            other => Err(format!("unknown pass mode: {}", other)),
        }
    }
}

/// Tunables of the analysis pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Mean absolute luminance difference above which a new scene starts
    pub scene_threshold: f64,
    /// Number of scenes kept in the reported list
    pub max_reported_scenes: usize,
    pub thumbnail_ratios: Vec<f64>,
    pub thumbnail_width: u32,
    pub thumbnail_quality: u8,
    /// Frames between two fine-grained progress reports
    pub progress_interval: u64,
    pub pass_mode: PassMode,
    pub max_concurrent_pipelines: usize,
    /// Submissions allowed to wait for a free pipeline slot
    pub max_queued_pipelines: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scene_threshold: 30.0,
            max_reported_scenes: 10,
            thumbnail_ratios: DEFAULT_THUMBNAIL_RATIOS.to_vec(),
            thumbnail_width: 320,
            thumbnail_quality: 95,
            progress_interval: 30,
            pass_mode: PassMode::Separate,
            max_concurrent_pipelines: 4,
            max_queued_pipelines: 64,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by whatever is set in the environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Self {
            scene_threshold: env_or("SCENE_THRESHOLD", defaults.scene_threshold),
            thumbnail_width: env_or("THUMBNAIL_WIDTH", defaults.thumbnail_width),
            pass_mode: env_or("PASS_MODE", defaults.pass_mode),
            max_concurrent_pipelines: env_or(
                "MAX_CONCURRENT_PIPELINES",
                defaults.max_concurrent_pipelines,
            )
            .max(1),
            max_queued_pipelines: env_or("MAX_QUEUED_PIPELINES", defaults.max_queued_pipelines),
            ..defaults
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
