//! Vidlens - Video Analysis Library
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (av analysis passes, jobs, artifacts)
//! - ports/: Trait definitions (decoder, storage, job repository)
//! - adapters/: Concrete implementations
//! - application/: Generic services
//! - config: Environment configuration
//! - error: Pipeline and service errors
//!
//! # Features
//! - `ffmpeg`: Decode real containers through libav and build the `monolith` binary

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

// Re-exports for convenience
pub use application::orchestrator::OrchestratorService;
pub use config::{LocalConfig, PassMode, PipelineConfig};
pub use domain::av;
pub use error::{PipelineError, ServiceError};
