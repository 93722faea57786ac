//! Domain layer - Pure business logic.

// Frame scanning, scene detection and thumbnail sampling
pub mod av;

// Artifact addressing
pub mod artifacts;

// Job record and analysis result model
pub mod jobs;
