use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a job. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Stage the pipeline is currently in, reported as `current_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Initialized,
    BasicInfo,
    FrameAnalysis,
    SceneDetection,
    Thumbnails,
    Finalizing,
    Completed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Initialized => "initialized",
            PipelineStage::BasicInfo => "basic_info",
            PipelineStage::FrameAnalysis => "frame_analysis",
            PipelineStage::SceneDetection => "scene_detection",
            PipelineStage::Thumbnails => "thumbnails",
            PipelineStage::Finalizing => "finalizing",
            PipelineStage::Completed => "completed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Container level facts about the uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub fps: f64,
    pub frame_count: u64,
    pub resolution: Resolution,
    pub duration_seconds: f64,
    pub file_size_mb: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionStats {
    pub average: f64,
    pub max: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysisSummary {
    pub average_brightness: f64,
    #[serde(rename = "motion_scores")]
    pub motion: MotionStats,
    pub frames_analyzed: u64,
}

/// A contiguous run of frames, `[start_frame, end_frame)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub start_frame: u64,
    pub end_frame: u64,
    /// Length in seconds
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDetectionSummary {
    /// Number of scenes found, before the list is truncated
    pub total_scenes: usize,
    pub scenes: Vec<Scene>,
    /// Mean over every scene found, not only the reported ones
    pub average_scene_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailMeta {
    pub filename: String,
    pub timestamp: f64,
    pub frame_number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub basic_info: BasicInfo,
    pub frame_analysis: FrameAnalysisSummary,
    pub scene_detection: SceneDetectionSummary,
    pub thumbnails: Vec<ThumbnailMeta>,
    pub results_file: String,
}

/// Tracked state of one submitted video.
///
/// Mutators are no-ops once the job reached a terminal status, and progress
/// never moves backwards while the job is processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub current_step: PipelineStage,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Where the upload was saved; never sent to clients
    #[serde(skip)]
    pub video_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(
        job_id: impl Into<String>,
        filename: impl Into<String>,
        video_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            status: JobStatus::Processing,
            current_step: PipelineStage::Initialized,
            progress: 0,
            message: String::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            video_path,
            results: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move to `stage` and raise progress to at least `progress`.
    pub fn advance(&mut self, stage: PipelineStage, progress: u8, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.current_step = stage;
        self.progress = self.progress.max(progress.min(99));
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    /// Replace the message without touching progress.
    pub fn note(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.message = message.into();
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, results: AnalysisResult) {
        if self.is_terminal() {
            return;
        }
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.current_step = PipelineStage::Completed;
        self.progress = 100;
        self.message = String::from("Analysis completed successfully!");
        self.results = Some(results);
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Error;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
