use crate::application::results::ResultsWriter;
use crate::config::{PassMode, PipelineConfig};
use crate::domain::artifacts::ArtifactKey;
use crate::domain::av::frame_analysis::{FrameAnalyzer, FrameStats};
use crate::domain::av::scan::{forward_pass, FrameSink};
use crate::domain::av::scenes::{frames_to_seconds, summarize, SceneCuts, SceneDetector};
use crate::domain::av::thumbnails::ThumbnailSampler;
use crate::domain::jobs::{
    AnalysisResult, BasicInfo, FrameAnalysisSummary, JobRecord, PipelineStage, Resolution,
    SceneDetectionSummary, ThumbnailMeta,
};
use crate::error::PipelineError;
use crate::ports::decoder::{DecoderFactory, VideoDecoder};
use crate::ports::repository::{JobRepository, RecordUpdate};
use crate::ports::storage::StoragePort;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Runs the analysis stages of one job and keeps its record current.
///
/// Stages run in order: basic info, frame analysis, scene detection,
/// thumbnails, finalize. Every decode pass opens its own decoder handle on a
/// blocking thread. The first failing stage moves the job to `error`.
pub struct AnalysisWorker<S, R, D> {
    storage: Arc<S>,
    repo: Arc<R>,
    decoders: Arc<D>,
    config: Arc<PipelineConfig>,
}

impl<S, R, D> Clone for AnalysisWorker<S, R, D> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            repo: Arc::clone(&self.repo),
            decoders: Arc::clone(&self.decoders),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, R, D> AnalysisWorker<S, R, D>
where
    S: StoragePort + 'static,
    R: JobRepository + 'static,
    D: DecoderFactory,
{
    pub fn new(
        storage: Arc<S>,
        repo: Arc<R>,
        decoders: Arc<D>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            storage,
            repo,
            decoders,
            config,
        }
    }

    /// Run the whole pipeline for `job_id`. Leaves the record either
    /// `completed` or `error`; nothing is returned to the caller.
    pub async fn run(&self, job_id: &str, video_path: &Path, cancel: CancellationToken) {
        info!(job_id, path = %video_path.display(), "pipeline started");
        match self.execute(job_id, video_path, &cancel).await {
            Ok(result) => info!(
                job_id,
                frames = result.frame_analysis.frames_analyzed,
                scenes = result.scene_detection.total_scenes,
                thumbnails = result.thumbnails.len(),
                "pipeline completed"
            ),
            Err(e) => self.record_failure(job_id, e).await,
        }
    }

    /// Move the job to `error` with the message of `err`.
    pub async fn record_failure(&self, job_id: &str, err: PipelineError) {
        error!(job_id, error = %err, "pipeline failed");
        let message = err.to_string();
        let update = Box::new(move |r: &mut JobRecord| r.fail(message));
        if let Err(e) = self.repo.update(job_id, update).await {
            error!(job_id, error = %e, "could not record pipeline failure");
        }
    }

    async fn execute(
        &self,
        job_id: &str,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let basic_info = self.basic_info(job_id, video_path, cancel).await?;

        let (frame_analysis, scene_detection) = match self.config.pass_mode {
            PassMode::Separate => {
                let frames = self
                    .frame_analysis(job_id, video_path, basic_info.frame_count, cancel)
                    .await?;
                let scenes = self.scene_detection(job_id, video_path, cancel).await?;
                (frames, scenes)
            }
            PassMode::Combined => {
                self.combined_pass(job_id, video_path, basic_info.frame_count, cancel)
                    .await?
            }
        };

        let thumbnails = self.thumbnails(job_id, video_path, cancel).await?;

        self.finalize(
            job_id,
            AnalysisResult {
                basic_info,
                frame_analysis,
                scene_detection,
                thumbnails,
                results_file: String::new(),
            },
            cancel,
        )
        .await
    }

    async fn basic_info(
        &self,
        job_id: &str,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<BasicInfo, PipelineError> {
        self.report(
            job_id,
            PipelineStage::BasicInfo,
            10,
            "Extracting basic video information...",
            cancel,
        )
        .await?;

        let decoders = Arc::clone(&self.decoders);
        let path = video_path.to_path_buf();
        let metadata = blocking(move || decoders.open(&path).map(|d| d.metadata().clone())).await?;

        let info = BasicInfo {
            fps: metadata.fps,
            frame_count: metadata.frame_count,
            resolution: Resolution {
                width: metadata.width,
                height: metadata.height,
            },
            duration_seconds: frames_to_seconds(metadata.frame_count, metadata.fps),
            file_size_mb: metadata.file_size_bytes as f64 / BYTES_PER_MB,
        };
        debug!(job_id, fps = info.fps, frames = info.frame_count, "basic info extracted");

        self.report(job_id, PipelineStage::BasicInfo, 20, "Basic info extracted", cancel)
            .await?;
        Ok(info)
    }

    async fn frame_analysis(
        &self,
        job_id: &str,
        video_path: &Path,
        frame_count: u64,
        cancel: &CancellationToken,
    ) -> Result<FrameAnalysisSummary, PipelineError> {
        self.report(job_id, PipelineStage::FrameAnalysis, 30, "Analyzing frames...", cancel)
            .await?;

        let analyzer = FrameAnalyzer::new(self.config.progress_interval);
        let summary = self
            .scan(job_id, video_path, frame_count, cancel, move |decoder, cancel, progress| {
                analyzer.analyze(decoder, cancel, progress)
            })
            .await?;

        self.report(job_id, PipelineStage::FrameAnalysis, 60, "Frame analysis completed", cancel)
            .await?;
        Ok(summary)
    }

    async fn scene_detection(
        &self,
        job_id: &str,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<SceneDetectionSummary, PipelineError> {
        self.report(job_id, PipelineStage::SceneDetection, 70, "Detecting scenes...", cancel)
            .await?;

        let detector =
            SceneDetector::new(self.config.scene_threshold, self.config.max_reported_scenes);
        let decoders = Arc::clone(&self.decoders);
        let path = video_path.to_path_buf();
        let token = cancel.clone();
        let summary = blocking(move || {
            let mut decoder = decoders.open(&path)?;
            detector.detect(&mut decoder, &token)
        })
        .await?;

        self.report(job_id, PipelineStage::SceneDetection, 80, "Scene detection completed", cancel)
            .await?;
        Ok(summary)
    }

    /// Frame statistics and scene cuts from a single decode.
    async fn combined_pass(
        &self,
        job_id: &str,
        video_path: &Path,
        frame_count: u64,
        cancel: &CancellationToken,
    ) -> Result<(FrameAnalysisSummary, SceneDetectionSummary), PipelineError> {
        self.report(job_id, PipelineStage::FrameAnalysis, 30, "Analyzing frames...", cancel)
            .await?;

        let threshold = self.config.scene_threshold;
        let max_reported = self.config.max_reported_scenes;
        let interval = self.config.progress_interval;
        let (frames, scenes) = self
            .scan(job_id, video_path, frame_count, cancel, move |decoder, cancel, progress| {
                let fps = decoder.metadata().fps;
                let mut stats = FrameStats::default();
                let mut cuts = SceneCuts::new(threshold);
                let mut sinks: [&mut dyn FrameSink; 2] = [&mut stats, &mut cuts];
                forward_pass(decoder, &mut sinks, cancel, interval, progress)?;
                Ok((stats.finish(), summarize(cuts.finish(fps), max_reported)))
            })
            .await?;

        self.report(job_id, PipelineStage::FrameAnalysis, 60, "Frame analysis completed", cancel)
            .await?;
        self.report(job_id, PipelineStage::SceneDetection, 70, "Detecting scenes...", cancel)
            .await?;
        self.report(job_id, PipelineStage::SceneDetection, 80, "Scene detection completed", cancel)
            .await?;
        Ok((frames, scenes))
    }

    async fn thumbnails(
        &self,
        job_id: &str,
        video_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<ThumbnailMeta>, PipelineError> {
        self.report(job_id, PipelineStage::Thumbnails, 90, "Generating thumbnails...", cancel)
            .await?;

        let sampler = ThumbnailSampler::new(
            self.config.thumbnail_ratios.clone(),
            self.config.thumbnail_width,
            self.config.thumbnail_quality,
        );
        let decoders = Arc::clone(&self.decoders);
        let path = video_path.to_path_buf();
        let token = cancel.clone();
        let samples = blocking(move || {
            let mut decoder = decoders.open(&path)?;
            sampler.sample(&mut decoder, &token)
        })
        .await?;

        let mut thumbnails = Vec::with_capacity(samples.len());
        for sample in samples {
            let key = ArtifactKey::thumbnail(job_id, sample.slot);
            self.storage.put(&key, sample.jpeg).await?;
            thumbnails.push(ThumbnailMeta {
                filename: key.file_name(),
                timestamp: sample.timestamp,
                frame_number: sample.frame_number,
            });
        }

        self.report(job_id, PipelineStage::Thumbnails, 95, "Thumbnails generated", cancel)
            .await?;
        Ok(thumbnails)
    }

    async fn finalize(
        &self,
        job_id: &str,
        result: AnalysisResult,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        self.report(job_id, PipelineStage::Finalizing, 98, "Finalizing results...", cancel)
            .await?;

        let result = ResultsWriter::new(Arc::clone(&self.storage))
            .write(job_id, result)
            .await?;

        let completed = result.clone();
        self.repo
            .update(job_id, Box::new(move |r: &mut JobRecord| r.complete(completed)))
            .await?;
        Ok(result)
    }

    /// Run a forward pass on a blocking thread, relaying its frame counts
    /// into the record while it runs.
    async fn scan<T, W>(
        &self,
        job_id: &str,
        video_path: &Path,
        frame_count: u64,
        cancel: &CancellationToken,
        work: W,
    ) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        W: FnOnce(
                &mut D::Decoder,
                &CancellationToken,
                &mut dyn FnMut(u64),
            ) -> Result<T, PipelineError>
            + Send
            + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let decoders = Arc::clone(&self.decoders);
        let path: PathBuf = video_path.to_path_buf();
        let pass_cancel = cancel.child_token();
        let token = pass_cancel.clone();

        let pass = tokio::task::spawn_blocking(move || {
            let mut decoder = decoders.open(&path)?;
            work(&mut decoder, &token, &mut |processed| {
                let _ = tx.send(processed);
            })
        });

        // the sender is dropped when the pass returns, which ends this loop
        while let Some(processed) = rx.recv().await {
            if let Err(e) = self.report_frames(job_id, processed, frame_count).await {
                // stop the decode and wait for it before giving up
                pass_cancel.cancel();
                drop(rx);
                let _ = pass.await;
                return Err(e);
            }
        }

        pass.await
            .map_err(|e| PipelineError::internal(format!("analysis task failed: {}", e)))?
    }

    async fn report_frames(
        &self,
        job_id: &str,
        processed: u64,
        frame_count: u64,
    ) -> Result<(), PipelineError> {
        let message = format!("Processed {} frames", processed);
        let update: RecordUpdate = match frame_progress(processed, frame_count) {
            Some(progress) => Box::new(move |r: &mut JobRecord| {
                r.advance(PipelineStage::FrameAnalysis, progress, message)
            }),
            None => Box::new(move |r: &mut JobRecord| r.note(message)),
        };
        self.repo.update(job_id, update).await?;
        Ok(())
    }

    async fn report(
        &self,
        job_id: &str,
        stage: PipelineStage,
        progress: u8,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        debug!(job_id, %stage, progress, "{}", message);
        let message = message.to_string();
        self.repo
            .update(job_id, Box::new(move |r: &mut JobRecord| r.advance(stage, progress, message)))
            .await?;
        Ok(())
    }
}

/// Progress inside the frame analysis window, 30 to 60.
/// Unknown frame counts yield no percentage.
fn frame_progress(processed: u64, frame_count: u64) -> Option<u8> {
    if frame_count == 0 {
        return None;
    }
    let span = processed.min(frame_count) * 30 / frame_count;
    Some(30 + span as u8)
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::internal(format!("analysis task failed: {}", e)))?
}
