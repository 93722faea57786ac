//! Brightness and motion statistics over a full forward pass.

use super::luma::{mean, mean_abs_diff};
use super::scan::{forward_pass, FrameSink};
use crate::domain::jobs::{FrameAnalysisSummary, MotionStats};
use crate::error::PipelineError;
use crate::ports::decoder::VideoDecoder;
use image::GrayImage;
use tokio_util::sync::CancellationToken;

/// Accumulates per-frame brightness and inter-frame motion scores.
#[derive(Debug, Default)]
pub struct FrameStats {
    previous: Option<GrayImage>,
    brightness_sum: f64,
    motion_scores: Vec<f64>,
    frames: u64,
}

impl FrameSink for FrameStats {
    fn push(&mut self, _index: u64, frame: &GrayImage) {
        self.brightness_sum += mean(frame);
        if let Some(previous) = &self.previous {
            self.motion_scores.push(mean_abs_diff(previous, frame));
        }
        self.previous = Some(frame.clone());
        self.frames += 1;
    }
}

impl FrameStats {
    /// One score per pair of adjacent frames.
    pub fn motion_scores(&self) -> &[f64] {
        &self.motion_scores
    }

    pub fn finish(self) -> FrameAnalysisSummary {
        let average_brightness = if self.frames > 0 {
            self.brightness_sum / self.frames as f64
        } else {
            0.0
        };

        FrameAnalysisSummary {
            average_brightness,
            motion: motion_stats(&self.motion_scores),
            frames_analyzed: self.frames,
        }
    }
}

/// Mean, max and population standard deviation; all zero for no samples.
pub fn motion_stats(scores: &[f64]) -> MotionStats {
    if scores.is_empty() {
        return MotionStats::default();
    }
    let n = scores.len() as f64;
    let average = scores.iter().sum::<f64>() / n;
    let max = scores.iter().copied().fold(f64::MIN, f64::max);
    let variance = scores.iter().map(|s| (s - average).powi(2)).sum::<f64>() / n;

    MotionStats {
        average,
        max,
        std: variance.sqrt(),
    }
}

pub struct FrameAnalyzer {
    pub progress_interval: u64,
}

impl FrameAnalyzer {
    pub fn new(progress_interval: u64) -> Self {
        Self { progress_interval }
    }

    /// Consume `decoder` to end of stream.
    ///
    /// The stream ending before the container's frame count is not an error;
    /// `frames_analyzed` reports what was actually decoded.
    pub fn analyze<D: VideoDecoder + ?Sized>(
        &self,
        decoder: &mut D,
        cancel: &CancellationToken,
        on_progress: &mut dyn FnMut(u64),
    ) -> Result<FrameAnalysisSummary, PipelineError> {
        let mut stats = FrameStats::default();
        forward_pass(
            decoder,
            &mut [&mut stats],
            cancel,
            self.progress_interval,
            on_progress,
        )?;
        Ok(stats.finish())
    }
}
