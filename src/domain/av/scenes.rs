//! Scene segmentation by thresholded inter-frame luminance difference.

use super::luma::mean_abs_diff;
use super::scan::{forward_pass, FrameSink};
use crate::domain::jobs::{Scene, SceneDetectionSummary};
use crate::error::PipelineError;
use crate::ports::decoder::VideoDecoder;
use image::GrayImage;
use tokio_util::sync::CancellationToken;

/// Splits the frame sequence into scenes while frames are pushed.
///
/// A cut happens when the difference to the previous frame is strictly
/// greater than the threshold.
#[derive(Debug)]
pub struct SceneCuts {
    threshold: f64,
    previous: Option<GrayImage>,
    scene_start: u64,
    frames: u64,
    /// Closed scenes as `(start, end)` frame ranges
    ranges: Vec<(u64, u64)>,
}

impl SceneCuts {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
            scene_start: 0,
            frames: 0,
            ranges: Vec::new(),
        }
    }

    /// Close the open scene and return every scene of the stream.
    pub fn finish(mut self, fps: f64) -> Vec<Scene> {
        if self.scene_start < self.frames {
            self.ranges.push((self.scene_start, self.frames));
        }
        self.ranges
            .into_iter()
            .map(|(start_frame, end_frame)| Scene {
                start_frame,
                end_frame,
                duration: frames_to_seconds(end_frame - start_frame, fps),
            })
            .collect()
    }
}

impl FrameSink for SceneCuts {
    fn push(&mut self, index: u64, frame: &GrayImage) {
        if let Some(previous) = &self.previous {
            if mean_abs_diff(previous, frame) > self.threshold {
                self.ranges.push((self.scene_start, index));
                self.scene_start = index;
            }
        }
        self.previous = Some(frame.clone());
        self.frames = index + 1;
    }
}

pub fn frames_to_seconds(frames: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        frames as f64 / fps
    } else {
        0.0
    }
}

/// Report at most `max_reported` scenes; count and mean use the full list.
pub fn summarize(scenes: Vec<Scene>, max_reported: usize) -> SceneDetectionSummary {
    let total_scenes = scenes.len();
    let average_scene_duration = if scenes.is_empty() {
        0.0
    } else {
        scenes.iter().map(|s| s.duration).sum::<f64>() / total_scenes as f64
    };

    let mut scenes = scenes;
    scenes.truncate(max_reported);

    SceneDetectionSummary {
        total_scenes,
        scenes,
        average_scene_duration,
    }
}

pub struct SceneDetector {
    pub threshold: f64,
    pub max_reported: usize,
}

impl SceneDetector {
    pub fn new(threshold: f64, max_reported: usize) -> Self {
        Self {
            threshold,
            max_reported,
        }
    }

    /// Run a full pass over a freshly opened decoder.
    pub fn detect<D: VideoDecoder + ?Sized>(
        &self,
        decoder: &mut D,
        cancel: &CancellationToken,
    ) -> Result<SceneDetectionSummary, PipelineError> {
        let fps = decoder.metadata().fps;
        let mut cuts = SceneCuts::new(self.threshold);
        forward_pass(decoder, &mut [&mut cuts], cancel, 0, &mut |_| {})?;
        Ok(summarize(cuts.finish(fps), self.max_reported))
    }
}
