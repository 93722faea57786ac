//! Synthetic decoder producing solid-colour frames.
//!
//! Used to exercise the analysis passes without real media: constant clips,
//! hard cuts, streams that end before their advertised length, and injected
//! read or seek failures.

use crate::error::PipelineError;
use crate::ports::decoder::{DecoderFactory, VideoDecoder, VideoMetadata};
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

type ColorFn = Arc<dyn Fn(u64) -> Rgb<u8> + Send + Sync>;

/// Description of a synthetic clip.
#[derive(Clone)]
pub struct SyntheticVideo {
    metadata: VideoMetadata,
    /// Frames actually produced; may differ from `metadata.frame_count`
    decoded_frames: u64,
    color: ColorFn,
    failing_read_at: Option<u64>,
    failing_seeks: HashSet<u64>,
}

impl SyntheticVideo {
    /// `frames` frames of 16x9 pixels at 25 fps, coloured by `color(index)`.
    pub fn new(frames: u64, color: impl Fn(u64) -> Rgb<u8> + Send + Sync + 'static) -> Self {
        Self {
            metadata: VideoMetadata {
                fps: 25.0,
                frame_count: frames,
                width: 16,
                height: 9,
                file_size_bytes: 1024 * 1024,
            },
            decoded_frames: frames,
            color: Arc::new(color),
            failing_read_at: None,
            failing_seeks: HashSet::new(),
        }
    }

    pub fn constant(frames: u64, color: Rgb<u8>) -> Self {
        Self::new(frames, move |_| color)
    }

    /// Black until `cut`, white from `cut` onwards.
    pub fn hard_cut(frames: u64, cut: u64) -> Self {
        Self::new(frames, move |i| {
            if i < cut {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.metadata.fps = fps;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.metadata.width = width;
        self.metadata.height = height;
        self
    }

    /// Advertise `frame_count` in the metadata regardless of the real length.
    pub fn reported_frames(mut self, frame_count: u64) -> Self {
        self.metadata.frame_count = frame_count;
        self
    }

    /// Reading frame `index` fails with a decode error.
    pub fn failing_read_at(mut self, index: u64) -> Self {
        self.failing_read_at = Some(index);
        self
    }

    /// Seeking to `index` fails.
    pub fn failing_seek_at(mut self, index: u64) -> Self {
        self.failing_seeks.insert(index);
        self
    }

    pub fn decoder(&self) -> SyntheticDecoder {
        SyntheticDecoder {
            video: self.clone(),
            position: 0,
        }
    }
}

pub struct SyntheticDecoder {
    video: SyntheticVideo,
    position: u64,
}

impl VideoDecoder for SyntheticDecoder {
    fn metadata(&self) -> &VideoMetadata {
        &self.video.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, PipelineError> {
        if self.video.failing_read_at == Some(self.position) {
            return Err(PipelineError::decode(format!(
                "corrupt packet at frame {}",
                self.position
            )));
        }
        if self.position >= self.video.decoded_frames {
            return Ok(None);
        }
        let VideoMetadata { width, height, .. } = self.video.metadata;
        let frame = RgbImage::from_pixel(width, height, (self.video.color)(self.position));
        self.position += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), PipelineError> {
        if self.video.failing_seeks.contains(&frame_index) {
            return Err(PipelineError::decode(format!(
                "cannot seek to frame {}",
                frame_index
            )));
        }
        self.position = frame_index;
        Ok(())
    }
}

/// Factory handing out fresh handles over the same synthetic clip,
/// whatever path is asked for.
#[derive(Clone)]
pub struct SyntheticDecoderFactory {
    video: Option<SyntheticVideo>,
}

impl SyntheticDecoderFactory {
    pub fn new(video: SyntheticVideo) -> Self {
        Self { video: Some(video) }
    }

    /// A factory whose every open fails as an unreadable container would.
    pub fn unreadable() -> Self {
        Self { video: None }
    }
}

impl DecoderFactory for SyntheticDecoderFactory {
    type Decoder = SyntheticDecoder;

    fn open(&self, path: &Path) -> Result<SyntheticDecoder, PipelineError> {
        self.video.as_ref().map(SyntheticVideo::decoder).ok_or_else(|| {
            PipelineError::validation(format!("unsupported container: {}", path.display()))
        })
    }
}
