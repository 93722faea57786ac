use crate::error::PipelineError;
use image::RgbImage;
use std::path::Path;

/// Container metadata reported when a decoder is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub fps: f64,
    /// Frame count claimed by the container; the stream may end earlier.
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub file_size_bytes: u64,
}

/// A decoder handle over one video stream.
///
/// Handles are opened, consumed and dropped on the same blocking thread.
/// `next_frame` returns `Ok(None)` at end of stream and `Err` on a read
/// failure, so callers can tell the two apart.
pub trait VideoDecoder {
    fn metadata(&self) -> &VideoMetadata;

    fn next_frame(&mut self) -> Result<Option<RgbImage>, PipelineError>;

    /// Position the handle so that the next `next_frame` yields `frame_index`.
    fn seek(&mut self, frame_index: u64) -> Result<(), PipelineError>;
}

/// Opens fresh decoder handles. Every stage opens its own.
pub trait DecoderFactory: Send + Sync + 'static {
    type Decoder: VideoDecoder + 'static;

    /// Fails with `PipelineError::Validation` when the container is unreadable.
    fn open(&self, path: &Path) -> Result<Self::Decoder, PipelineError>;
}
