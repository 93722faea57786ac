//! The single forward decode pass shared by frame statistics and scene detection.

use super::luma::to_luma;
use crate::error::PipelineError;
use crate::ports::decoder::VideoDecoder;
use image::GrayImage;
use tokio_util::sync::CancellationToken;

/// Consumer of the grayscale frames produced by a forward pass.
pub trait FrameSink {
    fn push(&mut self, index: u64, frame: &GrayImage);
}

/// Decode every frame from the decoder's current position to end of stream,
/// feeding each one to all `sinks` in order.
///
/// `on_progress` is called with the number of frames decoded so far every
/// `progress_interval` frames. Returns the number of frames decoded.
pub fn forward_pass<D>(
    decoder: &mut D,
    sinks: &mut [&mut dyn FrameSink],
    cancel: &CancellationToken,
    progress_interval: u64,
    on_progress: &mut dyn FnMut(u64),
) -> Result<u64, PipelineError>
where
    D: VideoDecoder + ?Sized,
{
    let mut decoded = 0u64;

    while let Some(frame) = decoder.next_frame()? {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let gray = to_luma(&frame);
        for sink in sinks.iter_mut() {
            sink.push(decoded, &gray);
        }
        decoded += 1;

        if progress_interval > 0 && decoded % progress_interval == 0 {
            on_progress(decoded);
        }
    }

    Ok(decoded)
}
