use super::scenes::frames_to_seconds;
use crate::error::PipelineError;
use crate::ports::decoder::VideoDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tokio_util::sync::CancellationToken;

/// A frame picked for a thumbnail, already resized and JPEG encoded.
#[derive(Debug, Clone)]
pub struct SampledThumbnail {
    /// Position of the ratio this sample was taken for
    pub slot: usize,
    pub frame_number: u64,
    pub timestamp: f64,
    pub jpeg: Vec<u8>,
}

pub struct ThumbnailSampler {
    pub ratios: Vec<f64>,
    pub width: u32,
    pub quality: u8,
}

impl ThumbnailSampler {
    pub fn new(ratios: Vec<f64>, width: u32, quality: u8) -> Self {
        Self {
            ratios,
            width,
            quality,
        }
    }

    /// Frame index targeted for each ratio, `floor(ratio * frame_count)`.
    pub fn target_frames(&self, frame_count: u64) -> Vec<u64> {
        self.ratios
            .iter()
            .map(|ratio| (ratio * frame_count as f64).floor() as u64)
            .collect()
    }

    /// Seek to each target frame and encode it.
    ///
    /// A failed seek or read only drops that sample. Encoding failures are
    /// returned since they point at a broken encoder rather than bad input.
    pub fn sample<D: VideoDecoder + ?Sized>(
        &self,
        decoder: &mut D,
        cancel: &CancellationToken,
    ) -> Result<Vec<SampledThumbnail>, PipelineError> {
        let metadata = decoder.metadata().clone();
        let mut samples = Vec::with_capacity(self.ratios.len());

        let targets = self.target_frames(metadata.frame_count);
        for (slot, frame_number) in targets.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let frame = match decoder.seek(frame_number).and_then(|_| decoder.next_frame()) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::warn!(slot, frame_number, "no frame at thumbnail position, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        slot,
                        frame_number,
                        error = %e,
                        "thumbnail seek failed, skipping"
                    );
                    continue;
                }
            };

            let thumbnail = resize_to_width(&frame, self.width);
            samples.push(SampledThumbnail {
                slot,
                frame_number,
                timestamp: frames_to_seconds(frame_number, metadata.fps),
                jpeg: encode_jpeg(&thumbnail, self.quality)?,
            });
        }

        Ok(samples)
    }
}

/// Scale to `width` pixels wide, keeping the aspect ratio.
pub fn resize_to_width(frame: &RgbImage, width: u32) -> RgbImage {
    let (src_width, src_height) = frame.dimensions();
    if src_width == 0 || src_height == 0 {
        return frame.clone();
    }
    let aspect_ratio = src_width as f64 / src_height as f64;
    let height = ((width as f64 / aspect_ratio) as u32).max(1);
    imageops::resize(frame, width, height, FilterType::Triangle)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
    Ok(buffer)
}
