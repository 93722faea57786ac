//! Decoder adapter backed by libav through `ffmpeg-next`.

use crate::error::PipelineError;
use crate::ports::decoder::{DecoderFactory, VideoDecoder, VideoMetadata};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::error::EAGAIN;
use image::RgbImage;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegDecoderFactory;

impl FfmpegDecoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderFactory for FfmpegDecoderFactory {
    type Decoder = FfmpegDecoder;

    fn open(&self, path: &Path) -> Result<FfmpegDecoder, PipelineError> {
        FfmpegDecoder::open(path)
    }
}

pub struct FfmpegDecoder {
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    /// First pts of the stream, in `time_base` units
    start_pts: i64,
    metadata: VideoMetadata,
    decoded: ffmpeg::util::frame::Video,
    /// Index the next returned frame is expected to have
    position: u64,
    /// Frames before this index are dropped after a seek
    skip_until: u64,
    eof_sent: bool,
}

fn validation(path: &Path, err: ffmpeg::Error) -> PipelineError {
    PipelineError::validation(format!("cannot open {}: {}", path.display(), err))
}

impl FfmpegDecoder {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        ffmpeg::init()
            .map_err(|e| PipelineError::internal(format!("ffmpeg init failed: {}", e)))?;

        let input = ffmpeg::format::input(&path).map_err(|e| validation(path, e))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| {
                PipelineError::validation(format!("no video stream in {}", path.display()))
            })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        // MPEG-TS and edit-listed MP4 streams rarely start at zero
        let start_pts = match stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            pts => pts,
        };

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| validation(path, e))?;
        let decoder = context.decoder().video().map_err(|e| validation(path, e))?;

        let fps = rational_to_f64(stream.avg_frame_rate())
            .or_else(|| rational_to_f64(stream.rate()))
            .unwrap_or(0.0);
        let frame_count = if stream.frames() > 0 {
            stream.frames() as u64
        } else if input.duration() > 0 {
            (input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE) * fps) as u64
        } else {
            0
        };
        let file_size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| validation(path, e))?;

        let metadata = VideoMetadata {
            fps,
            frame_count,
            width: decoder.width(),
            height: decoder.height(),
            file_size_bytes,
        };

        Ok(Self {
            input,
            decoder,
            scaler,
            stream_index,
            time_base,
            start_pts,
            metadata,
            decoded: ffmpeg::util::frame::Video::empty(),
            position: 0,
            skip_until: 0,
            eof_sent: false,
        })
    }

    fn frame_index_of(&self, pts: i64) -> u64 {
        frame_index_at(pts, self.start_pts, self.time_base, self.metadata.fps)
    }

    fn to_rgb(&mut self) -> Result<RgbImage, PipelineError> {
        let mut rgb = ffmpeg::util::frame::Video::empty();
        self.scaler
            .run(&self.decoded, &mut rgb)
            .map_err(|e| PipelineError::decode(format!("pixel conversion failed: {}", e)))?;

        let (width, height) = (rgb.width(), rgb.height());
        let stride = rgb.stride(0);
        let row_bytes = width as usize * 3;
        let data = rgb.data(0);
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            pixels.extend_from_slice(&data[row * stride..row * stride + row_bytes]);
        }
        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| PipelineError::decode("decoded frame has an unexpected size"))
    }

    /// Pull the next decoded frame out of libav, feeding packets as needed.
    fn receive(&mut self) -> Result<bool, PipelineError> {
        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => return Ok(true),
                Err(ffmpeg::Error::Eof) => return Ok(false),
                Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    return Err(PipelineError::decode(format!(
                        "decode failed at frame {}: {}",
                        self.position, e
                    )))
                }
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| PipelineError::decode(format!("bad packet: {}", e)))?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| PipelineError::decode(format!("flush failed: {}", e)))?;
                    self.eof_sent = true;
                }
                Err(e) => {
                    return Err(PipelineError::decode(format!(
                        "read failed at frame {}: {}",
                        self.position, e
                    )))
                }
            }
        }
    }
}

impl VideoDecoder for FfmpegDecoder {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, PipelineError> {
        while self.receive()? {
            let index = match self.decoded.timestamp().or(self.decoded.pts()) {
                Some(pts) if self.skip_until > 0 => self.frame_index_of(pts),
                _ => self.position,
            };
            if index < self.skip_until {
                continue;
            }
            self.skip_until = 0;
            self.position = index + 1;
            return self.to_rgb().map(Some);
        }
        Ok(None)
    }

    fn seek(&mut self, frame_index: u64) -> Result<(), PipelineError> {
        let target = seek_target(
            frame_index,
            self.start_pts,
            self.time_base,
            self.metadata.fps,
        );
        self.input.seek(target, ..target).map_err(|e| {
            PipelineError::decode(format!("seek to frame {} failed: {}", frame_index, e))
        })?;
        self.decoder.flush();
        self.eof_sent = false;
        self.position = frame_index;
        self.skip_until = frame_index;
        Ok(())
    }
}

fn seconds_of(pts: i64, time_base: ffmpeg::Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator().max(1))
}

/// Frame index of `pts`, counted from the first pts of the stream.
fn frame_index_at(pts: i64, start_pts: i64, time_base: ffmpeg::Rational, fps: f64) -> u64 {
    let seconds = seconds_of(pts.saturating_sub(start_pts), time_base);
    (seconds * fps).round().max(0.0) as u64
}

/// Container seek target, in `AV_TIME_BASE` units, for `frame_index`.
fn seek_target(frame_index: u64, start_pts: i64, time_base: ffmpeg::Rational, fps: f64) -> i64 {
    let offset = if fps > 0.0 {
        frame_index as f64 / fps
    } else {
        0.0
    };
    let seconds = seconds_of(start_pts, time_base) + offset;
    (seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64
}

fn rational_to_f64(rate: ffmpeg::Rational) -> Option<f64> {
    if rate.numerator() > 0 && rate.denominator() > 0 {
        Some(f64::from(rate))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::process::Command;
    use tempfile::{tempdir, TempDir};

    // 90 kHz, the MPEG-TS clock
    fn ts_base() -> ffmpeg::Rational {
        ffmpeg::Rational::new(1, 90_000)
    }

    #[test]
    fn test_frame_index_counts_from_stream_start() {
        // stream starting at 1.4s, 30 fps
        let start = 126_000;
        assert_eq!(frame_index_at(start, start, ts_base(), 30.0), 0);
        assert_eq!(frame_index_at(start + 30_000, start, ts_base(), 30.0), 10);
        assert_eq!(frame_index_at(0, start, ts_base(), 30.0), 0);
        assert_eq!(frame_index_at(30_000, 0, ts_base(), 30.0), 10);
    }

    #[test]
    fn test_seek_target_adds_stream_start() {
        let av_time_base = i64::from(ffmpeg::ffi::AV_TIME_BASE);
        assert_eq!(seek_target(0, 0, ts_base(), 30.0), 0);
        assert_eq!(seek_target(30, 0, ts_base(), 30.0), av_time_base);
        // 1.4s + 10 frames at 30 fps
        let target = seek_target(10, 126_000, ts_base(), 30.0);
        assert!((target - 1_733_333).abs() <= 1, "target was {}", target);
        assert_eq!(seek_target(10, 126_000, ts_base(), 0.0), 1_400_000);
    }

    /// Encode a 60 frame 30 fps test pattern with the ffmpeg CLI.
    /// The timestamps of the stream start at `offset_seconds`.
    fn encode_clip(dir: &TempDir, name: &str, offset_seconds: f64) -> PathBuf {
        let path = dir.path().join(name);
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "lavfi", "-i", "testsrc=size=64x36:rate=30:duration=2"])
            .args(["-c:v", "mpeg2video", "-g", "1"])
            .args(["-output_ts_offset", &offset_seconds.to_string()])
            .arg(&path)
            .status()
            .expect("ffmpeg must be installed to run the decoder tests");
        assert!(status.success(), "ffmpeg failed to encode {}", name);
        path
    }

    fn drain(decoder: &mut FfmpegDecoder) -> u64 {
        let mut decoded = 0;
        while decoder.next_frame().unwrap().is_some() {
            decoded += 1;
        }
        decoded
    }

    #[test]
    fn test_functional_decode_real_clip() {
        let dir = tempdir().unwrap();
        let path = encode_clip(&dir, "clip.ts", 0.0);
        let mut decoder = FfmpegDecoderFactory::new().open(&path).unwrap();

        let metadata = decoder.metadata().clone();
        assert_eq!((metadata.width, metadata.height), (64, 36));
        assert!((metadata.fps - 30.0).abs() < 0.01);
        assert!(metadata.file_size_bytes > 0);

        let decoded = drain(&mut decoder);
        assert_eq!(decoded, 60);
        // end of stream stays end of stream
        assert!(decoder.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_functional_seek_with_late_stream_start() {
        let dir = tempdir().unwrap();
        let path = encode_clip(&dir, "late.ts", 1.4);
        let mut decoder = FfmpegDecoderFactory::new().open(&path).unwrap();
        assert!(decoder.start_pts > 0);

        decoder.seek(10).unwrap();
        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (64, 36));
        assert_eq!(decoder.position, 11);
        // frames 11 through 59 remain after the one just read
        assert_eq!(drain(&mut decoder), 49);
    }

    #[test]
    fn test_functional_not_a_video() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"plain text, not a container").unwrap();

        let err = FfmpegDecoderFactory::new().open(&path).err().unwrap();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
