//! Single-channel luminance helpers used by every frame comparison.

use image::{GrayImage, RgbImage};

// BT.601 weights in 14-bit fixed point, rounded like the usual BGR2GRAY kernels.
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Convert an RGB frame to 8-bit luma.
pub fn to_luma(frame: &RgbImage) -> GrayImage {
    let (width, height) = frame.dimensions();
    let data = frame
        .as_raw()
        .chunks_exact(3)
        .map(|px| {
            let y = px[0] as u32 * R_WEIGHT
                + px[1] as u32 * G_WEIGHT
                + px[2] as u32 * B_WEIGHT
                + (1 << (SHIFT - 1));
            (y >> SHIFT) as u8
        })
        .collect();
    // chunks_exact over a w*h*3 buffer yields exactly w*h samples
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Mean luma of a frame, 0 for an empty frame.
pub fn mean(frame: &GrayImage) -> f64 {
    let pixels = frame.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
    sum as f64 / pixels.len() as f64
}

/// Mean absolute per-pixel difference between two frames.
///
/// Frames of different sizes are compared over their common prefix, which
/// only happens on streams that change resolution mid-way.
pub fn mean_abs_diff(previous: &GrayImage, current: &GrayImage) -> f64 {
    let a = previous.as_raw();
    let b = current.as_raw();
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let sum: u64 = a[..len]
        .iter()
        .zip(&b[..len])
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    sum as f64 / len as f64
}
