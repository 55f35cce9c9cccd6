//! Face crop quality: size and sharpness combined into a 0–100 score.

use crate::types::BoundingBox;

/// Crop area (pixels) at which the size component saturates.
const FULL_SIZE_AREA: f32 = 150.0 * 150.0;
/// Laplacian variance at which the sharpness component saturates.
const FULL_SHARPNESS_VARIANCE: f64 = 120.0;
const SIZE_WEIGHT: f32 = 0.6;
const SHARPNESS_WEIGHT: f32 = 0.4;

/// Estimate the quality of the face inside `face` for an RGB image.
///
/// The box is truncated to integer pixels and clamped to the image, so a box
/// hanging off the top-left edge keeps its visible part. An empty crop
/// scores 0.
pub fn estimate(rgb: &[u8], width: u32, height: u32, face: &BoundingBox) -> u32 {
    let (w, h) = (width as i64, height as i64);
    let x1 = (face.x as i64).clamp(0, w);
    let y1 = (face.y as i64).clamp(0, h);
    let x2 = ((face.x + face.width) as i64).clamp(0, w);
    let y2 = ((face.y + face.height) as i64).clamp(0, h);

    if x2 <= x1 || y2 <= y1 || rgb.len() < (w * h * 3) as usize {
        return 0;
    }

    let crop_w = (x2 - x1) as usize;
    let crop_h = (y2 - y1) as usize;
    let mut gray = Vec::with_capacity(crop_w * crop_h);
    for y in y1 as usize..y2 as usize {
        let row = y * width as usize;
        for x in x1 as usize..x2 as usize {
            let off = (row + x) * 3;
            gray.push(luma(rgb[off], rgb[off + 1], rgb[off + 2]));
        }
    }

    let size_score = ((crop_w * crop_h) as f32 / FULL_SIZE_AREA).min(1.0);
    let sharpness_score = (laplacian_variance(&gray, crop_w, crop_h) / FULL_SHARPNESS_VARIANCE).min(1.0) as f32;

    ((SIZE_WEIGHT * size_score + SHARPNESS_WEIGHT * sharpness_score) * 100.0) as u32
}

/// BT.601 luma, rounded to the nearest integer.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Variance of the 4-neighbour Laplacian, reflect-101 borders.
pub fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    let n = width * height;
    if n == 0 || gray.len() < n {
        return 0.0;
    }

    let at = |x: isize, y: isize| -> f64 {
        let x = reflect101(x, width);
        let y = reflect101(y, height);
        gray[y * width + x] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..height as isize {
        for x in 0..width as isize {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

/// Reflect an out-of-range index without repeating the edge: -1 -> 1, len -> len-2.
fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = i;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}
