//! In-plane rotation of RGB images for tilted document photos.

/// Rotate an interleaved RGB image by `angle_deg` about `(width / 2, height / 2)`.
///
/// Positive angles rotate counter-clockwise as displayed (y axis pointing
/// down). The output keeps the input size; samples falling outside the source
/// take the nearest edge pixel.
pub fn rotate(rgb: &[u8], width: u32, height: u32, angle_deg: f32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0u8; w * h * 3];
    if w == 0 || h == 0 || rgb.len() < w * h * 3 {
        return out;
    }

    let cx = (width / 2) as f32;
    let cy = (height / 2) as f32;
    let (sin, cos) = angle_deg.to_radians().sin_cos();

    let sample = |x: i32, y: i32, c: usize| -> f32 {
        let x = x.clamp(0, w as i32 - 1) as usize;
        let y = y.clamp(0, h as i32 - 1) as usize;
        rgb[(y * w + x) * 3 + c] as f32
    };

    for oy in 0..h {
        for ox in 0..w {
            // Inverse mapping: destination pixel back into the source.
            let dx = ox as f32 - cx;
            let dy = oy as f32 - cy;
            let sx = cos * dx - sin * dy + cx;
            let sy = sin * dx + cos * dy + cy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                out[(oy * w + ox) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(rgb: &[u8], w: usize, x: usize, y: usize) -> [u8; 3] {
        let off = (y * w + x) * 3;
        [rgb[off], rgb[off + 1], rgb[off + 2]]
    }

    #[test]
    fn test_zero_angle_is_identity() {
        let rgb: Vec<u8> = (0..5 * 4 * 3).map(|v| (v * 7 % 256) as u8).collect();
        assert_eq!(rotate(&rgb, 5, 4, 0.0), rgb);
    }

    #[test]
    fn test_quarter_turn_counter_clockwise() {
        // 5x5 image with a single marker right of centre at (4, 2).
        let w = 5usize;
        let mut rgb = vec![0u8; w * w * 3];
        rgb[(2 * w + 4) * 3] = 255;

        let out = rotate(&rgb, 5, 5, 90.0);

        // Counter-clockwise on screen moves "right of centre" to "above centre".
        assert_eq!(pixel(&out, w, 2, 0), [255, 0, 0]);
        assert_eq!(pixel(&out, w, 4, 2), [0, 0, 0]);
    }

    #[test]
    fn test_border_replicates_edge() {
        // Uniform image stays uniform under any rotation: no black corners.
        let rgb = vec![90u8; 30 * 20 * 3];
        let out = rotate(&rgb, 30, 20, 30.0);
        assert!(out.iter().all(|&p| p == 90));
    }

    #[test]
    fn test_rotation_keeps_size() {
        let rgb = vec![1u8; 17 * 9 * 3];
        assert_eq!(rotate(&rgb, 17, 9, -20.0).len(), 17 * 9 * 3);
    }
}
