//! Page image type and raw sample conversion.

use image::{DynamicImage, RgbImage};

/// An RGB image taken from one document page.
#[derive(Clone)]
pub struct PageImage {
    /// 1-based page number within the document.
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB8 pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("page", &self.page)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl PageImage {
    /// Build from a decoded image of any color type.
    pub fn from_dynamic(page: u32, image: DynamicImage) -> Self {
        let rgb = image.into_rgb8();
        Self {
            page,
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
        }
    }

    /// Build from raw 8-bit samples with 1 (gray) or 3 (RGB) components per pixel.
    pub fn from_samples(
        page: u32,
        width: u32,
        height: u32,
        components: u8,
        samples: &[u8],
    ) -> Result<Self, PageError> {
        let pixels = width as usize * height as usize;
        let data = match components {
            1 => {
                if samples.len() < pixels {
                    return Err(PageError::InvalidLength {
                        expected: pixels,
                        actual: samples.len(),
                    });
                }
                gray_to_rgb(&samples[..pixels])
            }
            3 => {
                let expected = pixels * 3;
                if samples.len() < expected {
                    return Err(PageError::InvalidLength {
                        expected,
                        actual: samples.len(),
                    });
                }
                samples[..expected].to_vec()
            }
            other => return Err(PageError::UnsupportedComponents(other)),
        };
        Ok(Self {
            page,
            width,
            height,
            data,
        })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Average luma (0.0–255.0), for diagnostics.
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .data
            .chunks_exact(3)
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .sum();
        sum / (self.data.len() / 3) as f32
    }

    /// Copy into an `image` buffer, e.g. for saving to disk.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Expand single-channel gray samples to interleaved RGB.
pub fn gray_to_rgb(gray: &[u8]) -> Vec<u8> {
    gray.iter().flat_map(|&g| [g, g, g]).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("invalid sample length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unsupported component count: {0}")]
    UnsupportedComponents(u8),
}
