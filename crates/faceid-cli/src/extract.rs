use anyhow::{anyhow, Context, Result};
use faceid_doc::extract_pages;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Write every image of `pdf` to `out_dir`.
///
/// A page's largest image becomes `page-<n>.png`; further images on the
/// same page follow as `page-<n>-2.png`, `page-<n>-3.png` and so on.
pub fn extract_to_dir(pdf: &[u8], out_dir: &Path) -> Result<Vec<PathBuf>> {
    let pages = extract_pages(pdf).context("could not read document")?;
    std::fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut written = Vec::new();
    for page in &pages {
        if page.images.is_empty() {
            tracing::info!(page = page.number, "page has no extractable image");
        }
        for (index, page_image) in page.images.iter().enumerate() {
            let image = page_image
                .to_rgb_image()
                .ok_or_else(|| anyhow!("page {} has an inconsistent pixel buffer", page.number))?;
            let name = match index {
                0 => format!("page-{}.png", page.number),
                n => format!("page-{}-{}.png", page.number, n + 1),
            };
            let path = out_dir.join(name);
            image
                .save_with_format(&path, ImageFormat::Png)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::debug!(
                page = page.number,
                width = page_image.width,
                height = page_image.height,
                "page image written"
            );
            written.push(path);
        }
    }
    Ok(written)
}
