//! faceid-doc: page images from identity documents.
//!
//! Pulls the embedded raster images out of an uploaded PDF, grouped by page,
//! as RGB buffers ready for face detection.

pub mod page;
pub mod pdf;

pub use page::PageImage;
pub use pdf::{extract_pages, DocumentError, DocumentPage};
