//! Embedded page images from PDF documents via `lopdf`.
//!
//! Identity documents arrive as scanned PDFs: every page carries its photo as
//! an image XObject, sometimes next to a background or logo. Every decodable
//! image of a page is kept so callers can search each of them for a face.

use crate::page::{PageError, PageImage};
use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Read;
use thiserror::Error;

/// Limit on `Parent` hops and nested form XObjects.
const MAX_NESTING: usize = 8;
/// Images with a side above this are not decoded.
const MAX_IMAGE_SIDE: i64 = 16_384;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("invalid PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("PDF has no pages")]
    Empty,
}

/// Why an image XObject was passed over.
#[derive(Error, Debug)]
enum ImageSkip {
    #[error("missing or invalid /{0}")]
    Field(&'static str),
    #[error("image side {0} out of range")]
    Dimension(i64),
    #[error("unsupported filter chain {0:?}")]
    Filter(Vec<String>),
    #[error("unsupported color space {0}")]
    ColorSpace(String),
    #[error("unsupported bits per component {0}")]
    Bits(i64),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("inflate failed: {0}")]
    Inflate(std::io::Error),
    #[error("unsupported predictor {0}")]
    Predictor(i64),
    #[error("unknown PNG row filter {0}")]
    RowFilter(u8),
    #[error(transparent)]
    Samples(#[from] PageError),
}

/// One page of a document with every image it draws, largest first.
#[derive(Debug, Clone)]
pub struct DocumentPage {
    /// 1-based page number.
    pub number: u32,
    pub images: Vec<PageImage>,
}

impl DocumentPage {
    pub fn largest(&self) -> Option<&PageImage> {
        self.images.first()
    }
}

/// Extract every decodable image of every page, in page order.
///
/// All pages are returned, including those without a decodable image.
pub fn extract_pages(pdf: &[u8]) -> Result<Vec<DocumentPage>, DocumentError> {
    let doc = Document::load_mem(pdf)?;
    let page_ids = doc.get_pages();
    if page_ids.is_empty() {
        return Err(DocumentError::Empty);
    }

    let mut pages = Vec::with_capacity(page_ids.len());
    for (&number, &page_id) in &page_ids {
        let mut streams = Vec::new();
        if let Some(resources) = page_resources(&doc, page_id) {
            collect_image_streams(&doc, resources, 0, &mut streams);
        }

        let mut images = Vec::new();
        for stream in streams {
            match decode_image(&doc, number, stream) {
                Ok(image) => {
                    tracing::debug!(
                        page = number,
                        width = image.width,
                        height = image.height,
                        brightness = image.avg_brightness(),
                        "page image extracted"
                    );
                    images.push(image);
                }
                Err(reason) => tracing::debug!(page = number, %reason, "skipping page image"),
            }
        }
        if images.is_empty() {
            tracing::debug!(page = number, "page has no decodable image");
        }
        // Stable sort keeps resource order among equal areas.
        images.sort_by(|a, b| b.area().cmp(&a.area()));

        pages.push(DocumentPage { number, images });
    }

    let total: usize = pages.iter().map(|p| p.images.len()).sum();
    tracing::info!(pages = pages.len(), images = total, "extracted images from PDF");
    Ok(pages)
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    doc.dereference(object).ok().map(|(_, obj)| obj)
}

fn resolve_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    dict.get(key)
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
}

/// Resources of a page, inherited from the page tree when the page has none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_NESTING {
        if node.has(b"Resources") {
            return resolve_dict(doc, node, b"Resources");
        }
        node = resolve_dict(doc, node, b"Parent")?;
    }
    None
}

fn collect_image_streams<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    depth: usize,
    out: &mut Vec<&'a Stream>,
) {
    let Some(xobjects) = resolve_dict(doc, resources, b"XObject") else {
        return;
    };

    for (_, entry) in xobjects.iter() {
        let Some(stream) = resolve(doc, entry).and_then(|obj| obj.as_stream().ok()) else {
            continue;
        };
        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => out.push(stream),
            Ok(b"Form") if depth < MAX_NESTING => {
                if let Some(form_resources) = resolve_dict(doc, &stream.dict, b"Resources") {
                    collect_image_streams(doc, form_resources, depth + 1, out);
                }
            }
            _ => {}
        }
    }
}

fn int_field(doc: &Document, dict: &Dictionary, key: &'static str) -> Result<i64, ImageSkip> {
    dict.get(key.as_bytes())
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_i64().ok())
        .ok_or(ImageSkip::Field(key))
}

fn filter_names(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let Some(filter) = dict.get(b"Filter").ok().and_then(|obj| resolve(doc, obj)) else {
        return Vec::new();
    };
    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Number of color components of a raw image's color space.
fn color_components(doc: &Document, dict: &Dictionary) -> Result<u8, ImageSkip> {
    let space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .ok_or(ImageSkip::Field("ColorSpace"))?;

    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"CalRGB" => Ok(3),
            other => Err(ImageSkip::ColorSpace(String::from_utf8_lossy(other).into_owned())),
        },
        Object::Array(items) => {
            let family = items.first().and_then(|obj| obj.as_name().ok()).unwrap_or_default();
            if family == b"ICCBased" {
                let n = items
                    .get(1)
                    .and_then(|obj| resolve(doc, obj))
                    .and_then(|obj| obj.as_stream().ok())
                    .and_then(|profile| profile.dict.get(b"N").and_then(Object::as_i64).ok());
                match n {
                    Some(1) => Ok(1),
                    Some(3) => Ok(3),
                    _ => Err(ImageSkip::ColorSpace("ICCBased".into())),
                }
            } else {
                Err(ImageSkip::ColorSpace(String::from_utf8_lossy(family).into_owned()))
            }
        }
        _ => Err(ImageSkip::Field("ColorSpace")),
    }
}

fn decode_parms<'a>(doc: &'a Document, dict: &'a Dictionary) -> Option<&'a Dictionary> {
    match dict.get(b"DecodeParms").ok().and_then(|obj| resolve(doc, obj))? {
        Object::Dictionary(parms) => Some(parms),
        Object::Array(items) => items
            .first()
            .and_then(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_dict().ok()),
        _ => None,
    }
}

fn decode_image(doc: &Document, page: u32, stream: &Stream) -> Result<PageImage, ImageSkip> {
    let dict = &stream.dict;
    let width = int_field(doc, dict, "Width")?;
    let height = int_field(doc, dict, "Height")?;
    for side in [width, height] {
        if side <= 0 || side > MAX_IMAGE_SIDE {
            return Err(ImageSkip::Dimension(side));
        }
    }

    let filters = filter_names(doc, dict);
    if let [f] = filters.as_slice() {
        if f.as_slice() == b"DCTDecode" {
            let decoded = image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)?;
            return Ok(PageImage::from_dynamic(page, decoded));
        }
    }

    let bits = int_field(doc, dict, "BitsPerComponent")?;
    if bits != 8 {
        return Err(ImageSkip::Bits(bits));
    }
    let components = color_components(doc, dict)?;

    let samples = match filters.as_slice() {
        [] => stream.content.clone(),
        [f] if f.as_slice() == b"FlateDecode" => {
            let predictor = decode_parms(doc, dict)
                .and_then(|parms| parms.get(b"Predictor").and_then(Object::as_i64).ok())
                .unwrap_or(1);
            inflate_samples(
                &stream.content,
                predictor,
                width as usize,
                height as usize,
                components as usize,
            )?
        }
        other => {
            return Err(ImageSkip::Filter(
                other.iter().map(|f| String::from_utf8_lossy(f).into_owned()).collect(),
            ))
        }
    };

    Ok(PageImage::from_samples(page, width as u32, height as u32, components, &samples)?)
}

/// Inflate zlib-compressed samples and undo the PNG predictor.
///
/// Reads no more than the image needs, so an oversized stream is cut short.
fn inflate_samples(
    data: &[u8],
    predictor: i64,
    width: usize,
    height: usize,
    components: usize,
) -> Result<Vec<u8>, ImageSkip> {
    let row_len = width * components;
    let png_rows = predictor >= 10;
    let limit = if png_rows { (row_len + 1) * height } else { row_len * height };

    let mut inflated = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64)
        .read_to_end(&mut inflated)
        .map_err(ImageSkip::Inflate)?;

    match predictor {
        1 => Ok(inflated),
        p if p >= 10 => unfilter_png_rows(&inflated, row_len, components),
        other => Err(ImageSkip::Predictor(other)),
    }
}

/// Reverse PNG row filters. Each row is prefixed by its filter type byte.
fn unfilter_png_rows(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>, ImageSkip> {
    let stride = row_len + 1;
    let rows = data.len() / stride;
    let mut out = vec![0u8; rows * row_len];
    let mut prev = vec![0u8; row_len];

    for (line, cur) in data.chunks_exact(stride).zip(out.chunks_exact_mut(row_len)) {
        let (tag, src) = (line[0], &line[1..]);
        for i in 0..row_len {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(ImageSkip::RowFilter(other)),
            };
            cur[i] = src[i].wrapping_add(predicted);
        }
        prev.copy_from_slice(cur);
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let (pa, pb, pc) = ((p - a as i16).abs(), (p - b as i16).abs(), (p - c as i16).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
