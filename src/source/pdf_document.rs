//! PDF source.
//!
//! Scanned comics stored as PDF carry one full-page image per page. Each page
//! becomes one entry whose payload is that page's largest image XObject:
//!
//! - `DCTDecode` streams are JPEG files and pass through as encoded bytes.
//! - `FlateDecode` or unfiltered streams are raw pixel rows and pass through
//!   as a [`RasterPage`] for 8-bit gray/RGB/CMYK or 1-bit gray.
//!
//! Pages with no image, or with an encoding outside that set, are reported as
//! corrupt entries and rendered as diagnostic pages. The document is parsed
//! once and shared read-only between workers.

use super::{EntryInfo, PageSource, SourceEntry, SourceError, SourceKind};
use crate::imaging::{RasterColor, RasterPage, RawPayload};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Maximum depth followed through `/Parent` when looking up inherited
/// page resources.
const MAX_INHERIT_DEPTH: usize = 32;

pub struct PdfSource {
    path: PathBuf,
    document: Arc<Document>,
    pages: Vec<ObjectId>,
    entries: Vec<EntryInfo>,
}

impl std::fmt::Debug for PdfSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfSource")
            .field("path", &self.path)
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl PdfSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let document = Document::load(path).map_err(|e| SourceError::Pdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        // Keyed by 1-based page number, already in page order
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        if !pages
            .iter()
            .any(|&page_id| largest_image(&document, page_id).is_ok())
        {
            return Err(SourceError::NoImagesFound(path.to_path_buf()));
        }

        let entries = page_labels(pages.len())
            .into_iter()
            .enumerate()
            .map(|(index, name)| EntryInfo {
                index,
                relative_path: String::new(),
                name,
            })
            .collect();

        tracing::debug!(path = %path.display(), pages = pages.len(), "loaded pdf");
        Ok(Self {
            path: path.to_path_buf(),
            document: Arc::new(document),
            pages,
            entries,
        })
    }
}

/// `page 1`..`page N`, zero-padded to the digit count of `N`.
fn page_labels(count: usize) -> Vec<String> {
    let width = count.to_string().len();
    (1..=count).map(|n| format!("page {n:0width$}")).collect()
}

impl PageSource for PdfSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Pdf
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn produce(&self, sink: &mut dyn FnMut(SourceEntry) -> bool) -> Result<(), SourceError> {
        for (page_id, info) in self.pages.iter().zip(&self.entries) {
            let document = Arc::clone(&self.document);
            let page_id = *page_id;
            let name = info.name.clone();
            let entry = SourceEntry::deferred(info.clone(), move || {
                extract_page_image(&document, page_id).map_err(|detail| SourceError::corrupt(&name, detail))
            });
            if !sink(entry) {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Image extraction
// =============================================================================

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Result<&'a Object, String> {
    match object {
        Object::Reference(id) => document.get_object(*id).map_err(|e| e.to_string()),
        other => Ok(other),
    }
}

fn dict_entry<'a>(
    document: &'a Document,
    dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|o| resolve(document, o).ok())
}

/// The page's resource dictionary, following `/Parent` for inherited ones.
fn page_resources(document: &Document, page_id: ObjectId) -> Result<&Dictionary, String> {
    let mut node = document.get_dictionary(page_id).map_err(|e| e.to_string())?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Some(resources) = dict_entry(document, node, b"Resources") {
            return resources.as_dict().map_err(|e| e.to_string());
        }
        match dict_entry(document, node, b"Parent") {
            Some(parent) => node = parent.as_dict().map_err(|e| e.to_string())?,
            None => break,
        }
    }
    Err("page has no resources".into())
}

fn int_entry(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<i64> {
    dict_entry(document, dict, key).and_then(|o| o.as_i64().ok())
}

/// Extract the largest image on a page.
pub(crate) fn extract_page_image(
    document: &Document,
    page_id: ObjectId,
) -> Result<RawPayload, String> {
    image_payload(document, largest_image(document, page_id)?)
}

/// The image XObject with the most pixels among the page's resources.
fn largest_image(document: &Document, page_id: ObjectId) -> Result<&Stream, String> {
    let resources = page_resources(document, page_id)?;
    let xobjects = dict_entry(document, resources, b"XObject")
        .ok_or("page has no images")?
        .as_dict()
        .map_err(|e| e.to_string())?;

    xobjects
        .iter()
        .filter_map(|(_, value)| resolve(document, value).ok()?.as_stream().ok())
        .filter(|stream| {
            stream
                .dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .is_ok_and(|name| name == b"Image")
        })
        .max_by_key(|stream| {
            let w = int_entry(document, &stream.dict, b"Width").unwrap_or(0);
            let h = int_entry(document, &stream.dict, b"Height").unwrap_or(0);
            w.saturating_mul(h)
        })
        .ok_or_else(|| "page has no images".to_string())
}

fn filters(document: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict_entry(document, dict, b"Filter") {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|o| resolve(document, o).ok()?.as_name().ok())
            .map(|n| n.to_vec())
            .collect(),
        _ => Vec::new(),
    }
}

fn color_model(document: &Document, dict: &Dictionary) -> Result<RasterColor, String> {
    if dict
        .get(b"ImageMask")
        .and_then(|o| o.as_bool())
        .unwrap_or(false)
    {
        return Ok(RasterColor::Gray);
    }
    let space = dict_entry(document, dict, b"ColorSpace").ok_or("image has no color space")?;
    match space {
        Object::Name(name) => named_color(name),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or("malformed color space")?;
            match family {
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .and_then(|o| resolve(document, o).ok())
                        .and_then(|o| o.as_stream().ok())
                        .ok_or("malformed ICC color space")?;
                    match int_entry(document, &profile.dict, b"N") {
                        Some(1) => Ok(RasterColor::Gray),
                        Some(3) => Ok(RasterColor::Rgb),
                        Some(4) => Ok(RasterColor::Cmyk),
                        other => Err(format!("ICC profile with {other:?} components")),
                    }
                }
                b"CalGray" => Ok(RasterColor::Gray),
                b"CalRGB" => Ok(RasterColor::Rgb),
                other => Err(format!(
                    "unsupported color space {}",
                    String::from_utf8_lossy(other)
                )),
            }
        }
        _ => Err("malformed color space".into()),
    }
}

fn named_color(name: &[u8]) -> Result<RasterColor, String> {
    match name {
        b"DeviceGray" | b"G" => Ok(RasterColor::Gray),
        b"DeviceRGB" | b"RGB" => Ok(RasterColor::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(RasterColor::Cmyk),
        other => Err(format!(
            "unsupported color space {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn image_payload(document: &Document, stream: &Stream) -> Result<RawPayload, String> {
    let filters = filters(document, &stream.dict);
    let filter_names: Vec<&[u8]> = filters.iter().map(Vec::as_slice).collect();

    match filter_names.as_slice() {
        [b"DCTDecode"] | [b"DCT"] => Ok(RawPayload::Encoded(stream.content.clone())),
        [] | [b"FlateDecode"] | [b"Fl"] => {
            let data = if filter_names.is_empty() {
                stream.content.clone()
            } else {
                stream.decompressed_content().map_err(|e| e.to_string())?
            };
            let width = int_entry(document, &stream.dict, b"Width").ok_or("image has no width")?;
            let height = int_entry(document, &stream.dict, b"Height").ok_or("image has no height")?;
            let bits = if stream
                .dict
                .get(b"ImageMask")
                .and_then(|o| o.as_bool())
                .unwrap_or(false)
            {
                1
            } else {
                int_entry(document, &stream.dict, b"BitsPerComponent").unwrap_or(8)
            };
            Ok(RawPayload::Raster(RasterPage {
                width: u32::try_from(width).map_err(|_| format!("bad width {width}"))?,
                height: u32::try_from(height).map_err(|_| format!("bad height {height}"))?,
                color: color_model(document, &stream.dict)?,
                bits_per_component: u8::try_from(bits).map_err(|_| format!("bad depth {bits}"))?,
                data,
            }))
        }
        other => Err(format!(
            "unsupported image encoding {:?}",
            other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect::<Vec<_>>()
        )),
    }
}
