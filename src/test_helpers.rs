//! Shared test utilities for the pagefold test suite.
//!
//! Provides synthetic image bytes, container fixture writers (zip, pdf), a
//! collector that drains any [`PageSource`], and [`MockSource`], an in-memory
//! source whose entries and failures are scripted by the test.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = tmp.path().join("book.cbz");
//! write_zip(&path, &[("001.jpg", jpeg_bytes(40, 60))]);
//!
//! let source = ZipSource::open(&path).unwrap();
//! let entries = collect_entries(&source);
//! assert_eq!(entries.len(), 1);
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Document, Object, Stream, dictionary};

use crate::imaging::RawPayload;
use crate::source::{EntryInfo, PageSource, SourceEntry, SourceError, SourceKind};

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A valid JPEG of the given size.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Jpeg)
}

/// A valid PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient(width, height), ImageFormat::Png)
}

/// A JPEG header followed by garbage.
pub fn corrupt_jpeg_bytes() -> Vec<u8> {
    let mut bytes = jpeg_bytes(32, 32);
    bytes.truncate(20);
    bytes.extend_from_slice(b"this is not entropy coded data");
    bytes
}

// =========================================================================
// Container fixtures
// =========================================================================

/// Write a zip archive with the given `(member name, bytes)` pairs.
pub fn write_zip(path: &Path, members: &[(&str, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in members {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// One page of a fixture PDF.
pub enum PdfPage {
    /// A full-page `DCTDecode` image.
    Jpeg(Vec<u8>),
    /// An 8-bit `DeviceGray` image, flate-compressed when that saves space.
    GrayRaster {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
    /// A page with no images at all.
    Empty,
}

/// Write a PDF with one page per [`PdfPage`].
pub fn write_pdf(path: &Path, pages: &[PdfPage]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::new();
    for page in pages {
        let resources = match page {
            PdfPage::Jpeg(bytes) => {
                let img = image::load_from_memory(bytes).unwrap();
                let image_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => img.width() as i64,
                        "Height" => img.height() as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    bytes.clone(),
                ));
                dictionary! { "XObject" => dictionary! { "Im0" => image_id } }
            }
            PdfPage::GrayRaster {
                width,
                height,
                pixels,
            } => {
                let mut stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => *width as i64,
                        "Height" => *height as i64,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    pixels.clone(),
                );
                stream.compress().unwrap();
                let image_id = doc.add_object(stream);
                dictionary! { "XObject" => dictionary! { "Im0" => image_id } }
            }
            PdfPage::Empty => dictionary! {},
        };
        let resources_id = doc.add_object(resources);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => resources_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

// =========================================================================
// Source helpers
// =========================================================================

/// Produce and open every entry of `source`, sorted by index.
pub fn collect_entries(source: &dyn PageSource) -> Vec<(EntryInfo, Result<RawPayload, SourceError>)> {
    let mut entries = Vec::new();
    source
        .produce(&mut |entry| {
            let info = entry.info.clone();
            entries.push((info, entry.open()));
            true
        })
        .unwrap();
    entries.sort_by_key(|(info, _)| info.index);
    entries
}

/// What a [`MockSource`] entry yields when opened.
#[derive(Debug, Clone)]
pub enum MockPayload {
    Bytes(Vec<u8>),
    /// Damaged member, handled as a per-page failure.
    Corrupt(&'static str),
    /// Container failure while reading this entry.
    Fatal(&'static str),
}

/// In-memory [`PageSource`] with scripted payloads.
///
/// Entries are produced in reverse index order so ordering bugs show up.
#[derive(Debug)]
pub struct MockSource {
    entries: Vec<EntryInfo>,
    payloads: Vec<MockPayload>,
    /// Fail the producer itself after emitting this many entries.
    pub fail_after: Option<usize>,
}

impl MockSource {
    pub fn new(payloads: Vec<MockPayload>) -> Self {
        let entries = (0..payloads.len())
            .map(|index| EntryInfo {
                index,
                relative_path: "mock".into(),
                name: format!("{index:03}.jpg"),
            })
            .collect();
        Self {
            entries,
            payloads,
            fail_after: None,
        }
    }

    /// `count` valid JPEG pages of the given size.
    pub fn jpegs(count: usize, width: u32, height: u32) -> Self {
        Self::new(
            (0..count)
                .map(|_| MockPayload::Bytes(jpeg_bytes(width, height)))
                .collect(),
        )
    }
}

impl PageSource for MockSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Directory
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn produce(&self, sink: &mut dyn FnMut(SourceEntry) -> bool) -> Result<(), SourceError> {
        for (emitted, (info, payload)) in self
            .entries
            .iter()
            .zip(&self.payloads)
            .rev()
            .enumerate()
        {
            if self.fail_after == Some(emitted) {
                return Err(SourceError::Rar {
                    path: PathBuf::from("mock.cbr"),
                    detail: "unexpected end of archive".into(),
                });
            }
            let payload = payload.clone();
            let name = info.name.clone();
            let entry = SourceEntry::deferred(info.clone(), move || match payload {
                MockPayload::Bytes(bytes) => Ok(RawPayload::Encoded(bytes)),
                MockPayload::Corrupt(detail) => Err(SourceError::corrupt(&name, detail)),
                MockPayload::Fatal(detail) => Err(SourceError::Io {
                    path: PathBuf::from("mock"),
                    source: std::io::Error::other(detail),
                }),
            });
            if !sink(entry) {
                break;
            }
        }
        Ok(())
    }
}
