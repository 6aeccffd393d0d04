//! Source adapters: one ordering contract over four container formats.
//!
//! A source is opened once. At that point it lists its image entries, sorts
//! them with [`natural_cmp`](crate::naming::natural_cmp) and fixes every
//! entry's global index as its position in that sorted list. The index never
//! changes afterward; it is the page's identity through the rest of the
//! pipeline.
//!
//! ```text
//! input path ──► open_source ──► Box<dyn PageSource>
//!                                   │ entries()   sorted listing (dry run)
//!                                   │ produce()   SourceEntry stream
//!                                   ▼
//!                         SourceEntry::open() → RawPayload
//! ```
//!
//! Entries are streamed through [`PageSource::produce`]. Most entries carry a
//! deferred read that a worker runs on its own thread, so directory, zip and
//! non-solid rar members are read concurrently from independent handles.
//! Solid rar archives cannot be read out of order and are drained once,
//! sequentially, into memory on the producing thread.
//!
//! ## Error classes
//!
//! [`SourceError::is_entry_local`] separates a damaged member, which becomes a
//! diagnostic page, from a failure of the container itself, which aborts the
//! run.

pub mod directory;
pub mod pdf_document;
pub mod rar_archive;
pub mod zip_archive;

use crate::imaging::RawPayload;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use directory::DirectorySource;
pub use pdf_document::PdfSource;
pub use rar_archive::RarSource;
pub use zip_archive::ZipSource;

/// Image extensions recognised inside directories and archives.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("input not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unknown file format ({0}): supported are directories, .cbz, .zip, .cbr, .rar, .pdf")]
    UnsupportedFormat(String),
    #[error("no images found in {}", .0.display())]
    NoImagesFound(PathBuf),
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("zip error in {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("rar error in {}: {detail}", .path.display())]
    Rar { path: PathBuf, detail: String },
    #[error("pdf error in {}: {detail}", .path.display())]
    Pdf { path: PathBuf, detail: String },
    #[error("cannot read {name}: {detail}")]
    CorruptEntry { name: String, detail: String },
}

impl SourceError {
    /// True when only one entry is affected and the run can continue with a
    /// diagnostic page in its place.
    pub fn is_entry_local(&self) -> bool {
        matches!(self, SourceError::CorruptEntry { .. })
    }

    pub(crate) fn corrupt(name: &str, detail: impl fmt::Display) -> Self {
        SourceError::CorruptEntry {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// Which adapter handles a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Directory,
    Zip,
    Rar,
    Pdf,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Directory => "directory",
            SourceKind::Zip => "zip archive",
            SourceKind::Rar => "rar archive",
            SourceKind::Pdf => "pdf document",
        };
        f.write_str(name)
    }
}

/// Listing data for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Dense 0..N-1 position in sorted order.
    pub index: usize,
    /// Grouping path (parent directory inside the source, `""` at the root).
    pub relative_path: String,
    /// File name or page label.
    pub name: String,
}

type OpenRaw = Box<dyn FnOnce() -> Result<RawPayload, SourceError> + Send>;

/// One entry handed from a source to the workers.
pub struct SourceEntry {
    pub info: EntryInfo,
    open: OpenRaw,
}

impl SourceEntry {
    /// Entry whose bytes are read when [`open`](Self::open) is called.
    pub fn deferred<F>(info: EntryInfo, open: F) -> Self
    where
        F: FnOnce() -> Result<RawPayload, SourceError> + Send + 'static,
    {
        Self {
            info,
            open: Box::new(open),
        }
    }

    /// Entry whose bytes are already in memory.
    pub fn buffered(info: EntryInfo, bytes: Vec<u8>) -> Self {
        Self::deferred(info, move || Ok(RawPayload::Encoded(bytes)))
    }

    /// Read the entry's raw payload.
    pub fn open(self) -> Result<RawPayload, SourceError> {
        (self.open)()
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// A container of page images with a fixed, sorted listing.
pub trait PageSource: Send + Sync + fmt::Debug {
    fn kind(&self) -> SourceKind;

    /// Sorted listing; `entries()[i].index == i`.
    fn entries(&self) -> &[EntryInfo];

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Stream every entry into `sink`.
    ///
    /// Entries may arrive in any order. Stops early, without error, when
    /// `sink` returns `false`. Errors returned here are fatal to the run.
    fn produce(&self, sink: &mut dyn FnMut(SourceEntry) -> bool) -> Result<(), SourceError>;
}

/// Pick and open the adapter for `path`.
///
/// Directories are always accepted. Files are matched by extension:
/// `.cbz`/`.zip`, `.cbr`/`.rar`, `.pdf`.
pub fn open_source(path: &Path) -> Result<Box<dyn PageSource>, SourceError> {
    if !path.exists() {
        return Err(SourceError::NotFound(path.to_path_buf()));
    }
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::open(path)?));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    let source: Box<dyn PageSource> = match ext.as_str() {
        "cbz" | "zip" => Box::new(ZipSource::open(path)?),
        "cbr" | "rar" => Box::new(RarSource::open(path)?),
        "pdf" => Box::new(PdfSource::open(path)?),
        other => return Err(SourceError::UnsupportedFormat(format!(".{other}"))),
    };
    Ok(source)
}

/// Whether `name` has one of the [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn is_supported_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Build the sorted listing for a set of member paths.
///
/// Each path comes with the key its source reads it back by. Returns
/// `(key, info)` pairs in index order; members sharing a path keep their
/// listing order.
pub(crate) fn index_members<K>(mut members: Vec<(String, K)>) -> Vec<(K, EntryInfo)> {
    crate::naming::sort_natural(&mut members, |(member, _)| member.as_str());
    members
        .into_iter()
        .enumerate()
        .map(|(index, (member, key))| {
            let (relative_path, name) = crate::naming::split_member_path(&member);
            let info = EntryInfo {
                index,
                relative_path,
                name,
            };
            (key, info)
        })
        .collect()
}
