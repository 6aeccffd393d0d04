//! Zip-based archive source (`.cbz`, `.zip`).
//!
//! The central directory is read once to build the listing. Every entry then
//! opens its own handle on the archive when read, so workers decompress
//! members in parallel without sharing a reader.

use super::{
    EntryInfo, PageSource, SourceEntry, SourceError, SourceKind, index_members,
    is_supported_image,
};
use crate::imaging::RawPayload;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

#[derive(Debug)]
pub struct ZipSource {
    path: PathBuf,
    /// Position of each entry's member in the central directory.
    members: Vec<usize>,
    entries: Vec<EntryInfo>,
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(BufReader::new(file)).map_err(|source| SourceError::Zip {
        path: path.to_path_buf(),
        source,
    })
}

impl ZipSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let mut archive = open_archive(path)?;

        let mut names = Vec::new();
        for i in 0..archive.len() {
            let member = archive.by_index(i).map_err(|source| SourceError::Zip {
                path: path.to_path_buf(),
                source,
            })?;
            if !member.is_dir() && is_supported_image(member.name()) {
                names.push((member.name().to_string(), i));
            }
        }

        if names.is_empty() {
            return Err(SourceError::NoImagesFound(path.to_path_buf()));
        }

        let (members, entries) = index_members(names).into_iter().unzip();
        Ok(Self {
            path: path.to_path_buf(),
            members,
            entries,
        })
    }
}

/// Upper bound on the buffer reserved up front from a member's declared size.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Bytes to reserve for a member declaring `size` uncompressed bytes.
///
/// The declared size comes from the archive and is not trusted; the buffer
/// still grows to whatever the member actually inflates to.
fn preallocation(size: u64) -> usize {
    size.min(MAX_PREALLOC) as usize
}

/// Read the member at `position` from a fresh handle on the archive.
///
/// Failing to open the archive is fatal; failing to read the member only
/// affects that page.
fn read_member(path: &Path, position: usize, name: &str) -> Result<RawPayload, SourceError> {
    let mut archive = open_archive(path)?;
    let mut file = archive
        .by_index(position)
        .map_err(|e| SourceError::corrupt(name, e))?;
    let mut bytes = Vec::with_capacity(preallocation(file.size()));
    file.read_to_end(&mut bytes)
        .map_err(|e| SourceError::corrupt(name, e))?;
    Ok(RawPayload::Encoded(bytes))
}

impl PageSource for ZipSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Zip
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn produce(&self, sink: &mut dyn FnMut(SourceEntry) -> bool) -> Result<(), SourceError> {
        for (&position, info) in self.members.iter().zip(&self.entries) {
            let path = self.path.clone();
            let name = info.name.clone();
            let entry =
                SourceEntry::deferred(info.clone(), move || read_member(&path, position, &name));
            if !sink(entry) {
                break;
            }
        }
        Ok(())
    }
}
