//! Image folder source.
//!
//! Walks the tree under the root, keeps files with a supported image
//! extension and sorts them by their path relative to the root. Each entry's
//! grouping path is its parent directory relative to the root, so pages
//! directly in the root have an empty grouping path.

use super::{
    EntryInfo, PageSource, SourceEntry, SourceError, SourceKind, index_members,
    is_supported_image,
};
use crate::imaging::RawPayload;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
    entries: Vec<EntryInfo>,
}

impl DirectorySource {
    pub fn open(root: &Path) -> Result<Self, SourceError> {
        let mut relative = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            if is_supported_image(&rel) {
                relative.push((rel, entry.path().to_path_buf()));
            }
        }

        if relative.is_empty() {
            return Err(SourceError::NoImagesFound(root.to_path_buf()));
        }

        let (files, entries) = index_members(relative).into_iter().unzip();

        tracing::debug!(root = %root.display(), "indexed image folder");
        Ok(Self { files, entries })
    }
}

impl PageSource for DirectorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Directory
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn produce(&self, sink: &mut dyn FnMut(SourceEntry) -> bool) -> Result<(), SourceError> {
        for (path, info) in self.files.iter().zip(&self.entries) {
            let path = path.clone();
            let name = info.name.clone();
            let entry = SourceEntry::deferred(info.clone(), move || {
                std::fs::read(&path)
                    .map(RawPayload::Encoded)
                    .map_err(|e| SourceError::corrupt(&name, e))
            });
            if !sink(entry) {
                break;
            }
        }
        Ok(())
    }
}
