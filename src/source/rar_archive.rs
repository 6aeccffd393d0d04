//! Rar-based archive source (`.cbr`, `.rar`).
//!
//! Rar members can only be reached by walking the archive's headers in
//! order. For a regular archive each entry walks a fresh handle up to its own
//! member, so workers read members in parallel. A solid archive compresses
//! all members as one stream and skipping is as expensive as reading, so it
//! is drained once on the producing thread and every wanted member is handed
//! to the workers as an in-memory buffer.
//!
//! The walk itself is written against [`MemberStream`], which `unrar` backs
//! in production and an in-memory fake backs in tests.

use super::{
    EntryInfo, PageSource, SourceEntry, SourceError, SourceKind, index_members,
    is_supported_image,
};
use crate::imaging::RawPayload;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use unrar::{Archive, CursorBeforeFile, CursorBeforeHeader, OpenArchive, Process};

#[derive(Debug)]
pub struct RarSource {
    path: PathBuf,
    solid: bool,
    /// Position of each entry's member among the archive headers.
    members: Vec<usize>,
    entries: Vec<EntryInfo>,
}

fn rar_error(path: &Path, detail: impl ToString) -> SourceError {
    SourceError::Rar {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn member_name(filename: &Path) -> String {
    filename.to_string_lossy().replace('\\', "/")
}

impl RarSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let listing = Archive::new(path)
            .open_for_listing()
            .map_err(|e| rar_error(path, e))?;
        let solid = listing.is_solid();

        let mut names = Vec::new();
        for (position, header) in listing.enumerate() {
            let header = header.map_err(|e| rar_error(path, e))?;
            let name = member_name(&header.filename);
            if !header.is_directory() && is_supported_image(&name) {
                names.push((name, position));
            }
        }

        if names.is_empty() {
            return Err(SourceError::NoImagesFound(path.to_path_buf()));
        }

        tracing::debug!(path = %path.display(), solid, members = names.len(), "indexed rar archive");
        let (members, entries) = index_members(names).into_iter().unzip();
        Ok(Self {
            path: path.to_path_buf(),
            solid,
            members,
            entries,
        })
    }

    pub fn is_solid(&self) -> bool {
        self.solid
    }
}

impl PageSource for RarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Rar
    }

    fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    fn produce(&self, sink: &mut dyn FnMut(SourceEntry) -> bool) -> Result<(), SourceError> {
        if self.solid {
            let wanted: HashMap<usize, &EntryInfo> =
                self.members.iter().copied().zip(&self.entries).collect();
            let mut stream = UnrarStream::open(&self.path).map_err(|e| rar_error(&self.path, e))?;
            return drain_solid(&mut stream, &wanted, sink).map_err(|e| rar_error(&self.path, e));
        }

        for (&position, info) in self.members.iter().zip(&self.entries) {
            let path = self.path.clone();
            let name = info.name.clone();
            let entry = SourceEntry::deferred(info.clone(), move || {
                let mut stream = UnrarStream::open(&path).map_err(|e| rar_error(&path, e))?;
                extract_member(&mut stream, &path, position, &name).map(RawPayload::Encoded)
            });
            if !sink(entry) {
                break;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Sequential member walk
// =============================================================================

/// Forward-only cursor over the members of an archive.
///
/// After [`next_member`](Self::next_member) returns a name, exactly one of
/// [`read_member`](Self::read_member) or [`skip_member`](Self::skip_member)
/// must be called before advancing again.
pub(crate) trait MemberStream {
    fn next_member(&mut self) -> Result<Option<String>, String>;
    fn read_member(&mut self) -> Result<Vec<u8>, String>;
    fn skip_member(&mut self) -> Result<(), String>;
}

/// Walk the whole stream once, handing each wanted member to `sink` as a
/// buffered entry. `wanted` is keyed by header position.
///
/// Any stream error is returned, since later members cannot be reached past
/// a broken solid block.
pub(crate) fn drain_solid(
    stream: &mut dyn MemberStream,
    wanted: &HashMap<usize, &EntryInfo>,
    sink: &mut dyn FnMut(SourceEntry) -> bool,
) -> Result<(), String> {
    let mut position = 0;
    while stream.next_member()?.is_some() {
        match wanted.get(&position) {
            Some(info) => {
                let bytes = stream.read_member()?;
                if !sink(SourceEntry::buffered((*info).clone(), bytes)) {
                    return Ok(());
                }
            }
            None => stream.skip_member()?,
        }
        position += 1;
    }
    Ok(())
}

/// Walk up to the member at header `position` and read it.
///
/// Failing to reach the member means the archive itself is broken; failing
/// to read it only damages that page.
pub(crate) fn extract_member(
    stream: &mut dyn MemberStream,
    path: &Path,
    position: usize,
    name: &str,
) -> Result<Vec<u8>, SourceError> {
    let mut current = 0;
    while let Some(member) = stream.next_member().map_err(|e| rar_error(path, e))? {
        if current == position {
            if crate::naming::split_member_path(&member).1 != name {
                return Err(rar_error(path, format!("member {name} moved")));
            }
            return stream
                .read_member()
                .map_err(|e| SourceError::corrupt(name, e));
        }
        stream.skip_member().map_err(|e| rar_error(path, e))?;
        current += 1;
    }
    Err(rar_error(path, format!("member {name} disappeared")))
}

enum RarCursor {
    Header(OpenArchive<Process, CursorBeforeHeader>),
    File(OpenArchive<Process, CursorBeforeFile>),
    Spent,
}

/// [`MemberStream`] over an archive opened with `unrar`.
struct UnrarStream {
    cursor: RarCursor,
}

impl UnrarStream {
    fn open(path: &Path) -> Result<Self, String> {
        let archive = Archive::new(path)
            .open_for_processing()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            cursor: RarCursor::Header(archive),
        })
    }
}

impl MemberStream for UnrarStream {
    fn next_member(&mut self) -> Result<Option<String>, String> {
        match std::mem::replace(&mut self.cursor, RarCursor::Spent) {
            RarCursor::Header(archive) => match archive.read_header().map_err(|e| e.to_string())? {
                Some(file) => {
                    let name = member_name(&file.entry().filename);
                    self.cursor = RarCursor::File(file);
                    Ok(Some(name))
                }
                None => Ok(None),
            },
            RarCursor::File(file) => {
                self.cursor = RarCursor::File(file);
                Err("previous member was neither read nor skipped".into())
            }
            RarCursor::Spent => Ok(None),
        }
    }

    fn read_member(&mut self) -> Result<Vec<u8>, String> {
        match std::mem::replace(&mut self.cursor, RarCursor::Spent) {
            RarCursor::File(file) => {
                let (data, rest) = file.read().map_err(|e| e.to_string())?;
                self.cursor = RarCursor::Header(rest);
                Ok(data)
            }
            other => {
                self.cursor = other;
                Err("no member selected".into())
            }
        }
    }

    fn skip_member(&mut self) -> Result<(), String> {
        match std::mem::replace(&mut self.cursor, RarCursor::Spent) {
            RarCursor::File(file) => {
                let rest = file.skip().map_err(|e| e.to_string())?;
                self.cursor = RarCursor::Header(rest);
                Ok(())
            }
            other => {
                self.cursor = other;
                Err("no member selected".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory member stream. A member whose content is `Err` fails when read.
    struct FakeStream {
        members: Vec<(String, Result<Vec<u8>, String>)>,
        next: usize,
        selected: Option<usize>,
        /// Fail the header walk when reaching this position.
        break_at: Option<usize>,
        reads: usize,
    }

    impl FakeStream {
        fn new(members: &[(&str, Result<&str, &str>)]) -> Self {
            Self {
                members: members
                    .iter()
                    .map(|(n, c)| {
                        (
                            n.to_string(),
                            (*c).map(|b| b.as_bytes().to_vec())
                                .map_err(|e| e.to_string()),
                        )
                    })
                    .collect(),
                next: 0,
                selected: None,
                break_at: None,
                reads: 0,
            }
        }
    }

    impl MemberStream for FakeStream {
        fn next_member(&mut self) -> Result<Option<String>, String> {
            assert!(self.selected.is_none(), "member left unconsumed");
            if self.break_at == Some(self.next) {
                return Err("unexpected end of archive".into());
            }
            let Some((name, _)) = self.members.get(self.next) else {
                return Ok(None);
            };
            self.selected = Some(self.next);
            self.next += 1;
            Ok(Some(name.clone()))
        }

        fn read_member(&mut self) -> Result<Vec<u8>, String> {
            let i = self.selected.take().ok_or("no member selected")?;
            self.reads += 1;
            self.members[i].1.clone()
        }

        fn skip_member(&mut self) -> Result<(), String> {
            self.selected.take().ok_or("no member selected")?;
            Ok(())
        }
    }

    fn info(index: usize, name: &str) -> EntryInfo {
        EntryInfo {
            index,
            relative_path: String::new(),
            name: name.into(),
        }
    }

    // =========================================================================
    // Solid drain
    // =========================================================================

    #[test]
    fn solid_drain_recovers_every_wanted_member() {
        let mut stream = FakeStream::new(&[
            ("002.jpg", Ok("second page")),
            ("notes.nfo", Ok("release notes")),
            ("001.jpg", Ok("first page")),
        ]);
        let (a, b) = (info(0, "001.jpg"), info(1, "002.jpg"));
        let wanted: HashMap<usize, &EntryInfo> = [(2, &a), (0, &b)].into();

        let mut got = Vec::new();
        drain_solid(&mut stream, &wanted, &mut |entry| {
            let index = entry.info.index;
            got.push((index, entry.open().unwrap()));
            true
        })
        .unwrap();

        got.sort_by_key(|(i, _)| *i);
        assert_eq!(
            got,
            vec![
                (0, RawPayload::Encoded(b"first page".to_vec())),
                (1, RawPayload::Encoded(b"second page".to_vec())),
            ]
        );
        // The unwanted member was skipped, not decompressed
        assert_eq!(stream.reads, 2);
    }

    #[test]
    fn solid_drain_keeps_members_sharing_a_name_apart() {
        let mut stream = FakeStream::new(&[
            ("scans/001.jpg", Ok("first scan")),
            ("scans/001.jpg", Ok("rescan")),
        ]);
        let (a, b) = (info(0, "001.jpg"), info(1, "001.jpg"));
        let wanted: HashMap<usize, &EntryInfo> = [(0, &a), (1, &b)].into();

        let mut got = Vec::new();
        drain_solid(&mut stream, &wanted, &mut |entry| {
            got.push((entry.info.index, entry.open().unwrap()));
            true
        })
        .unwrap();
        assert_eq!(
            got,
            vec![
                (0, RawPayload::Encoded(b"first scan".to_vec())),
                (1, RawPayload::Encoded(b"rescan".to_vec())),
            ]
        );
    }

    #[test]
    fn solid_drain_error_is_returned() {
        let mut stream = FakeStream::new(&[("001.jpg", Ok("one")), ("002.jpg", Ok("two"))]);
        stream.break_at = Some(1);
        let (a, b) = (info(0, "001.jpg"), info(1, "002.jpg"));
        let wanted: HashMap<usize, &EntryInfo> = [(0, &a), (1, &b)].into();

        let mut delivered = 0;
        let result = drain_solid(&mut stream, &wanted, &mut |_| {
            delivered += 1;
            true
        });
        assert_eq!(result, Err("unexpected end of archive".to_string()));
        assert_eq!(delivered, 1);
    }

    #[test]
    fn solid_drain_read_failure_is_returned() {
        let mut stream = FakeStream::new(&[("001.jpg", Err("crc mismatch"))]);
        let a = info(0, "001.jpg");
        let wanted: HashMap<usize, &EntryInfo> = [(0, &a)].into();
        let result = drain_solid(&mut stream, &wanted, &mut |_| true);
        assert!(result.is_err());
    }

    #[test]
    fn solid_drain_stops_when_sink_refuses() {
        let mut stream = FakeStream::new(&[("001.jpg", Ok("one")), ("002.jpg", Ok("two"))]);
        let (a, b) = (info(0, "001.jpg"), info(1, "002.jpg"));
        let wanted: HashMap<usize, &EntryInfo> = [(0, &a), (1, &b)].into();
        drain_solid(&mut stream, &wanted, &mut |_| false).unwrap();
        assert_eq!(stream.reads, 1);
    }

    // =========================================================================
    // Single member extraction
    // =========================================================================

    #[test]
    fn extract_skips_to_member() {
        let mut stream = FakeStream::new(&[
            ("001.jpg", Ok("one")),
            ("002.jpg", Ok("two")),
            ("003.jpg", Ok("three")),
        ]);
        let bytes = extract_member(&mut stream, Path::new("book.cbr"), 1, "002.jpg").unwrap();
        assert_eq!(bytes, b"two");
        assert_eq!(stream.reads, 1);
    }

    #[test]
    fn extract_reads_the_later_of_two_same_named_members() {
        let mut stream = FakeStream::new(&[("001.jpg", Ok("one")), ("001.jpg", Ok("again"))]);
        let bytes = extract_member(&mut stream, Path::new("book.cbr"), 1, "001.jpg").unwrap();
        assert_eq!(bytes, b"again");
    }

    #[test]
    fn extract_member_replaced_by_another_is_fatal() {
        let mut stream = FakeStream::new(&[("001.jpg", Ok("one")), ("notes.nfo", Ok("text"))]);
        let err = extract_member(&mut stream, Path::new("book.cbr"), 1, "002.jpg").unwrap_err();
        assert!(matches!(err, SourceError::Rar { .. }));
    }

    #[test]
    fn extract_damaged_member_is_entry_local() {
        let mut stream = FakeStream::new(&[("001.jpg", Err("crc mismatch"))]);
        let err = extract_member(&mut stream, Path::new("book.cbr"), 0, "001.jpg").unwrap_err();
        assert!(err.is_entry_local());
    }

    #[test]
    fn extract_broken_walk_is_fatal() {
        let mut stream = FakeStream::new(&[("001.jpg", Ok("one")), ("002.jpg", Ok("two"))]);
        stream.break_at = Some(1);
        let err = extract_member(&mut stream, Path::new("book.cbr"), 1, "002.jpg").unwrap_err();
        assert!(matches!(err, SourceError::Rar { .. }));
    }

    #[test]
    fn extract_missing_member_is_fatal() {
        let mut stream = FakeStream::new(&[("001.jpg", Ok("one"))]);
        let err = extract_member(&mut stream, Path::new("book.cbr"), 5, "999.jpg").unwrap_err();
        assert!(!err.is_entry_local());
    }

    // =========================================================================
    // Real archives
    // =========================================================================

    /// Build a solid archive with the `rar` command line tool and read it back.
    #[test]
    #[ignore] // Requires the rar command line tool
    fn solid_archive_round_trip() {
        use crate::test_helpers::{collect_entries, jpeg_bytes};

        let tmp = tempfile::TempDir::new().unwrap();
        let pages = [("001.jpg", jpeg_bytes(20, 30)), ("002.jpg", jpeg_bytes(30, 20))];
        for (name, bytes) in &pages {
            std::fs::write(tmp.path().join(name), bytes).unwrap();
        }
        let archive = tmp.path().join("book.cbr");
        let status = std::process::Command::new("rar")
            .current_dir(tmp.path())
            .args(["a", "-s", "-ep", "book.cbr", "001.jpg", "002.jpg"])
            .status()
            .unwrap();
        assert!(status.success());

        let source = RarSource::open(&archive).unwrap();
        assert!(source.is_solid());
        let entries = collect_entries(&source);
        assert_eq!(entries.len(), 2);
        for ((info, payload), (name, bytes)) in entries.into_iter().zip(pages) {
            assert_eq!(info.name, name);
            assert_eq!(payload.unwrap(), RawPayload::Encoded(bytes));
        }
    }
}
