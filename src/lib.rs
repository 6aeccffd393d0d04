//! # pagefold
//!
//! Turns a comic or book source (a folder of images, a cbz/zip, a cbr/rar or a
//! PDF) into an ordered list of page images sized, cropped and reduced for an
//! e-reader.
//!
//! # Architecture: Producer, Workers, Assembler
//!
//! ```text
//! 1. Source     open + index entries in natural order  (source)
//! 2. Workers    decode/fallback → split → crop → resize → quantize → encode
//!                                                      (imaging, pipeline)
//! 3. Assemble   drop 1x1 artifacts, sort by (index, part)  (pipeline)
//! ```
//!
//! The source adapter fixes each entry's index before any work starts, so the
//! final order never depends on which worker finishes first. Damaged pages do
//! not stop a conversion: they are replaced by a generated page that names
//! the broken entry. Only container-level failures abort a run.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`source`] | Source adapters (directory, zip, rar, pdf) behind the [`source::PageSource`] trait |
//! | [`imaging`] | Decode with fallback, margin detection, resize, palette, JPEG encode, spread splitting |
//! | [`pipeline`] | Bounded worker pool over the source, result assembly, progress events |
//! | [`config`] | `config.toml` loading, validation, device profiles, runtime options |
//! | [`naming`] | Natural ordering of entry paths |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Indices Are Assigned Up Front
//!
//! Every adapter lists and sorts its entries when opened. Workers only carry
//! the index along; the assembler sorts on `(index, part)` once everything is
//! back. A solid rar archive, which can only be read front to back, still
//! produces the same indices because the listing pass runs first.
//!
//! ## Bounded Queues
//!
//! Both the entry queue and the result queue hold at most one item per
//! worker, so memory stays flat no matter how large the source is.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resizing and JPEG encoding use the `image` crate; the diagnostic
//! page is drawn with `imageproc` and an embedded bitmap font. Only rar
//! extraction links a native library (`unrar`).

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helpers;
