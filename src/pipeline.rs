//! Concurrent page pipeline and result assembly.
//!
//! ```text
//!  producer thread        worker pool (rayon, N threads)          caller thread
//! ┌──────────────┐ entries ┌─────────────────────────────────┐ results ┌───────────┐
//! │ PageSource   │───────► │ open → decode/fallback → split  │───────► │ assemble  │
//! │ ::produce()  │ bounded │      → crop → resize → encode   │ bounded │ sort, drop│
//! └──────────────┘  (N)    └─────────────────────────────────┘   (N)   └───────────┘
//! ```
//!
//! Both queues are bounded to the worker count, so a slow consumer pushes
//! back on the workers and the workers push back on the producer. Pages
//! finish in any order; the assembler restores `(index, part)` order at the
//! end.
//!
//! ## Failure handling
//!
//! A page that cannot be decoded, or whose member is damaged, is replaced by
//! a diagnostic page and the run continues. Anything else (the container
//! disappearing, a broken solid stream, an encoder failure) cancels the run:
//! the first error is kept, the producer and workers stop at their next
//! check, and [`run`] returns that error. No partial result is returned.

use crate::config::PipelineOptions;
use crate::imaging::{TransformError, decode_or_fallback, maybe_split, transform};
use crate::source::{EntryInfo, PageSource, SourceEntry, SourceError, SourceKind, open_source};
use flume::{Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, mpsc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("no usable images: every page was blank")]
    NoUsableImages,
}

/// One encoded page, ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    pub index: usize,
    /// 0 for a whole page; 1/2 for the left/right half of a spread.
    pub part: u8,
    /// JPEG bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// True only for index 0, part 0.
    pub is_cover: bool,
    /// Reserved for downstream pagination; always false here.
    pub needs_layout_spacer: bool,
    /// Grouping path of the source entry.
    pub origin: String,
    /// Entry name inside the source.
    pub name: String,
    /// Set when this page is a diagnostic stand-in for an unreadable entry.
    pub error: Option<String>,
}

impl PageResult {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }

    /// `NNNN_P.jpg`: zero-padded index and part, so a plain directory
    /// listing preserves reading order.
    pub fn file_name(&self) -> String {
        format!("{:04}_{}.jpg", self.index, self.part)
    }

    fn is_blank(&self) -> bool {
        self.width == 1 && self.height == 1
    }
}

/// Progress events emitted while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The source was opened and indexed.
    Started { kind: SourceKind, total: usize },
    /// A page (or half page) finished encoding.
    PageDone {
        index: usize,
        part: u8,
        name: String,
        width: u32,
        height: u32,
        fallback: bool,
    },
    /// All pages were collected and put in order.
    Assembled {
        pages: usize,
        dropped: usize,
        fallbacks: usize,
    },
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub kind: SourceKind,
    /// Number of source entries.
    pub total: usize,
    /// Sorted listing of every source entry.
    pub entries: Vec<EntryInfo>,
    /// Pages in `(index, part)` order. Empty for a dry run.
    pub pages: Vec<PageResult>,
}

impl Conversion {
    pub fn cover(&self) -> Option<&PageResult> {
        self.pages.iter().find(|p| p.is_cover)
    }

    pub fn fallback_count(&self) -> usize {
        self.pages.iter().filter(|p| p.is_fallback()).count()
    }
}

/// Open `input` and run every page through the pipeline.
pub fn run(
    input: &Path,
    options: &PipelineOptions,
    events: Option<mpsc::Sender<PipelineEvent>>,
) -> Result<Conversion, PipelineError> {
    let source = open_source(input)?;
    run_source(source.as_ref(), options, events)
}

/// Run every page of an already opened source through the pipeline.
pub fn run_source(
    source: &dyn PageSource,
    options: &PipelineOptions,
    events: Option<mpsc::Sender<PipelineEvent>>,
) -> Result<Conversion, PipelineError> {
    let kind = source.kind();
    let total = source.len();
    info!(%kind, total, workers = options.workers, "source indexed");
    emit(&events, PipelineEvent::Started { kind, total });

    let entries = source.entries().to_vec();
    if options.dry_run {
        return Ok(Conversion {
            kind,
            total,
            entries,
            pages: Vec::new(),
        });
    }

    let results = process_all(source, options, &events)?;
    let collected = results.len();
    let pages = assemble(results, options.drop_blank_pages)?;

    let fallbacks = pages.iter().filter(|p| p.is_fallback()).count();
    info!(pages = pages.len(), fallbacks, "pages assembled");
    emit(
        &events,
        PipelineEvent::Assembled {
            pages: pages.len(),
            dropped: collected - pages.len(),
            fallbacks,
        },
    );

    Ok(Conversion {
        kind,
        total,
        entries,
        pages,
    })
}

/// Write every page into `dir` (created if missing) and return the paths.
pub fn write_pages(pages: &[PageResult], dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    pages
        .iter()
        .map(|page| {
            let path = dir.join(page.file_name());
            std::fs::write(&path, &page.data)?;
            Ok(path)
        })
        .collect()
}

fn emit(events: &Option<mpsc::Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        // Receiver gone just means nobody is watching progress
        let _ = tx.send(event);
    }
}

/// Drop 1×1 artifacts if asked, restore `(index, part)` order, and refuse
/// an empty result.
pub fn assemble(
    mut results: Vec<PageResult>,
    drop_blank_pages: bool,
) -> Result<Vec<PageResult>, PipelineError> {
    if drop_blank_pages {
        results.retain(|page| !page.is_blank());
    }
    results.sort_by_key(|page| (page.index, page.part));
    if results.is_empty() {
        return Err(PipelineError::NoUsableImages);
    }
    Ok(results)
}

// =============================================================================
// Orchestration
// =============================================================================

/// Cancellation flag plus the first fatal error.
#[derive(Default)]
struct RunState {
    cancelled: AtomicBool,
    first_error: Mutex<Option<PipelineError>>,
}

impl RunState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn fail(&self, error: PipelineError) {
        self.cancelled.store(true, Ordering::Release);
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            warn!(%error, "cancelling run");
            *slot = Some(error);
        }
    }

    fn into_error(self) -> Option<PipelineError> {
        self.first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn process_all(
    source: &dyn PageSource,
    options: &PipelineOptions,
    events: &Option<mpsc::Sender<PipelineEvent>>,
) -> Result<Vec<PageResult>, PipelineError> {
    let workers = options.workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("pagefold-worker-{i}"))
        .build()?;

    let (entry_tx, entry_rx) = flume::bounded::<SourceEntry>(workers);
    let (result_tx, result_rx) = flume::bounded::<PageResult>(workers);
    let state = RunState::default();
    let mut results = Vec::with_capacity(source.len());

    std::thread::scope(|scope| {
        let state = &state;

        scope.spawn(move || {
            let produced = source.produce(&mut |entry| {
                !state.is_cancelled() && entry_tx.send(entry).is_ok()
            });
            // Workers see the queue close once the producer is done
            drop(entry_tx);
            if let Err(error) = produced {
                state.fail(error.into());
            }
        });

        scope.spawn(move || {
            let channels: Vec<_> = (0..workers)
                .map(|_| (entry_rx.clone(), result_tx.clone()))
                .collect();
            drop(entry_rx);
            drop(result_tx);
            pool.scope(|s| {
                for (entries, results) in channels {
                    s.spawn(move |_| work(entries, results, options, state));
                }
            });
        });

        for page in result_rx.iter() {
            debug!(index = page.index, part = page.part, "page collected");
            emit(
                events,
                PipelineEvent::PageDone {
                    index: page.index,
                    part: page.part,
                    name: page.name.clone(),
                    width: page.width,
                    height: page.height,
                    fallback: page.is_fallback(),
                },
            );
            results.push(page);
        }
    });

    match state.into_error() {
        Some(error) => Err(error),
        None => Ok(results),
    }
}

/// Worker loop: take entries until the queue closes or the run is cancelled.
fn work(
    entries: Receiver<SourceEntry>,
    results: Sender<PageResult>,
    options: &PipelineOptions,
    state: &RunState,
) {
    while !state.is_cancelled() {
        let Ok(entry) = entries.recv() else {
            return;
        };
        match process_entry(entry, options) {
            Ok(pages) => {
                for page in pages {
                    if results.send(page).is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                state.fail(error);
                return;
            }
        }
    }
}

/// Decode → split → transform one entry.
fn process_entry(
    entry: SourceEntry,
    options: &PipelineOptions,
) -> Result<Vec<PageResult>, PipelineError> {
    let info = entry.info.clone();
    let raw = match entry.open() {
        Ok(raw) => Ok(raw),
        Err(error) if error.is_entry_local() => Err(error.to_string()),
        Err(error) => return Err(error.into()),
    };

    let bitmap = decode_or_fallback(info.index, &info.relative_path, &info.name, raw);
    if let Some(error) = &bitmap.error {
        warn!(index = info.index, name = %info.name, %error, "unreadable page replaced");
    }

    let transform_options = options.transform_options();
    let parts = maybe_split(bitmap, &options.split_options());
    let mut pages = Vec::with_capacity(parts.len());
    for part in parts {
        let encoded = transform(&part.image, &transform_options)?;
        pages.push(PageResult {
            index: part.index,
            part: part.part,
            data: encoded.data,
            width: encoded.width,
            height: encoded.height,
            is_cover: part.index == 0 && part.part == 0,
            needs_layout_spacer: false,
            origin: info.relative_path.clone(),
            name: info.name.clone(),
            error: part.error,
        });
    }
    Ok(pages)
}
