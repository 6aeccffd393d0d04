//! Pure calculation functions for page dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the size of an image scaled to fit inside a target box.
///
/// Preserves aspect ratio. Images already inside the box are returned
/// unchanged: pages are never upscaled, the reader does that better.
/// Neither output dimension is ever rounded down to zero.
///
/// # Examples
/// ```
/// # use pagefold::imaging::fit_within;
/// // 2000x3000 page into a 1000x1000 box → height-bound
/// assert_eq!(fit_within((2000, 3000), (1000, 1000)), (667, 1000));
///
/// // Already small enough → untouched
/// assert_eq!(fit_within((800, 600), (1236, 1648)), (800, 600));
/// ```
pub fn fit_within(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if src_w <= tgt_w && src_h <= tgt_h {
        return source;
    }

    let scale_w = tgt_w as f64 / src_w as f64;
    let scale_h = tgt_h as f64 / src_h as f64;

    if scale_w <= scale_h {
        // Width-bound
        let h = (src_h as f64 * scale_w).round() as u32;
        (tgt_w, h.max(1))
    } else {
        // Height-bound
        let w = (src_w as f64 * scale_h).round() as u32;
        (w.max(1), tgt_h)
    }
}

/// Whether an original (pre-crop) page is a spread worth splitting.
///
/// The page must be landscape, and large enough that each half still
/// fills a portrait viewport: wider than the view height and taller
/// than the view width.
pub fn is_double_page(original: (u32, u32), view: (u32, u32)) -> bool {
    let (w, h) = original;
    let (view_w, view_h) = view;
    w > h && w > view_h && h > view_w
}

/// Column at which a spread is cut into its left and right halves.
pub fn split_column(width: u32) -> u32 {
    width / 2
}
