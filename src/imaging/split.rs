//! Double-page spread detection and splitting.
//!
//! Eligibility is judged on the original bitmap, before any crop, so a spread
//! with heavy margins is still recognised. The halves are cut at the middle
//! column and each goes through the transform on its own.

use super::calculations::{is_double_page, split_column};
use super::decode::DecodedBitmap;

/// Settings that decide whether a page is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitOptions {
    pub enabled: bool,
    /// Page 0 is the cover and is never split.
    pub has_cover: bool,
    pub view_width: u32,
    pub view_height: u32,
}

/// Whether the page at `index` with `dimensions` should be split.
pub fn should_split(index: usize, dimensions: (u32, u32), options: &SplitOptions) -> bool {
    if !options.enabled {
        return false;
    }
    if options.has_cover && index == 0 {
        return false;
    }
    is_double_page(dimensions, (options.view_width, options.view_height))
}

/// Split a spread into its parts.
///
/// Returns the bitmap unchanged as part 0 when it is not eligible, otherwise
/// its left and right halves as parts 1 and 2. Both halves keep the index
/// and any decode failure of the whole page.
pub fn maybe_split(bitmap: DecodedBitmap, options: &SplitOptions) -> Vec<DecodedBitmap> {
    let (w, h) = (bitmap.width(), bitmap.height());
    if !should_split(bitmap.index, (w, h), options) {
        return vec![bitmap];
    }
    let mid = split_column(w);
    let half = |part, x, width| DecodedBitmap {
        index: bitmap.index,
        part,
        image: bitmap.image.crop_imm(x, 0, width, h),
        error: bitmap.error.clone(),
    };
    vec![half(1, 0, mid), half(2, mid, w - mid)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn options() -> SplitOptions {
        SplitOptions {
            enabled: true,
            has_cover: true,
            view_width: 100,
            view_height: 150,
        }
    }

    /// Spread whose left half is black and right half is white.
    fn spread(index: usize, w: u32, h: u32) -> DecodedBitmap {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        }));
        DecodedBitmap {
            index,
            part: 0,
            image,
            error: None,
        }
    }

    #[test]
    fn cover_spread_is_never_split() {
        let parts = maybe_split(spread(0, 400, 200), &options());
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].part, 0);
        assert_eq!(parts[0].width(), 400);
    }

    #[test]
    fn spread_after_cover_is_split_left_then_right() {
        let parts = maybe_split(spread(1, 400, 200), &options());
        let ids: Vec<(usize, u8)> = parts.iter().map(|b| (b.index, b.part)).collect();
        assert_eq!(ids, vec![(1, 1), (1, 2)]);

        let (left, right) = (&parts[0], &parts[1]);
        assert_eq!((left.width(), left.height()), (200, 200));
        assert_eq!((right.width(), right.height()), (200, 200));
        assert_eq!(left.image.to_rgb8().get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(right.image.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn halves_keep_the_decode_failure() {
        let mut bitmap = spread(2, 400, 200);
        bitmap.error = Some("truncated".into());
        let parts = maybe_split(bitmap, &options());
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(DecodedBitmap::is_fallback));
    }

    #[test]
    fn index_zero_splits_without_cover() {
        let opts = SplitOptions {
            has_cover: false,
            ..options()
        };
        assert_eq!(maybe_split(spread(0, 400, 200), &opts).len(), 2);
    }

    #[test]
    fn odd_width_right_half_takes_extra_column() {
        let parts = maybe_split(spread(3, 401, 200), &options());
        assert_eq!(parts[0].width(), 200);
        assert_eq!(parts[1].width(), 201);
    }

    #[test]
    fn disabled_never_splits() {
        let opts = SplitOptions {
            enabled: false,
            ..options()
        };
        assert!(!should_split(5, (400, 200), &opts));
    }

    #[test]
    fn small_or_portrait_pages_are_not_split() {
        // Not wider than the view height
        assert!(!should_split(1, (150, 120), &options()));
        // Not taller than the view width
        assert!(!should_split(1, (400, 100), &options()));
        // Portrait
        assert!(!should_split(1, (200, 400), &options()));
    }
}
