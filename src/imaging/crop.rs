//! Margin detection for auto-crop.
//!
//! Scanned pages usually carry a white border of uneven width. The detector
//! walks each side of the page inward while the whole sweep line is blank
//! and returns the rectangle that remains.
//!
//! Each side is measured against the full image, independently of the other
//! three, so the result does not depend on the order the sides are visited.
//! On an all-blank page the sides cross over and the rectangle has no area;
//! callers must treat that as "nothing to crop".

use image::{DynamicImage, GrayImage};

/// Luma at or above which a pixel counts as blank (≈94% of full scale).
pub const BLANK_LUMA: u8 = 0xf0;

/// Content rectangle in pixel coordinates; `right`/`bottom` are exclusive.
///
/// When the sides cross (`right <= left` or `bottom <= top`) the rectangle is
/// empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentBounds {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ContentBounds {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// True when the rectangle has zero or negative area.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// True when the rectangle covers the whole `width` x `height` image.
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        self.left == 0 && self.top == 0 && self.right == width && self.bottom == height
    }
}

fn is_blank(luma: u8) -> bool {
    luma >= BLANK_LUMA
}

fn column_blank(gray: &GrayImage, x: u32) -> bool {
    (0..gray.height()).all(|y| is_blank(gray.get_pixel(x, y)[0]))
}

fn row_blank(gray: &GrayImage, y: u32) -> bool {
    (0..gray.width()).all(|x| is_blank(gray.get_pixel(x, y)[0]))
}

/// Compute the content rectangle of `image`, excluding near-blank borders.
pub fn find_content_bounds(image: &DynamicImage) -> ContentBounds {
    let gray = image.to_luma8();
    let (w, h) = gray.dimensions();

    let left = (0..w).take_while(|&x| column_blank(&gray, x)).count() as u32;
    let top = (0..h).take_while(|&y| row_blank(&gray, y)).count() as u32;
    let right = w - (0..w).rev().take_while(|&x| column_blank(&gray, x)).count() as u32;
    let bottom = h - (0..h).rev().take_while(|&y| row_blank(&gray, y)).count() as u32;

    ContentBounds {
        left,
        top,
        right,
        bottom,
    }
}
