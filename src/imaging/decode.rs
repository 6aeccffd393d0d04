//! Decode stage with a diagnostic fallback.
//!
//! A source entry arrives either as encoded bytes (JPEG, PNG, WebP) or, for
//! pages pulled out of a PDF, as an uncompressed raster. [`decode`] turns
//! both into a [`DynamicImage`].
//!
//! A page that fails to decode must not stop the book. [`decode_or_fallback`]
//! swaps it for a fixed-size card naming the broken entry, and keeps the
//! error next to the bitmap so the caller can count and report it.

use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use thiserror::Error;

/// Diagnostic card size, a typical portrait page.
pub const FALLBACK_WIDTH: u32 = 1200;
pub const FALLBACK_HEIGHT: u32 = 1920;

const BORDER: u32 = 6;
const GLYPH_SCALE: u32 = 5;
const GLYPH_CELL: u32 = 8 * GLYPH_SCALE;
const LINE_HEIGHT: u32 = GLYPH_CELL * 3 / 2;
const TEXT_MARGIN: u32 = 60;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("raster data too short: expected {expected} bytes, got {actual}")]
    RasterTooShort { expected: usize, actual: usize },
    #[error("unsupported raster: {0}")]
    UnsupportedRaster(String),
    #[error("{0}")]
    Unreadable(String),
}

/// Color model of an uncompressed raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterColor {
    Gray,
    Rgb,
    Cmyk,
}

impl RasterColor {
    fn channels(self) -> usize {
        match self {
            RasterColor::Gray => 1,
            RasterColor::Rgb => 3,
            RasterColor::Cmyk => 4,
        }
    }
}

/// Uncompressed pixel rows, as stored in a PDF image stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    pub width: u32,
    pub height: u32,
    pub color: RasterColor,
    /// 8, or 1 for bilevel gray.
    pub bits_per_component: u8,
    pub data: Vec<u8>,
}

/// Raw bytes of one source entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// A complete encoded image file.
    Encoded(Vec<u8>),
    /// Raw pixels extracted from a container.
    Raster(RasterPage),
}

/// A bitmap produced from one source entry, or its diagnostic stand-in.
#[derive(Debug, Clone)]
pub struct DecodedBitmap {
    pub index: usize,
    /// 0 for a whole page; 1/2 for the halves of a split spread.
    pub part: u8,
    pub image: DynamicImage,
    /// Decode failure this bitmap stands in for.
    pub error: Option<String>,
}

impl DecodedBitmap {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Decode a raw payload into a bitmap.
pub fn decode(raw: &RawPayload) -> Result<DynamicImage, DecodeError> {
    match raw {
        RawPayload::Encoded(bytes) => Ok(image::load_from_memory(bytes)?),
        RawPayload::Raster(raster) => decode_raster(raster),
    }
}

fn decode_raster(raster: &RasterPage) -> Result<DynamicImage, DecodeError> {
    let (w, h) = (raster.width, raster.height);
    if w == 0 || h == 0 {
        return Err(DecodeError::UnsupportedRaster(format!("empty {w}x{h} raster")));
    }

    match (raster.bits_per_component, raster.color) {
        (1, RasterColor::Gray) => {
            let row_bytes = (w as usize).div_ceil(8);
            check_len(&raster.data, row_bytes * h as usize)?;
            Ok(DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
                let byte = raster.data[y as usize * row_bytes + x as usize / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                image::Luma([if bit == 1 { 255 } else { 0 }])
            })))
        }
        (8, color) => {
            let pixels = w as usize * h as usize;
            let expected = pixels * color.channels();
            check_len(&raster.data, expected)?;
            let data = &raster.data[..expected];
            match color {
                RasterColor::Gray => GrayImage::from_raw(w, h, data.to_vec())
                    .map(DynamicImage::ImageLuma8)
                    .ok_or(DecodeError::RasterTooShort {
                        expected,
                        actual: data.len(),
                    }),
                RasterColor::Rgb => RgbImage::from_raw(w, h, data.to_vec())
                    .map(DynamicImage::ImageRgb8)
                    .ok_or(DecodeError::RasterTooShort {
                        expected,
                        actual: data.len(),
                    }),
                RasterColor::Cmyk => {
                    let rgb: Vec<u8> = data.chunks_exact(4).flat_map(cmyk_to_rgb).collect();
                    RgbImage::from_raw(w, h, rgb)
                        .map(DynamicImage::ImageRgb8)
                        .ok_or(DecodeError::RasterTooShort {
                            expected,
                            actual: data.len(),
                        })
                }
            }
        }
        (bits, color) => Err(DecodeError::UnsupportedRaster(format!(
            "{bits}-bit {color:?}"
        ))),
    }
}

fn check_len(data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::RasterTooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn cmyk_to_rgb(px: &[u8]) -> [u8; 3] {
    let k = 255 - px[3] as u32;
    let channel = |c: u8| ((255 - c as u32) * k / 255) as u8;
    [channel(px[0]), channel(px[1]), channel(px[2])]
}

/// Decode an entry, substituting a diagnostic card when it cannot be read.
///
/// `raw` is the entry's payload, or the reason it could not be read at all
/// (e.g. a damaged archive member).
pub fn decode_or_fallback(
    index: usize,
    group: &str,
    name: &str,
    raw: Result<RawPayload, String>,
) -> DecodedBitmap {
    let decoded = raw.and_then(|payload| decode(&payload).map_err(|e| e.to_string()));
    match decoded {
        Ok(image) => DecodedBitmap {
            index,
            part: 0,
            image,
            error: None,
        },
        Err(error) => DecodedBitmap {
            index,
            part: 0,
            image: DynamicImage::ImageRgb8(corrupted_page(group, name)),
            error: Some(error),
        },
    }
}

/// Render the placeholder page for a corrupted entry.
pub fn corrupted_page(group: &str, name: &str) -> RgbImage {
    let black = Rgb([0, 0, 0]);
    let mut card = RgbImage::from_pixel(FALLBACK_WIDTH, FALLBACK_HEIGHT, Rgb([255, 255, 255]));

    let (w, h) = (FALLBACK_WIDTH, FALLBACK_HEIGHT);
    for rect in [
        Rect::at(0, 0).of_size(w, BORDER),
        Rect::at(0, (h - BORDER) as i32).of_size(w, BORDER),
        Rect::at(0, 0).of_size(BORDER, h),
        Rect::at((w - BORDER) as i32, 0).of_size(BORDER, h),
    ] {
        draw_filled_rect_mut(&mut card, rect, black);
    }

    let mut text = vec![name.to_string()];
    if !group.is_empty() {
        text.push(format!("in {group}"));
    }
    text.push("is corrupted!".to_string());

    let max_chars = ((w - 2 * TEXT_MARGIN) / GLYPH_CELL) as usize;
    let lines: Vec<String> = text.iter().flat_map(|t| wrap(t, max_chars)).collect();

    let block_height = lines.len() as u32 * LINE_HEIGHT;
    let mut y = h.saturating_sub(block_height) / 2;
    for line in &lines {
        let line_width = line.chars().count() as u32 * GLYPH_CELL;
        let x = w.saturating_sub(line_width) / 2;
        draw_line(&mut card, line, x, y, black);
        y += LINE_HEIGHT;
    }
    card
}

fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

fn draw_line(card: &mut RgbImage, line: &str, x: u32, y: u32, color: Rgb<u8>) {
    for (i, ch) in line.chars().enumerate() {
        let glyph = BASIC_FONTS
            .get(ch)
            .or_else(|| LATIN_FONTS.get(ch))
            .or_else(|| BASIC_FONTS.get('?'))
            .unwrap_or([0; 8]);
        let origin_x = x + i as u32 * GLYPH_CELL;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8u32 {
                // Least significant bit is the leftmost pixel
                if bits & (1 << col) != 0 {
                    let rect = Rect::at(
                        (origin_x + col * GLYPH_SCALE) as i32,
                        (y + row as u32 * GLYPH_SCALE) as i32,
                    )
                    .of_size(GLYPH_SCALE, GLYPH_SCALE);
                    draw_filled_rect_mut(card, rect, color);
                }
            }
        }
    }
}
