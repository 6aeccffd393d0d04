//! Transform pipeline: crop → fit-inside resize → palette quantize → encode.
//!
//! Every step is deterministic. Resizing uses a fixed Lanczos3 kernel, and
//! quantization is a pure function of the input luma. Running the same
//! bitmap through twice gives byte-identical output.

use super::calculations::fit_within;
use super::crop::find_content_bounds;
use super::params::{Palette, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("JPEG encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Per-run settings for [`transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub crop: bool,
    pub target_width: u32,
    pub target_height: u32,
    pub palette: Palette,
    pub quality: Quality,
}

/// A page ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Crop, resize and quantize a bitmap without encoding it.
pub fn prepare(image: &DynamicImage, options: &TransformOptions) -> DynamicImage {
    let cropped = if options.crop {
        crop_margins(image)
    } else {
        image.clone()
    };
    let resized = fit(cropped, (options.target_width, options.target_height));
    quantize(&resized, options.palette)
}

/// Run the full transform and encode the result as JPEG.
pub fn transform(
    image: &DynamicImage,
    options: &TransformOptions,
) -> Result<EncodedPage, TransformError> {
    let prepared = prepare(image, options);
    let data = encode_jpeg(&prepared, options.quality)?;
    Ok(EncodedPage {
        width: prepared.width(),
        height: prepared.height(),
        data,
    })
}

/// Crop to the content rectangle, or return the image untouched when the
/// page is all blank or has no margin.
pub fn crop_margins(image: &DynamicImage) -> DynamicImage {
    let bounds = find_content_bounds(image);
    if bounds.is_empty() || bounds.is_full(image.width(), image.height()) {
        return image.clone();
    }
    image.crop_imm(bounds.left, bounds.top, bounds.width(), bounds.height())
}

fn fit(image: DynamicImage, target: (u32, u32)) -> DynamicImage {
    let (w, h) = fit_within((image.width(), image.height()), target);
    if (w, h) == (image.width(), image.height()) {
        return image;
    }
    image.resize_exact(w, h, FilterType::Lanczos3)
}

/// Map the image onto the output palette.
pub fn quantize(image: &DynamicImage, palette: Palette) -> DynamicImage {
    match palette.gray_levels() {
        None => DynamicImage::ImageRgb8(image.to_rgb8()),
        Some(levels) => {
            let mut gray: GrayImage = image.to_luma8();
            if levels < 256 {
                let table = level_table(levels);
                for px in gray.pixels_mut() {
                    px[0] = table[px[0] as usize];
                }
            }
            DynamicImage::ImageLuma8(gray)
        }
    }
}

/// Lookup table snapping each luma value to the nearest of `levels` evenly
/// spaced gray levels.
fn level_table(levels: u16) -> [u8; 256] {
    let steps = (levels.max(2) - 1) as u32;
    let mut table = [0u8; 256];
    for (value, slot) in table.iter_mut().enumerate() {
        let level = (value as u32 * steps + 127) / 255;
        *slot = ((level * 255 + steps / 2) / steps) as u8;
    }
    table
}

/// Encode as baseline JPEG. Gray images are written as single-channel.
pub fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => {
            image.write_with_encoder(encoder)?
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()).write_with_encoder(encoder)?,
    }
    Ok(buf)
}
