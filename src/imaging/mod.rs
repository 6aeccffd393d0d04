//! Page image processing, pure Rust.
//!
//! | Stage | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory`, raw PDF rasters |
//! | **Fallback card** | `imageproc` rectangles + `font8x8` glyphs |
//! | **Margin crop** | luma border scan |
//! | **Resize** | `resize_exact` with `Lanczos3` |
//! | **Quantize** | 16/256 gray levels, or RGB |
//! | **Encode** | `JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: `Quality` and `Palette`
//! - **Decode**: payload → bitmap, with a diagnostic stand-in on failure
//! - **Crop / Transform / Split**: the per-page stages, in the order the
//!   pipeline applies them

mod calculations;
pub mod crop;
pub mod decode;
mod params;
pub mod split;
pub mod transform;

pub use calculations::{fit_within, is_double_page, split_column};
pub use crop::{ContentBounds, find_content_bounds};
pub use decode::{
    DecodeError, DecodedBitmap, RasterColor, RasterPage, RawPayload, decode, decode_or_fallback,
};
pub use params::{Palette, Quality};
pub use split::{SplitOptions, maybe_split};
pub use transform::{EncodedPage, TransformError, TransformOptions, transform};
