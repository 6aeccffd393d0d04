//! Value types shared by the transform stages.
//!
//! - [`Quality`]: JPEG quality for the packaged page (1-100). Clamped on construction.
//! - [`Palette`]: target color palette the page is quantized to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy page encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Output color palette.
///
/// E-ink readers render 16 gray levels; quantizing up front keeps the encoded
/// pages small and avoids dithering artifacts on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    /// 16 evenly spaced gray levels.
    #[default]
    Gray16,
    /// Full 8-bit grayscale.
    Gray256,
    /// Keep RGB color.
    Color,
}

impl Palette {
    /// Number of gray levels, or `None` for color output.
    pub fn gray_levels(self) -> Option<u16> {
        match self {
            Palette::Gray16 => Some(16),
            Palette::Gray256 => Some(256),
            Palette::Color => None,
        }
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Palette::Gray16 => "gray16",
            Palette::Gray256 => "gray256",
            Palette::Color => "color",
        };
        f.pad(name)
    }
}
