//! Converter configuration.
//!
//! Handles loading, validating, and resolving the TOML configuration file into
//! the [`PipelineOptions`] the pipeline runs with. Every key is optional: the
//! user file is merged on top of the stock defaults, so a file containing only
//!
//! ```toml
//! profile = "KPW5"
//! ```
//!
//! is a complete configuration.
//!
//! ## Configuration Options
//!
//! ```toml
//! # Device profile; supplies the view size and palette when set.
//! # profile = "KS"
//!
//! [view]
//! width = 1236              # Target display width in pixels
//! height = 1648             # Target display height in pixels
//!
//! [images]
//! quality = 85              # JPEG quality (0-100)
//! crop = true               # Trim near-blank margins
//! palette = "gray16"        # gray16 | gray256 | color
//!
//! [pages]
//! auto_split_double_page = true
//! has_cover = true          # First page is a cover, never split
//! drop_blank_pages = true   # Discard 1x1 spacer images
//!
//! [processing]
//! workers = 4               # Parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Palette, Quality, SplitOptions, TransformOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// E-reader display profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub code: &'static str,
    pub description: &'static str,
    pub width: u32,
    pub height: u32,
    pub palette: Palette,
}

/// Known device profiles, keyed by short code.
pub const PROFILES: &[Profile] = &[
    Profile {
        code: "K11",
        description: "Kindle 11",
        width: 1072,
        height: 1448,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KPW5",
        description: "Kindle Paperwhite 5 / Signature Edition",
        width: 1236,
        height: 1648,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KO",
        description: "Kindle Oasis 2 / Oasis 3",
        width: 1264,
        height: 1680,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KS",
        description: "Kindle Scribe",
        width: 1860,
        height: 2480,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KoC",
        description: "Kobo Clara HD / Kobo Clara 2E",
        width: 1072,
        height: 1448,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KoL",
        description: "Kobo Libra H2O / Kobo Libra 2",
        width: 1264,
        height: 1680,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KoF",
        description: "Kobo Forma",
        width: 1440,
        height: 1920,
        palette: Palette::Gray16,
    },
    Profile {
        code: "KoCC",
        description: "Kobo Clara Colour",
        width: 1072,
        height: 1448,
        palette: Palette::Color,
    },
];

/// Look up a device profile by code (case-insensitive).
pub fn find_profile(code: &str) -> Option<&'static Profile> {
    PROFILES.iter().find(|p| p.code.eq_ignore_ascii_case(code))
}

/// Converter configuration loaded from a TOML file.
///
/// All fields have defaults; user files only specify what they override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Device profile code. When set, overrides `view` and `images.palette`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Target display box.
    pub view: ViewConfig,
    /// Per-image transform settings.
    pub images: ImagesConfig,
    /// Page-level layout decisions.
    pub pages: PagesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ConverterConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 0-100".into(),
            ));
        }
        if self.view.width == 0 || self.view.height == 0 {
            return Err(ConfigError::Validation(
                "view.width and view.height must be non-zero".into(),
            ));
        }
        if self.processing.workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.workers must be at least 1".into(),
            ));
        }
        match &self.profile {
            Some(code) if find_profile(code).is_none() => {
                let known: Vec<&str> = PROFILES.iter().map(|p| p.code).collect();
                Err(ConfigError::Validation(format!(
                    "unknown profile '{code}' (known: {})",
                    known.join(", ")
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Target display box in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: 1236,
            height: 1648,
        }
    }
}

/// Per-image transform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// JPEG quality (0 = worst, 100 = best).
    pub quality: u32,
    /// Trim near-blank margins before resizing.
    pub crop: bool,
    /// Output palette.
    pub palette: Palette,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quality: 85,
            crop: true,
            palette: Palette::Gray16,
        }
    }
}

/// Page-level layout decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagesConfig {
    pub auto_split_double_page: bool,
    pub has_cover: bool,
    pub drop_blank_pages: bool,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            auto_split_double_page: true,
            has_cover: true,
            drop_blank_pages: true,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .workers
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Validated runtime options consumed by [`crate::pipeline`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Worker pool size (always at least 1).
    pub workers: usize,
    pub crop: bool,
    pub quality: Quality,
    pub target_width: u32,
    pub target_height: u32,
    pub palette: Palette,
    pub auto_split_double_page: bool,
    /// When set, index 0 is the cover and is never split.
    pub has_cover: bool,
    pub drop_blank_pages: bool,
    /// Enumerate only; skip decode and transform.
    pub dry_run: bool,
}

impl PipelineOptions {
    /// Build options from an already-validated config.
    pub fn from_config(config: &ConverterConfig) -> Self {
        let profile = config.profile.as_deref().and_then(find_profile);
        let (target_width, target_height, palette) = match profile {
            Some(p) => (p.width, p.height, p.palette),
            None => (config.view.width, config.view.height, config.images.palette),
        };
        Self {
            workers: effective_workers(&config.processing),
            crop: config.images.crop,
            quality: Quality::new(config.images.quality),
            target_width,
            target_height,
            palette,
            auto_split_double_page: config.pages.auto_split_double_page,
            has_cover: config.pages.has_cover,
            drop_blank_pages: config.pages.drop_blank_pages,
            dry_run: false,
        }
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            crop: self.crop,
            target_width: self.target_width,
            target_height: self.target_height,
            palette: self.palette,
            quality: self.quality,
        }
    }

    pub fn split_options(&self) -> SplitOptions {
        SplitOptions {
            enabled: self.auto_split_double_page,
            has_cover: self.has_cover,
            view_width: self.target_width,
            view_height: self.target_height,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&ConverterConfig::default())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ConverterConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, deserialize, and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ConverterConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ConverterConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, or stock defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<ConverterConfig, ConfigError> {
    let overlay = match path {
        Some(p) => {
            let content = fs::read_to_string(p)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock config file.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pagefold configuration
# ======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Device profile. When set, it replaces [view] and images.palette.
# Run `pagefold profiles` for the list of codes.
# profile = "KS"

# ---------------------------------------------------------------------------
# Target display box
# ---------------------------------------------------------------------------
[view]
width = 1236
height = 1648

# ---------------------------------------------------------------------------
# Image transform
# ---------------------------------------------------------------------------
[images]
# JPEG quality of the packaged pages (0 = worst, 100 = best).
quality = 85

# Trim near-blank margins before resizing.
crop = true

# Output palette: "gray16" (e-ink), "gray256", or "color".
palette = "gray16"

# ---------------------------------------------------------------------------
# Pages
# ---------------------------------------------------------------------------
[pages]
# Split wide double-page spreads into a left and a right page.
auto_split_double_page = true

# The first page is a cover: it is never split.
has_cover = true

# Discard 1x1 spacer images.
drop_blank_pages = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Parallel workers. Omit to auto-detect (= number of CPU cores).
# workers = 4
"##
}
