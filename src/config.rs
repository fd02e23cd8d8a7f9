//! Options configuration.
//!
//! Handles loading, validating, and merging `responsive.toml`. Stock defaults
//! are serialized to a TOML table, the user's file is merged on top, and the
//! result is deserialized into [`ResponsiveOptions`] and validated. The CLI
//! then applies its flags on top of that.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! quality = 85              # Lossy encoder quality (1-100, clamped)
//! # sizes = [320, 640, 1280] # Requested widths, in order
//! # size = 800              # Single width, used when `sizes` is absent
//! # min = 320               # With `max`: derive `steps` widths geometrically
//! # max = 1280
//! steps = 4
//! placeholder = false       # Inline a tiny placeholder as a data URI
//! placeholder_size = 40
//! # format = "webp"         # Output format; defaults to the source extension
//! # background = "#ffffff"  # Flatten transparency onto this colour
//! rotate = 0                # Clockwise, quarter turns only
//! adapter = "image"         # Registered adapter identifier
//! name = "[hash]-[width].[ext]"
//! output_path = ""
//! public_path = ""
//! emit_file = true
//! es_module = false
//! disable = false           # Pass the source through untouched
//! cache_directory = false   # false | true (system temp) | "path"
//! cache_compression = true
//! # cache_identifier = "responsive-images@0.1.0"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [cloudinary]              # Presence enables remote publishing
//! cloud_name = "demo"
//! api_key = "..."
//! api_secret = "..."
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{
    AdapterOptions, OutputFormat, Quality, Rotation, derive_widths, parse_hex_color,
};
use crate::remote::CloudinaryCredentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "responsive.toml";

/// Upper bound on `steps`; more widths than this is never a useful srcset.
pub const MAX_STEPS: u32 = 64;

/// Directory under the system temp dir used by `cache_directory = true`.
pub const DEFAULT_CACHE_DIR_NAME: &str = "responsive-images-cache";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Where cache entries live. `false` disables caching, `true` picks a
/// directory under the system temp dir, a string names the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheDirectory {
    Toggle(bool),
    Path(PathBuf),
}

impl Default for CacheDirectory {
    fn default() -> Self {
        Self::Toggle(false)
    }
}

/// The resolved options record for one invocation.
///
/// All fields have defaults. Config files need only specify the values they
/// want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResponsiveOptions {
    pub quality: u32,
    pub sizes: Option<Vec<u32>>,
    pub size: Option<u32>,
    pub min: Option<u32>,
    pub max: Option<u32>,
    /// Number of widths derived between `min` and `max`.
    pub steps: u32,
    pub placeholder: bool,
    pub placeholder_size: u32,
    /// Output extension. Absent means "same as the source".
    pub format: Option<String>,
    pub background: Option<String>,
    pub rotate: u32,
    pub adapter: String,
    /// Output filename template, see [`naming`](crate::naming).
    pub name: String,
    pub output_path: String,
    pub public_path: String,
    pub emit_file: bool,
    /// Export style hint for the host; not used by the pipeline.
    pub es_module: bool,
    pub disable: bool,
    pub cache_directory: CacheDirectory,
    pub cache_compression: bool,
    pub cache_identifier: Option<String>,
    pub processing: ProcessingConfig,
    pub cloudinary: Option<CloudinaryCredentials>,
}

impl Default for ResponsiveOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            sizes: None,
            size: None,
            min: None,
            max: None,
            steps: 4,
            placeholder: false,
            placeholder_size: 40,
            format: None,
            background: None,
            rotate: 0,
            adapter: crate::imaging::rust_backend::IDENTITY.to_string(),
            name: crate::naming::DEFAULT_TEMPLATE.to_string(),
            output_path: String::new(),
            public_path: String::new(),
            emit_file: true,
            es_module: false,
            disable: false,
            cache_directory: CacheDirectory::default(),
            cache_compression: true,
            cache_identifier: None,
            processing: ProcessingConfig::default(),
            cloudinary: None,
        }
    }
}

impl ResponsiveOptions {
    /// Validate values are within acceptable ranges.
    ///
    /// The output format is deliberately not checked here: an unknown
    /// extension is an `UnsupportedMime` error raised by the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(sizes) = &self.sizes {
            if sizes.is_empty() {
                return Err(ConfigError::Validation("sizes must not be empty".into()));
            }
            if sizes.contains(&0) {
                return Err(ConfigError::Validation("sizes must be positive".into()));
            }
        }
        if self.size == Some(0) {
            return Err(ConfigError::Validation("size must be positive".into()));
        }
        match (self.min, self.max) {
            (Some(min), Some(max)) => {
                if min == 0 || min > max {
                    return Err(ConfigError::Validation(
                        "min must be positive and not exceed max".into(),
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Validation(
                    "min and max must be given together".into(),
                ));
            }
        }
        if self.steps == 0 || self.steps > MAX_STEPS {
            return Err(ConfigError::Validation(format!(
                "steps must be between 1 and {} (got {})",
                MAX_STEPS, self.steps
            )));
        }
        if self.placeholder_size == 0 {
            return Err(ConfigError::Validation(
                "placeholder_size must be positive".into(),
            ));
        }
        if Rotation::from_degrees(self.rotate).is_none() {
            return Err(ConfigError::Validation(format!(
                "rotate must be 0, 90, 180 or 270 (got {})",
                self.rotate
            )));
        }
        if let Some(bg) = &self.background
            && parse_hex_color(bg).is_none()
        {
            return Err(ConfigError::Validation(format!(
                "background '{}' is not a #rgb, #rrggbb or #rrggbbaa colour",
                bg
            )));
        }
        if self.adapter.trim().is_empty() {
            return Err(ConfigError::Validation("adapter must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("name must not be empty".into()));
        }
        Ok(())
    }

    /// Encoder options for every resize of this invocation.
    pub fn adapter_options(&self) -> Result<AdapterOptions, ConfigError> {
        let rotation = Rotation::from_degrees(self.rotate).ok_or_else(|| {
            ConfigError::Validation(format!("unsupported rotation {}", self.rotate))
        })?;
        let background = match &self.background {
            Some(bg) => Some(parse_hex_color(bg).ok_or_else(|| {
                ConfigError::Validation(format!("invalid background '{}'", bg))
            })?),
            None => None,
        };
        Ok(AdapterOptions {
            quality: Quality::new(self.quality),
            background,
            rotation,
        })
    }

    /// Output format: the explicit `format`, else the source's extension.
    /// `None` when the extension has no mime mapping.
    pub fn output_format(&self, source_extension: &str) -> Option<OutputFormat> {
        OutputFormat::from_extension(self.format.as_deref().unwrap_or(source_extension))
    }

    /// Requested widths in request order.
    pub fn requested_widths(&self) -> Vec<u32> {
        derive_widths(
            self.sizes.as_deref(),
            self.size,
            self.min.zip(self.max),
            self.steps,
        )
    }

    pub fn placeholder_width(&self) -> Option<u32> {
        self.placeholder.then_some(self.placeholder_size)
    }

    /// Identifier mixed into every cache key.
    pub fn cache_identifier(&self) -> String {
        self.cache_identifier
            .clone()
            .unwrap_or_else(|| format!("responsive-images@{}", env!("CARGO_PKG_VERSION")))
    }

    /// Resolved cache directory, or `None` when caching is off.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        match &self.cache_directory {
            CacheDirectory::Toggle(false) => None,
            CacheDirectory::Toggle(true) => Some(std::env::temp_dir().join(DEFAULT_CACHE_DIR_NAME)),
            CacheDirectory::Path(path) => Some(path.clone()),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel resize workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default options as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ResponsiveOptions::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ResponsiveOptions, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let options: ResponsiveOptions = merged.try_into()?;
    options.validate()?;
    Ok(options)
}

/// Load options from `path`, falling back to stock defaults when the file
/// does not exist.
pub fn load_config(path: &Path) -> Result<ResponsiveOptions, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `responsive.toml` with every key.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# responsive-images configuration
# ==============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Widths
# ---------------------------------------------------------------------------
# Requested widths, in the order they appear in the srcset. Widths larger than
# the source are clamped to the source width and computed once.
# sizes = [320, 640, 1280]

# A single width, used when `sizes` is absent.
# size = 800

# With both `min` and `max` (and no sizes/size), `steps` widths are derived
# in geometric progression from min to max (1 to 64 steps).
# min = 320
# max = 1280
steps = 4

# Without any of the above, one image at the source width is produced.

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
# Lossy encoder quality, 1-100.
quality = 85

# Output format: jpg, jpeg, png, webp or avif. Defaults to the source format.
# format = "webp"

# Flatten transparency onto this colour (#rgb, #rrggbb, #rrggbbaa).
# background = "#ffffff"

# Clockwise rotation before resizing: 0, 90, 180 or 270.
rotate = 0

# Image adapter, by registered identifier (see `responsive-images adapters`).
adapter = "image"

# ---------------------------------------------------------------------------
# Placeholder
# ---------------------------------------------------------------------------
# Inline a tiny variant as a data URI for progressive loading.
placeholder = false
placeholder_size = 40

# ---------------------------------------------------------------------------
# Output files
# ---------------------------------------------------------------------------
# Filename template. Tokens: [name] [ext] [width] [height] [hash] [hash:N]
name = "[hash]-[width].[ext]"

# Directory under the output root, and URL prefix for emitted paths.
output_path = ""
public_path = ""

# Set to false to compute names without writing files.
emit_file = true

# Export style hint for host integrations.
es_module = false

# Skip all processing and pass the source through as a single 100x100 entry.
disable = false

# ---------------------------------------------------------------------------
# Cache
# ---------------------------------------------------------------------------
# false = no cache, true = system temp dir, or a path.
cache_directory = false
cache_compression = true

# Mixed into every cache key. Defaults to the crate name and version.
# cache_identifier = "responsive-images@0.1.0"

# ---------------------------------------------------------------------------
# Parallel processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of parallel resize workers.
# Omit to auto-detect (uses all CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Remote publishing
# ---------------------------------------------------------------------------
# Uncomment to upload the source to Cloudinary. All three keys are required.
# [cloudinary]
# cloud_name = "demo"
# api_key = "123456789012345"
# api_secret = "..."
"##
}
