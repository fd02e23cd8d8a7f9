//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [transform engine](super::operations) (which decides
//! which widths to produce) and the [adapter](super::backend) (which does the
//! actual pixel work). This separation allows swapping adapters (e.g. for
//! testing with a mock) without changing planning logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`OutputFormat`]: Encoded output format and its mime type.
//! - [`Rotation`]: Clockwise quarter-turn applied before resizing.
//! - [`AdapterOptions`]: Encoder options shared by every resize of one invocation.
//! - [`ResizeParams`]: Full specification for a single resize.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Output encoding for resized variants.
///
/// The extension → format mapping is the single source of truth for mime
/// types: anything [`from_extension`](Self::from_extension) rejects has no
/// mime mapping and is refused before any adapter work begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl OutputFormat {
    /// Map a file extension (case-insensitive, without the dot) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }

    /// Canonical extension used when naming emitted files.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// Whether the encoded form can carry an alpha channel.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

/// Clockwise rotation applied to the decoded source before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Parse a rotation from degrees. Only quarter turns are accepted.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::None),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    /// Whether the rotation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

/// Encoder options shared by every resize in one invocation.
///
/// Serialized into the cache key, so any change here invalidates cached
/// results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AdapterOptions {
    pub quality: Quality,
    /// RGBA colour to flatten transparency onto before encoding.
    pub background: Option<[u8; 4]>,
    pub rotation: Rotation,
}

/// Parameters for a single resize operation.
///
/// Only the target width is given; the adapter derives the height from the
/// source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: u32,
    pub format: OutputFormat,
    pub options: AdapterOptions,
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` into RGBA bytes.
pub fn parse_hex_color(value: &str) -> Option<[u8; 4]> {
    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgba = [255u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let nibble = c.to_digit(16)? as u8;
                rgba[i] = nibble * 17;
            }
            Some(rgba)
        }
        6 => Some([byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255]),
        8 => Some([
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        ]),
        _ => None,
    }
}
