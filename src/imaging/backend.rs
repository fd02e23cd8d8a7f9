//! Image adapter trait and shared types.
//!
//! The [`ImageAdapter`] trait defines the two operations every backend must
//! support: read the intrinsic dimensions of a source, and resize it to an
//! encoded buffer. The transform engine only ever talks to this trait, so
//! backends are interchangeable and selected by configuration through the
//! [registry](super::registry).
//!
//! The production implementation is
//! [`RustAdapter`](super::rust_backend::RustAdapter), pure Rust, statically
//! linked.

use super::params::ResizeParams;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of a metadata read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// One encoded variant produced by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeResult {
    #[serde(with = "crate::cache::base64_bytes")]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The source image of one invocation.
///
/// Bytes are immutable and shared read-only by every concurrent resize.
/// Dimensions are fetched lazily through an adapter the first time they are
/// needed and remembered afterwards.
#[derive(Debug)]
pub struct SourceImage {
    data: Vec<u8>,
    file_name: String,
    dimensions: OnceLock<Dimensions>,
}

impl SourceImage {
    /// Wrap raw bytes. `file_name` supplies the stem and extension used for
    /// naming and mime resolution (e.g. `"photos/dawn.jpg"`).
    pub fn new(data: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            data,
            file_name: file_name.into(),
            dimensions: OnceLock::new(),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self::new(data, path.to_string_lossy()))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// File name without directories or extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
    }

    /// Lower-cased extension without the dot, or `""` when absent.
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Intrinsic dimensions, read through `adapter` on first use.
    pub fn dimensions(
        &self,
        adapter: &(impl ImageAdapter + ?Sized),
    ) -> Result<Dimensions, AdapterError> {
        if let Some(dims) = self.dimensions.get() {
            return Ok(*dims);
        }
        let dims = adapter.metadata(&self.data)?;
        // A concurrent caller may have won the race; both values are identical.
        let _ = self.dimensions.set(dims);
        Ok(dims)
    }
}

/// Trait for image-processing backends.
///
/// Implementations must be `Sync`: the transform engine issues every planned
/// resize concurrently against the same adapter.
pub trait ImageAdapter: Sync {
    /// Stable identifier, mixed into cache keys so switching backends never
    /// serves another backend's output.
    fn identity(&self) -> &str;

    /// Read intrinsic dimensions. Fails with [`AdapterError::Decode`] if the
    /// bytes are not a supported image.
    fn metadata(&self, data: &[u8]) -> Result<Dimensions, AdapterError>;

    /// Resize to `params.width` (height follows the aspect ratio) and encode.
    fn resize(&self, data: &[u8], params: &ResizeParams) -> Result<ResizeResult, AdapterError>;
}

impl<T: ImageAdapter + ?Sized> ImageAdapter for Box<T> {
    fn identity(&self) -> &str {
        (**self).identity()
    }

    fn metadata(&self, data: &[u8]) -> Result<Dimensions, AdapterError> {
        (**self).metadata(data)
    }

    fn resize(&self, data: &[u8], params: &ResizeParams) -> Result<ResizeResult, AdapterError> {
        (**self).resize(data, params)
    }
}
