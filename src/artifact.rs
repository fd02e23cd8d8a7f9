//! The generated artifact handed back to the host.
//!
//! Assembly is the last step of an invocation: the emitted files (already in
//! request order, duplicates included) plus the optional placeholder become a
//! [`GeneratedArtifact`]. How the host embeds it (ES module, CommonJS, JSON)
//! is not our concern; the artifact serializes with camelCase keys so a JSON
//! dump is directly usable from JavaScript.
//!
//! ```text
//! {
//!   "srcSet": [{"src": "a.jpg 300w", "path": "a.jpg", "width": 300, "height": 225}, …],
//!   "images": [{"path": "a.jpg", "width": 300, "height": 225}, …],
//!   "src": "a.jpg",
//!   "placeholder": "data:image/jpeg;base64,…",
//!   "width": 300,
//!   "height": 225
//! }
//! ```

use crate::imaging::{OutputFormat, ResizeResult};
use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensions reported for a disabled (pass-through) invocation.
pub const DISABLED_DIMENSION: u32 = 100;

/// One emitted file, as returned by the emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedFile {
    /// Srcset fragment: `"<path> <width>w"`.
    pub src: String,
    pub path: String,
    pub width: u32,
    pub height: u32,
}

/// Per-file record in [`GeneratedArtifact::images`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub path: String,
    pub width: u32,
    pub height: u32,
}

impl From<&EmittedFile> for ImageEntry {
    fn from(file: &EmittedFile) -> Self {
        Self {
            path: file.path.clone(),
            width: file.width,
            height: file.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub src_set: Vec<EmittedFile>,
    pub images: Vec<ImageEntry>,
    /// First file's path, or the remote URL template when published.
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl GeneratedArtifact {
    /// The `srcset` attribute value: every `src` fragment joined with `,`.
    pub fn srcset_attr(&self) -> String {
        self.src_set
            .iter()
            .map(|f| f.src.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// String coercion: the primary (first) file's local path.
impl fmt::Display for GeneratedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.images.first() {
            Some(first) => f.write_str(&first.path),
            None => f.write_str(&self.src),
        }
    }
}

/// Inline `data:` URI for the placeholder bytes.
pub fn placeholder_data_uri(result: &ResizeResult, format: OutputFormat) -> String {
    format!(
        "data:{};base64,{}",
        format.mime(),
        general_purpose::STANDARD.encode(&result.data)
    )
}

/// Build the artifact from files in request order.
///
/// Returns `None` when `files` is empty; there is no primary file to take
/// `src` and the default dimensions from.
pub fn assemble(
    files: Vec<EmittedFile>,
    placeholder: Option<(&ResizeResult, OutputFormat)>,
    remote_src: Option<String>,
) -> Option<GeneratedArtifact> {
    let first = files.first()?;
    let (width, height) = (first.width, first.height);
    let src = remote_src.unwrap_or_else(|| first.path.clone());
    let images = files.iter().map(ImageEntry::from).collect();

    Some(GeneratedArtifact {
        src_set: files,
        images,
        src,
        placeholder: placeholder.map(|(result, format)| placeholder_data_uri(result, format)),
        width,
        height,
    })
}

/// Artifact for `disable = true`: the untouched source as a single file,
/// labelled 100×100.
pub fn disabled_artifact(path: String) -> GeneratedArtifact {
    let file = EmittedFile {
        src: format!("{} {}w", path, DISABLED_DIMENSION),
        path,
        width: DISABLED_DIMENSION,
        height: DISABLED_DIMENSION,
    };
    GeneratedArtifact {
        src: file.path.clone(),
        images: vec![ImageEntry::from(&file)],
        src_set: vec![file],
        placeholder: None,
        width: DISABLED_DIMENSION,
        height: DISABLED_DIMENSION,
    }
}
