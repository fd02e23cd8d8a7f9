//! CLI output formatting.
//!
//! Every function here is pure: it takes pipeline data and returns display
//! lines. The binary decides where they go (stderr for progress events, from
//! the printer thread; stdout for artifact summaries).
//!
//! # Output Format
//!
//! ```text
//! dawn: 4 widths (300, 600, 1024, 1024), 3 resizes, encoded
//!     dawn-300.jpg 300x225
//!     dawn-600.jpg 600x450
//!     dawn-1024.jpg 1024x768
//!     Uploaded dawn → https://res.cloudinary.com/demo/image/upload/w_[width]/v1/dawn.jpg
//! ```

use crate::artifact::GeneratedArtifact;
use crate::cache::CacheStatus;
use crate::process::ProcessEvent;

fn cache_label(status: CacheStatus) -> &'static str {
    match status {
        CacheStatus::Hit => "cached",
        CacheStatus::Miss => "encoded",
    }
}

fn join_widths(widths: &[u32]) -> String {
    widths
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a single progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Transformed {
            source,
            widths,
            scheduled,
            cache,
        } => {
            let noun = if widths.len() == 1 { "width" } else { "widths" };
            vec![format!(
                "{}: {} {} ({}), {} resizes, {}",
                source,
                widths.len(),
                noun,
                join_widths(widths),
                scheduled,
                cache_label(*cache)
            )]
        }
        ProcessEvent::Emitted {
            path,
            width,
            height,
        } => vec![format!("    {} {}x{}", path, width, height)],
        ProcessEvent::Uploaded { public_id, url } => {
            vec![format!("    Uploaded {} \u{2192} {}", public_id, url)]
        }
        ProcessEvent::UploadFailed { public_id, message } => {
            vec![format!("    Upload of {} failed: {}", public_id, message)]
        }
        ProcessEvent::Disabled { source, path } => {
            vec![format!("{}: processing disabled, copied to {}", source, path)]
        }
    }
}

/// Summary lines for a finished artifact.
pub fn format_artifact(artifact: &GeneratedArtifact) -> Vec<String> {
    let mut lines = vec![
        format!("src: {}", artifact.src),
        format!("size: {}x{}", artifact.width, artifact.height),
        format!("srcset: {}", artifact.srcset_attr()),
    ];
    if let Some(placeholder) = &artifact.placeholder {
        lines.push(format!("placeholder: {} bytes inline", placeholder.len()));
    }
    lines
}
