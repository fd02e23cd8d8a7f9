//! Output filename templates.
//!
//! Emitted files are named from a template with bracketed placeholders:
//!
//! | Token | Value |
//! |---|---|
//! | `[name]` | source file stem (`dawn` for `photos/dawn.jpg`) |
//! | `[ext]` | output extension (`jpg`, `webp`, …) |
//! | `[width]` / `[height]` | dimensions of this variant |
//! | `[hash]` | first 20 hex chars of the SHA-256 of the variant's bytes |
//! | `[hash:N]` | first `N` hex chars of the same digest |
//!
//! The default template is `[hash]-[width].[ext]`, so renaming the source
//! never changes output names and identical variants share a name.
//! Unknown tokens are copied verbatim.

use sha2::{Digest, Sha256};

pub const DEFAULT_TEMPLATE: &str = "[hash]-[width].[ext]";

const DEFAULT_HASH_LEN: usize = 20;

/// Values available to a template.
#[derive(Debug, Clone, Copy)]
pub struct NameParts<'a> {
    pub name: &'a str,
    pub ext: &'a str,
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

/// SHA-256 of `data` as lowercase hex.
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Expand every recognised token in `template`.
///
/// The content hash is only computed when the template asks for it.
pub fn interpolate(template: &str, parts: &NameParts<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut hash: Option<String> = None;
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];
        let Some(close) = after.find(']') else {
            out.push_str(after);
            return out;
        };
        let token = &after[1..close];
        // `name.[ext]` with no extension must not leave a dangling dot.
        if token == "ext" && parts.ext.is_empty() && out.ends_with('.') {
            out.pop();
        }
        match expand_token(token, parts, &mut hash) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&after[..=close]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn expand_token(token: &str, parts: &NameParts<'_>, hash: &mut Option<String>) -> Option<String> {
    match token {
        "name" => Some(parts.name.to_string()),
        "ext" => Some(parts.ext.to_string()),
        "width" => Some(parts.width.to_string()),
        "height" => Some(parts.height.to_string()),
        "hash" => Some(truncated_hash(hash, parts.data, DEFAULT_HASH_LEN)),
        _ => {
            let len = token.strip_prefix("hash:")?.parse::<usize>().ok()?;
            Some(truncated_hash(hash, parts.data, len))
        }
    }
}

fn truncated_hash(cache: &mut Option<String>, data: &[u8], len: usize) -> String {
    let full = cache.get_or_insert_with(|| content_hash(data));
    full[..len.min(full.len())].to_string()
}
