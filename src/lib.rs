//! # responsive-images
//!
//! Turns one source image into a set of resized variants for a responsive
//! `srcset`, plus an optional inline placeholder, and describes the result as
//! a typed [`GeneratedArtifact`](artifact::GeneratedArtifact).
//!
//! # Architecture
//!
//! ```text
//! source bytes ─► cache ─hit──────────────────────────┐
//!                   └─miss─► adapter: metadata, then  │
//!                            N resizes in parallel ───┤
//! source bytes ─► remote publish (optional) ──────────┤
//!                                                     ▼
//!                       emit each distinct result ─► assemble artifact
//! ```
//!
//! Width planning, caching, and assembly are pure logic over the
//! [`ImageAdapter`](imaging::ImageAdapter) trait, so everything except the
//! pixel work is testable with a mock adapter.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Adapter trait, pure-Rust adapter, registry, width planner, transform engine |
//! | [`cache`] | Content-addressed result store (`get_or_compute`) |
//! | [`remote`] | Cloudinary upload and width URL templates |
//! | [`emit`] | File emission seam + directory emitter |
//! | [`naming`] | `[hash]-[width].[ext]` filename templates |
//! | [`artifact`] | `GeneratedArtifact` assembly, disabled short-circuit |
//! | [`process`] | One invocation end to end; errors and progress events |
//! | [`config`] | `responsive.toml` loading, stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Deduplicate After Clamping
//!
//! Requested widths are clamped to the source width first, so `[1024, 2000]`
//! against a 1024px source is one resize whose result fills both srcset
//! positions. Request order is preserved; the placeholder is always resized
//! last and never merged with a regular width.
//!
//! ## Cache the Whole Batch
//!
//! A cache entry is the complete transform output, including the source
//! dimensions. A hit therefore never touches the adapter, not even for
//! metadata, and a batch is either fully cached or recomputed.
//!
//! ## Fail the Whole Invocation
//!
//! One failed resize, or a failed upload, fails everything. Files are only
//! emitted after every resize and the upload have succeeded, so a failure
//! never leaves half an output set behind.

pub mod artifact;
pub mod cache;
pub mod config;
pub mod emit;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod remote;
