//! The transform engine.
//!
//! Combines the size plan with adapter execution: every scheduled width is
//! resized concurrently against the shared source bytes, and the batch only
//! completes once all of them have.

use super::backend::{AdapterError, Dimensions, ImageAdapter, ResizeResult, SourceImage};
use super::calculations::{SizePlan, plan_sizes};
use super::params::{AdapterOptions, OutputFormat, ResizeParams};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single planned resize that failed. Fails the whole batch.
#[derive(Error, Debug)]
#[error("resize to {width}px failed: {source}")]
pub struct ResizeFailure {
    pub width: u32,
    #[source]
    pub source: AdapterError,
}

/// Errors from one engine run.
#[derive(Error, Debug)]
pub enum TransformError {
    /// The source could not be read as an image.
    #[error("Failed to read source metadata: {0}")]
    Metadata(#[source] AdapterError),
    #[error(transparent)]
    Resize(#[from] ResizeFailure),
}

/// Everything an engine run produces. This is also the unit the cache stores:
/// the source dimensions let a cache hit rebuild the [`SizePlan`] without
/// touching the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    /// Source dimensions after rotation, i.e. what the plan clamps against.
    pub source: Dimensions,
    /// Regular widths in planned order, then the placeholder (if any).
    pub results: Vec<ResizeResult>,
}

/// What to produce for one source.
#[derive(Debug, Clone)]
pub struct TransformRequest<'a> {
    pub widths: &'a [u32],
    pub placeholder: Option<u32>,
    pub format: OutputFormat,
    pub options: AdapterOptions,
}

impl TransformRequest<'_> {
    /// Source dimensions as the adapter sees them once rotation is applied.
    pub fn oriented(&self, source: Dimensions) -> Dimensions {
        if self.options.rotation.swaps_axes() {
            Dimensions {
                width: source.height,
                height: source.width,
            }
        } else {
            source
        }
    }

    /// Plan against oriented source dimensions.
    pub fn plan(&self, source: Dimensions) -> SizePlan {
        plan_sizes(source.width, self.widths, self.placeholder)
    }
}

/// Read metadata, plan, and resize every scheduled width.
///
/// Resizes run in parallel on the rayon pool. If any fails, that failure is
/// returned and no results are surfaced; resizes already in flight finish
/// but their output is discarded.
pub fn run_transform(
    adapter: &(impl ImageAdapter + ?Sized),
    source: &SourceImage,
    request: &TransformRequest<'_>,
) -> Result<TransformOutput, TransformError> {
    let dimensions = request.oriented(
        source
            .dimensions(adapter)
            .map_err(TransformError::Metadata)?,
    );
    let plan = request.plan(dimensions);
    let results = resize_all(adapter, source, &plan, request)?;
    Ok(TransformOutput {
        source: dimensions,
        results,
    })
}

/// Resize every width of `plan`, regular widths first, placeholder last.
pub fn resize_all(
    adapter: &(impl ImageAdapter + ?Sized),
    source: &SourceImage,
    plan: &SizePlan,
    request: &TransformRequest<'_>,
) -> Result<Vec<ResizeResult>, ResizeFailure> {
    plan.scheduled()
        .par_iter()
        .map(|&width| {
            let params = ResizeParams {
                width,
                format: request.format,
                options: request.options,
            };
            adapter
                .resize(source.bytes(), &params)
                .map_err(|err| ResizeFailure { width, source: err })
        })
        .collect()
}
