//! Pure calculation functions for planning responsive widths.
//!
//! All functions here are pure and testable without any I/O or images.

use super::backend::Dimensions;

/// Height that preserves the source aspect ratio at `width`.
///
/// Never returns zero, so extremely wide sources still produce a valid image.
///
/// # Examples
/// ```
/// # use responsive_images::imaging::{Dimensions, scaled_height};
/// let source = Dimensions { width: 1024, height: 768 };
/// assert_eq!(scaled_height(source, 300), 225);
/// ```
pub fn scaled_height(source: Dimensions, width: u32) -> u32 {
    if source.width == 0 {
        return source.height.max(1);
    }
    let ratio = width as f64 / source.width as f64;
    ((source.height as f64 * ratio).round() as u32).max(1)
}

/// Derive the requested width list from the configured sizing options.
///
/// Precedence:
/// 1. `sizes`: used verbatim, in order
/// 2. `size`: a single width
/// 3. `min` + `max`: `steps` widths in geometric progression, first = `min`,
///    last = `max`, intermediate widths rounded up
/// 4. nothing: a single unbounded width, which the planner clamps to the
///    source width
pub fn derive_widths(
    sizes: Option<&[u32]>,
    size: Option<u32>,
    range: Option<(u32, u32)>,
    steps: u32,
) -> Vec<u32> {
    if let Some(sizes) = sizes {
        return sizes.to_vec();
    }
    if let Some(size) = size {
        return vec![size];
    }
    match range {
        Some((min, max)) => geometric_progression(min, max, steps),
        None => vec![u32::MAX],
    }
}

fn geometric_progression(min: u32, max: u32, steps: u32) -> Vec<u32> {
    if steps <= 1 || min >= max || min == 0 {
        return vec![max];
    }
    // More steps than integer widths in the range only repeats widths.
    let steps = steps.min(max - min + 1);
    let ratio = (max as f64 / min as f64).powf(1.0 / (steps - 1) as f64);
    (0..steps)
        .map(|i| {
            if i == steps - 1 {
                max
            } else {
                // Epsilon keeps exact powers from rounding up past float noise.
                let width = min as f64 * ratio.powi(i as i32);
                ((width - 1e-6).ceil() as u32).min(max)
            }
        })
        .collect()
}

/// Which resizes to run, and how requested positions map onto them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizePlan {
    /// Distinct effective widths, in order of first appearance.
    pub widths: Vec<u32>,
    /// For each requested width (in request order), the index into
    /// [`widths`](Self::widths) whose result it reuses.
    pub positions: Vec<usize>,
    /// Extra placeholder width, always resized last and never deduplicated.
    pub placeholder: Option<u32>,
}

impl SizePlan {
    /// Every width to resize, regular widths first, placeholder last.
    pub fn scheduled(&self) -> Vec<u32> {
        let mut all = self.widths.clone();
        all.extend(self.placeholder);
        all
    }

    /// Effective width for each requested position.
    pub fn effective_widths(&self) -> Vec<u32> {
        self.positions.iter().map(|&i| self.widths[i]).collect()
    }
}

/// Plan the resizes for one source.
///
/// Each requested width is clamped to `min(requested, source_width)`. Clamped
/// duplicates are scheduled once; later positions reuse the first result.
/// The placeholder width is scheduled separately and is never merged with a
/// regular width, even when they coincide.
pub fn plan_sizes(source_width: u32, requested: &[u32], placeholder: Option<u32>) -> SizePlan {
    let mut widths: Vec<u32> = Vec::new();
    let mut positions = Vec::with_capacity(requested.len());

    for &width in requested {
        let effective = width.min(source_width);
        let index = match widths.iter().position(|&w| w == effective) {
            Some(existing) => existing,
            None => {
                widths.push(effective);
                widths.len() - 1
            }
        };
        positions.push(index);
    }

    SizePlan {
        widths,
        positions,
        placeholder,
    }
}
