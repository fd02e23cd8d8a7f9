//! Image processing: adapters, size planning, and the transform engine.
//!
//! | Operation | Where |
//! |---|---|
//! | **Metadata** | [`ImageAdapter::metadata`] |
//! | **Resize → encoded buffer** | [`ImageAdapter::resize`] |
//! | **Width planning** | [`plan_sizes`], [`derive_widths`] |
//! | **Parallel batch** | [`run_transform`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for width planning (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageAdapter`] trait + [`RustAdapter`]
//! - **Registry**: identifier → adapter constructor
//! - **Operations**: The transform engine combining plan + adapter

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod registry;
pub mod rust_backend;

pub use backend::{AdapterError, Dimensions, ImageAdapter, ResizeResult, SourceImage};
pub use calculations::{SizePlan, derive_widths, plan_sizes, scaled_height};
pub use operations::{
    ResizeFailure, TransformError, TransformOutput, TransformRequest, run_transform,
};
pub use params::{
    AdapterOptions, OutputFormat, Quality, ResizeParams, Rotation, parse_hex_color,
};
pub use registry::{AdapterRegistry, UnknownAdapter};
pub use rust_backend::RustAdapter;
