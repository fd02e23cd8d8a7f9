//! Pure Rust image adapter.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::load_from_memory` (pure Rust decoders) |
//! | Metadata | `image::ImageReader::into_dimensions` (header only, no full decode) |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::backend::{AdapterError, Dimensions, ImageAdapter, ResizeResult};
use super::calculations::scaled_height;
use super::params::{OutputFormat, ResizeParams, Rotation};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

/// Registry identifier of [`RustAdapter`].
pub const IDENTITY: &str = "image";

/// Pure Rust adapter using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustAdapter {
    filter: FilterType,
}

impl RustAdapter {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl Default for RustAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(err: ImageError) -> AdapterError {
    match err {
        ImageError::IoError(io) => AdapterError::Io(io),
        other => AdapterError::Decode(other.to_string()),
    }
}

fn encode_error(format: OutputFormat, err: ImageError) -> AdapterError {
    match err {
        ImageError::Unsupported(e) => AdapterError::UnsupportedFormat(e.to_string()),
        other => AdapterError::ProcessingFailed(format!(
            "{} encode failed: {}",
            format.extension(),
            other
        )),
    }
}

/// Decode an image from memory, guessing the format from its magic bytes.
fn load_image(data: &[u8]) -> Result<DynamicImage, AdapterError> {
    image::load_from_memory(data).map_err(decode_error)
}

fn rotate(img: DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => img,
        Rotation::Cw90 => img.rotate90(),
        Rotation::Cw180 => img.rotate180(),
        Rotation::Cw270 => img.rotate270(),
    }
}

/// Composite every pixel over an opaque background colour.
fn flatten(img: &DynamicImage, background: [u8; 4]) -> DynamicImage {
    let [br, bg, bb, _] = background;
    let rgba = img.to_rgba8();
    let flattened = RgbaImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as u32;
        let blend = |over: u8, under: u8| {
            ((over as u32 * alpha + under as u32 * (255 - alpha)) / 255) as u8
        };
        Rgba([blend(r, br), blend(g, bg), blend(b, bb), 255])
    });
    DynamicImage::ImageRgba8(flattened)
}

/// Encode `img` into an in-memory buffer.
fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, AdapterError> {
    let mut buf = Vec::new();
    let has_alpha = img.color().has_alpha();
    let result = match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new(&mut buf)),
        OutputFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(&mut buf);
            if has_alpha {
                DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
            }
        }
        OutputFormat::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(&mut buf, 6, quality);
            if has_alpha {
                DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
            }
        }
    };
    result.map_err(|e| encode_error(format, e))?;
    Ok(buf)
}

impl ImageAdapter for RustAdapter {
    fn identity(&self) -> &str {
        IDENTITY
    }

    fn metadata(&self, data: &[u8]) -> Result<Dimensions, AdapterError> {
        let (width, height) = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(AdapterError::Io)?
            .into_dimensions()
            .map_err(decode_error)?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, data: &[u8], params: &ResizeParams) -> Result<ResizeResult, AdapterError> {
        let img = rotate(load_image(data)?, params.options.rotation);
        let source = Dimensions {
            width: img.width(),
            height: img.height(),
        };
        let height = scaled_height(source, params.width);
        let resized = img.resize_exact(params.width, height, self.filter);

        let background = match params.options.background {
            Some(color) => Some(color),
            // JPEG has no alpha channel; flatten onto white rather than black.
            None if !params.format.supports_alpha() && resized.color().has_alpha() => {
                Some([255, 255, 255, 255])
            }
            None => None,
        };
        let resized = match background {
            Some(color) => flatten(&resized, color),
            None => resized,
        };

        let quality = params.options.quality.value() as u8;
        let data = encode(&resized, params.format, quality)?;
        Ok(ResizeResult {
            data,
            width: params.width,
            height,
        })
    }
}
