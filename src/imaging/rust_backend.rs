//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG) | `image` crate (pure Rust decoder) |
//! | Downscale | `DynamicImage::thumbnail_exact` (area averaging) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | EXIF metadata | custom `exif_parser` (JPEG APP1 + TIFF IFD) |

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::needs_resize;
use super::params::ResizeParams;
use crate::types::PhotoMetadata;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(data: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    // JPEG has no alpha channel; flatten whatever was decoded to RGB8.
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, data: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg)
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {}", e)))?;
        Ok(Dimensions { width, height })
    }

    fn read_metadata(&self, data: &[u8]) -> Option<PhotoMetadata> {
        super::exif_parser::read_exif(data)
    }

    fn resize(&self, params: &ResizeParams<'_>) -> Result<Vec<u8>, BackendError> {
        let img = decode(params.source)?;
        let target = (params.width, params.height);
        let scaled = if needs_resize((img.width(), img.height()), target) {
            img.thumbnail_exact(params.width, params.height)
        } else {
            img
        };
        encode_jpeg(&scaled, params.quality.value() as u8)
    }
}
