//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **EXIF metadata** | custom parser (JPEG APP1 + TIFF IFD) |
//! | **Resize → JPEG** | area-averaging downscale + `JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Size classes, quality and resize descriptions
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub(crate) mod exif_parser;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_within, needs_resize};
pub use params::{Quality, ResizeParams, SizeClass};
pub use rust_backend::RustBackend;
