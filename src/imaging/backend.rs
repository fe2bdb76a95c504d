//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the three operations the pipeline
//! needs from an image library: identify, read_metadata and resize. All of
//! them work on bytes already read from the [`SourceRepository`], so the
//! backend never touches story folders itself.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).
//!
//! [`SourceRepository`]: crate::source::SourceRepository

use super::params::ResizeParams;
use crate::types::PhotoMetadata;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to decode image: {0}")]
    Decode(String),
    #[error("Unable to encode image: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Send + Sync` because one backend instance is shared by every request
/// thread and by rayon workers.
pub trait ImageBackend: Send + Sync {
    /// Pixel dimensions of an encoded image.
    fn identify(&self, data: &[u8]) -> Result<Dimensions, BackendError>;

    /// Camera metadata, if any. Absence is not an error.
    fn read_metadata(&self, data: &[u8]) -> Option<PhotoMetadata>;

    /// Decode, scale to exactly `width × height` with an area-averaging
    /// filter (skipped when the size is unchanged) and encode as JPEG.
    fn resize(&self, params: &ResizeParams<'_>) -> Result<Vec<u8>, BackendError>;
}
