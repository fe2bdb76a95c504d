//! Parameter types for image operations.
//!
//! These describe *what* to produce, not *how*. The renderer decides the
//! target box and the backend does the pixel work, which lets tests swap
//! in a mock backend without changing any sizing logic.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 75). Clamped on construction.
//! - [`SizeClass`]: the fixed set of rendition widths, each capped at a 4:3 height.
//! - [`ResizeParams`]: source bytes, exact output dimensions and quality for one rendition.

use std::fmt;

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(75)
    }
}

/// Rendition size classes. The box for each is `width × width·3/4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeClass {
    W800,
    W600,
    W400,
    W300,
    W200,
    W100,
}

impl SizeClass {
    /// Every size class, largest first.
    pub const ALL: [SizeClass; 6] = [
        SizeClass::W800,
        SizeClass::W600,
        SizeClass::W400,
        SizeClass::W300,
        SizeClass::W200,
        SizeClass::W100,
    ];

    /// Size used for index thumbnails.
    pub const THUMBNAIL: SizeClass = SizeClass::W100;

    pub fn max_width(self) -> u32 {
        match self {
            SizeClass::W800 => 800,
            SizeClass::W600 => 600,
            SizeClass::W400 => 400,
            SizeClass::W300 => 300,
            SizeClass::W200 => 200,
            SizeClass::W100 => 100,
        }
    }

    pub fn max_height(self) -> u32 {
        self.max_width() * 3 / 4
    }

    /// `(max_width, max_height)`
    pub fn bounds(self) -> (u32, u32) {
        (self.max_width(), self.max_height())
    }

    /// Lowercase label used in rendition filenames (`w800`).
    pub fn label(self) -> &'static str {
        match self {
            SizeClass::W800 => "w800",
            SizeClass::W600 => "w600",
            SizeClass::W400 => "w400",
            SizeClass::W300 => "w300",
            SizeClass::W200 => "w200",
            SizeClass::W100 => "w100",
        }
    }

    /// Parse a label, ignoring case (`w600`, `W600`).
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parameters for one resize-and-encode operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams<'a> {
    /// Encoded original.
    pub source: &'a [u8],
    /// Exact output width.
    pub width: u32,
    /// Exact output height.
    pub height: u32,
    pub quality: Quality,
}
