//! Types shared between the compiler stages and persisted in cache entries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. Source and cache validity are both
/// expressed in this unit so they compare directly.
pub type Timestamp = i64;

/// Midnight UTC of a declared date, as a [`Timestamp`].
pub fn date_timestamp(date: NaiveDate) -> Timestamp {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// GPS position in signed decimal degrees (north and east positive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsPosition {
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees/minutes/seconds form, e.g. `64°8′49″N 21°56′30″W`.
    pub display: String,
}

/// Camera settings and capture details read from a picture's EXIF block.
///
/// Every field is optional; a picture without EXIF has no `PhotoMetadata`
/// at all rather than an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    /// `yyyy-MM-dd`
    pub capture_date: Option<String>,
    /// `HH:MM:SS`
    pub capture_time: Option<String>,
    /// `f2.8`, `f8`
    pub aperture: Option<String>,
    /// `1/250`, `0.3s`
    pub shutter_speed: Option<String>,
    /// `35mm`
    pub focal_length: Option<String>,
    pub iso: Option<u32>,
    pub gps: Option<GpsPosition>,
}

impl PhotoMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One picture of a compiled story.
///
/// Identity is the stem within its story; `hash` changes whenever the
/// original file's bytes change, which is what keys the renditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureRecord {
    /// Element id in the rendered page (`pic0`, `pic1`, ...).
    pub id: String,
    pub stem: String,
    pub hash: String,
    /// Size of the original in bytes.
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// Cover picture used for the index thumbnail.
    pub index: bool,
    /// Caption markup from the story definition.
    pub caption: Option<String>,
    pub metadata: Option<PhotoMetadata>,
}

/// A story compiled from its definition and pictures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledStory {
    pub name: String,
    /// Source timestamp this compilation was produced from.
    pub last_modified: Timestamp,
    /// Author-declared date, distinct from the filesystem timestamp.
    pub date: Option<NaiveDate>,
    pub title: String,
    /// Description markup, passed through from the definition.
    pub description: String,
    /// Rendered story body.
    pub content: String,
    /// Pictures in declaration order. Exactly one has `index` set.
    pub pictures: Vec<PictureRecord>,
}

impl CompiledStory {
    /// The cover picture.
    pub fn index_picture(&self) -> Option<&PictureRecord> {
        self.pictures.iter().find(|p| p.index)
    }

    /// Look up a picture by stem.
    pub fn picture(&self, stem: &str) -> Option<&PictureRecord> {
        self.pictures.iter().find(|p| p.stem == stem)
    }

    /// Sort key for the index: declared date if present, else the source
    /// timestamp.
    pub fn effective_date(&self) -> Timestamp {
        self.date.map(date_timestamp).unwrap_or(self.last_modified)
    }
}
