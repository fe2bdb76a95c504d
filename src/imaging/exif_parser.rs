//! Minimal EXIF reader for JPEG files.
//!
//! Reads only the fields shown next to a picture: capture date/time,
//! aperture, shutter speed, focal length, ISO and GPS position. Everything
//! is best-effort: truncated segments, unknown byte orders and missing
//! tags all degrade to `None` instead of an error.
//!
//! ## Where the data lives
//!
//! ```text
//! JPEG APP1 (0xFFE1) "Exif\0\0"
//! └── TIFF header (II/MM, 42, offset of IFD0)
//!     └── IFD0
//!         ├── 0x8769 → Exif IFD (DateTimeOriginal, ApertureValue, ...)
//!         └── 0x8825 → GPS IFD (latitude/longitude + refs)
//! ```

use crate::types::{GpsPosition, PhotoMetadata};

const EXIF_HEADER: &[u8] = b"Exif\0\0";

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;

const TAG_EXPOSURE_TIME: u16 = 0x829A;
const TAG_F_NUMBER: u16 = 0x829D;
const TAG_ISO: u16 = 0x8827;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_APERTURE_VALUE: u16 = 0x9202;
const TAG_FOCAL_LENGTH: u16 = 0x920A;

const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LATITUDE: u16 = 0x0002;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_LONGITUDE: u16 = 0x0004;

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

/// Read photo metadata from JPEG bytes. Returns `None` when the file has no
/// EXIF block or none of the interesting fields.
pub fn read_exif(data: &[u8]) -> Option<PhotoMetadata> {
    let tiff = Tiff::new(find_jpeg_app1_exif(data)?)?;
    let ifd0 = tiff.entries(tiff.first_ifd()?)?;

    let mut result = PhotoMetadata::default();

    if let Some(exif) = find(&ifd0, TAG_EXIF_IFD).and_then(|e| tiff.long(e)) {
        let entries = tiff.entries(exif as usize).unwrap_or_default();
        read_exif_ifd(&tiff, &entries, &mut result);
    }

    if let Some(gps) = find(&ifd0, TAG_GPS_IFD).and_then(|e| tiff.long(e)) {
        let entries = tiff.entries(gps as usize).unwrap_or_default();
        result.gps = read_gps_ifd(&tiff, &entries);
    }

    if result.is_empty() { None } else { Some(result) }
}

fn read_exif_ifd(tiff: &Tiff<'_>, entries: &[Entry], out: &mut PhotoMetadata) {
    if let Some(raw) = find(entries, TAG_DATE_TIME_ORIGINAL).and_then(|e| tiff.ascii(e)) {
        // "YYYY:MM:DD HH:MM:SS", some cameras pad with NULs
        let cleaned: String = raw.chars().filter(|&c| c != '\0').collect();
        if cleaned.len() == 19 && cleaned.is_ascii() {
            out.capture_date = Some(cleaned[..10].replace(':', "-"));
            out.capture_time = Some(cleaned[11..].to_string());
        }
    }

    if let Some(apex) = find(entries, TAG_APERTURE_VALUE).and_then(|e| tiff.rational(e, 0)) {
        out.aperture = Some(format_aperture(std::f64::consts::SQRT_2.powf(apex)));
    } else if let Some(f) = find(entries, TAG_F_NUMBER).and_then(|e| tiff.rational(e, 0)) {
        out.aperture = Some(format_aperture(f));
    }

    if let Some(t) = find(entries, TAG_EXPOSURE_TIME).and_then(|e| tiff.rational(e, 0)) {
        out.shutter_speed = format_shutter_speed(t);
    }

    if let Some(mm) = find(entries, TAG_FOCAL_LENGTH).and_then(|e| tiff.rational(e, 0)) {
        out.focal_length = Some(format!("{}mm", mm.round() as i64));
    }

    if let Some(iso) = find(entries, TAG_ISO).and_then(|e| tiff.long(e)) {
        out.iso = Some(iso);
    }
}

fn read_gps_ifd(tiff: &Tiff<'_>, entries: &[Entry]) -> Option<GpsPosition> {
    let lat = degrees(tiff, find(entries, TAG_GPS_LATITUDE)?)?;
    let lon = degrees(tiff, find(entries, TAG_GPS_LONGITUDE)?)?;
    let lat_ref = find(entries, TAG_GPS_LATITUDE_REF).and_then(|e| tiff.ascii(e));
    let lon_ref = find(entries, TAG_GPS_LONGITUDE_REF).and_then(|e| tiff.ascii(e));

    let latitude = round10(if lat_ref.as_deref() == Some("S") { -lat } else { lat });
    let longitude = round10(if lon_ref.as_deref() == Some("W") { -lon } else { lon });

    Some(GpsPosition {
        latitude,
        longitude,
        display: format!(
            "{} {}",
            position_string(latitude, 'N', 'S'),
            position_string(longitude, 'E', 'W')
        ),
    })
}

/// Degrees/minutes/seconds rationals to decimal degrees.
fn degrees(tiff: &Tiff<'_>, entry: &Entry) -> Option<f64> {
    let d = tiff.rational(entry, 0)?;
    let m = tiff.rational(entry, 1).unwrap_or(0.0);
    let s = tiff.rational(entry, 2).unwrap_or(0.0);
    Some(d + m / 60.0 + s / 3600.0)
}

fn round10(value: f64) -> f64 {
    (value * 1e10).round() / 1e10
}

// ---------------------------------------------------------------------------
// Display formatting
// ---------------------------------------------------------------------------

/// `f2.8`, `f8`: one decimal, trailing `.0` dropped.
pub(crate) fn format_aperture(f_number: f64) -> String {
    let rounded = (f_number * 10.0).round() / 10.0;
    format!("f{rounded}")
}

/// `1/250` when the reciprocal is a whole number, else seconds (`0.3s`, `2s`).
pub(crate) fn format_shutter_speed(seconds: f64) -> Option<String> {
    if seconds <= 0.0 || !seconds.is_finite() {
        return None;
    }
    let inverse = 1.0 / seconds;
    if (inverse - inverse.round()).abs() < 0.001 {
        Some(format!("1/{}", inverse.round() as i64))
    } else {
        Some(format!("{seconds}s"))
    }
}

/// `64°8′49″N`
pub(crate) fn position_string(position: f64, positive: char, negative: char) -> String {
    let letter = if position >= 0.0 { positive } else { negative };
    let mut rest = position.abs();
    let degrees = rest.floor();
    rest = (rest - degrees) * 60.0;
    let minutes = rest.floor();
    rest = (rest - minutes) * 60.0;
    let seconds = rest.floor();
    format!(
        "{}\u{b0}{}\u{2032}{}\u{2033}{}",
        degrees as i64, minutes as i64, seconds as i64, letter
    )
}

// ---------------------------------------------------------------------------
// JPEG: locate the APP1 Exif segment
// ---------------------------------------------------------------------------

/// Return the TIFF structure inside the first APP1 segment that starts with
/// the `Exif\0\0` header.
fn find_jpeg_app1_exif(data: &[u8]) -> Option<&[u8]> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill bytes between markers
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // SOS (0xDA) means image data starts, EOI ends the file
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        // Markers without length field
        if (0xD0..=0xD7).contains(&marker) || marker == 0x01 {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if len < 2 {
            return None;
        }
        let seg_start = pos + 4;
        let seg_end = (pos + 2 + len).min(data.len());
        if marker == 0xE1 && seg_start <= seg_end {
            let segment = &data[seg_start..seg_end];
            if let Some(tiff) = segment.strip_prefix(EXIF_HEADER) {
                return Some(tiff);
            }
        }
        pos += 2 + len;
    }
    None
}

// ---------------------------------------------------------------------------
// TIFF: IFD walking with bounds-checked reads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Entry {
    tag: u16,
    typ: u16,
    count: u32,
    /// Offset of the 4-byte value/offset field within the TIFF data.
    value_pos: usize,
}

struct Tiff<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> Tiff<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        let big_endian = match data.get(0..2)? {
            b"MM" => true,
            b"II" => false,
            _ => return None,
        };
        let tiff = Self { data, big_endian };
        // TIFF magic
        if tiff.u16_at(2)? != 42 {
            return None;
        }
        Some(tiff)
    }

    fn first_ifd(&self) -> Option<usize> {
        self.u32_at(4).map(|o| o as usize)
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.data.get(offset..offset + 2)?;
        Some(if self.big_endian {
            u16::from_be_bytes([b[0], b[1]])
        } else {
            u16::from_le_bytes([b[0], b[1]])
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let b = self.data.get(offset..offset + 4)?;
        Some(if self.big_endian {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn entries(&self, ifd_offset: usize) -> Option<Vec<Entry>> {
        let count = self.u16_at(ifd_offset)? as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let pos = ifd_offset + 2 + i * 12;
            entries.push(Entry {
                tag: self.u16_at(pos)?,
                typ: self.u16_at(pos + 2)?,
                count: self.u32_at(pos + 4)?,
                value_pos: pos + 8,
            });
        }
        Some(entries)
    }

    /// SHORT or LONG scalar.
    fn long(&self, entry: &Entry) -> Option<u32> {
        match entry.typ {
            TYPE_SHORT => self.u16_at(entry.value_pos).map(u32::from),
            TYPE_LONG => self.u32_at(entry.value_pos),
            _ => None,
        }
    }

    fn ascii(&self, entry: &Entry) -> Option<String> {
        if entry.typ != TYPE_ASCII {
            return None;
        }
        let len = entry.count as usize;
        let start = if len <= 4 {
            entry.value_pos
        } else {
            self.u32_at(entry.value_pos)? as usize
        };
        let bytes = self.data.get(start..start.checked_add(len)?)?;
        let text = String::from_utf8_lossy(bytes);
        Some(text.trim_end_matches('\0').trim().to_string())
    }

    /// The `index`-th unsigned rational of an entry, as a float.
    fn rational(&self, entry: &Entry, index: u32) -> Option<f64> {
        if entry.typ != TYPE_RATIONAL || index >= entry.count {
            return None;
        }
        let base = self.u32_at(entry.value_pos)? as usize + index as usize * 8;
        let num = self.u32_at(base)?;
        let den = self.u32_at(base + 4)?;
        if den == 0 {
            return None;
        }
        Some(num as f64 / den as f64)
    }
}

fn find(entries: &[Entry], tag: u16) -> Option<&Entry> {
    entries.iter().find(|e| e.tag == tag)
}
