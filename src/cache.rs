//! Disk cache for compiled stories, the site index and picture renditions.
//!
//! # Layout
//!
//! ```text
//! <cache_root>/
//! ├── index.cache                          # aggregated index (JSON)
//! └── <story>/
//!     ├── story.cache                      # compiled story (JSON)
//!     ├── IMG_0412.3fa9c01b.w800.jpg       # renditions: stem.hash.size.jpg
//!     └── IMG_0412.3fa9c01b.w100.jpg
//! ```
//!
//! Story and index entries are keyed by identity, not content, and carry
//! the timestamp they are valid for. Renditions are keyed by the picture's
//! content hash, so a changed picture gets a new file and old ones are
//! never served for new content.
//!
//! # Entries
//!
//! JSON entries are wrapped in an envelope carrying [`CACHE_VERSION`].
//! Loading returns `None` when the file is missing, unparseable or from a
//! different version: any of those is simply a miss, and the next store
//! overwrites it.
//!
//! # Writes
//!
//! Every write goes to a uniquely named temporary sibling and is renamed
//! into place, so a reader sees either the old file, the new file, or no
//! file, never a partial one.

use crate::imaging::SizeClass;
use crate::naming;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Version of the cache entry format. Bump this to invalidate every
/// existing story and index entry when the format changes.
pub const CACHE_VERSION: u32 = 1;

const STORY_FILENAME: &str = "story.cache";
const INDEX_FILENAME: &str = "index.cache";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unable to create cache folder '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to write cache file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unable to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    entry: &'a T,
}

#[derive(serde::Deserialize)]
struct Envelope<T> {
    version: u32,
    entry: T,
}

/// Handle on the cache directory. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn story_dir(&self, story: &str) -> PathBuf {
        self.root.join(story)
    }

    pub fn story_path(&self, story: &str) -> PathBuf {
        self.story_dir(story).join(STORY_FILENAME)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILENAME)
    }

    pub fn rendition_path(&self, story: &str, stem: &str, hash: &str, size: SizeClass) -> PathBuf {
        self.story_dir(story)
            .join(naming::rendition_filename(stem, hash, size.label()))
    }

    /// Create the per-story cache folder if it does not exist yet.
    pub fn ensure_story_dir(&self, story: &str) -> Result<PathBuf, StorageError> {
        let dir = self.story_dir(story);
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(dir)
    }

    /// Read a versioned JSON entry. Any failure is a miss.
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let content = fs::read(path).ok()?;
        let envelope: Envelope<T> = match serde_json::from_slice(&content) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "discarding unreadable cache entry");
                return None;
            }
        };
        if envelope.version != CACHE_VERSION {
            tracing::debug!(
                path = %path.display(),
                found = envelope.version,
                expected = CACHE_VERSION,
                "discarding cache entry from another version"
            );
            return None;
        }
        Some(envelope.entry)
    }

    /// Serialize `entry` and atomically replace the file at `path`.
    pub fn store<T: Serialize>(&self, path: &Path, entry: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec(&EnvelopeRef {
            version: CACHE_VERSION,
            entry,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_atomic(path, &json)
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn tmp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

/// Write `bytes` to a temporary sibling of `dest`, then rename it over
/// `dest`. On failure the temporary file is removed and `dest` is left as
/// it was.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = tmp_path_for(dest);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, dest)
    })();
    result.map_err(|source| {
        let _ = fs::remove_file(&tmp);
        StorageError::Write {
            path: dest.to_path_buf(),
            source,
        }
    })
}

/// Short content hash: the first eight hex digits of the SHA-256 digest.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = format!("{:x}", digest);
    hex.truncate(naming::HASH_LEN);
    hex
}

/// Hit/miss counters, safe to bump from many threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.hits() + self.misses()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits() > 0 {
            write!(
                f,
                "{} cached, {} generated ({} total)",
                self.hits(),
                self.misses(),
                self.total()
            )
        } else {
            write!(f, "{} generated", self.misses())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        stamp: i64,
        name: String,
    }

    fn entry() -> Entry {
        Entry {
            stamp: 42,
            name: "trip".into(),
        }
    }

    // =========================================================================
    // Paths
    // =========================================================================

    #[test]
    fn layout_paths() {
        let cache = DiskCache::new("/c");
        assert_eq!(cache.story_path("trip"), PathBuf::from("/c/trip/story.cache"));
        assert_eq!(cache.index_path(), PathBuf::from("/c/index.cache"));
        assert_eq!(
            cache.rendition_path("trip", "IMG_1", "0123abcd", SizeClass::W600),
            PathBuf::from("/c/trip/IMG_1.0123abcd.w600.jpg")
        );
    }

    #[test]
    fn ensure_story_dir_creates_folder() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        let dir = cache.ensure_story_dir("trip").unwrap();
        assert!(dir.is_dir());
        // Idempotent
        cache.ensure_story_dir("trip").unwrap();
    }

    #[test]
    fn ensure_story_dir_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("not-a-dir");
        fs::write(&root, "x").unwrap();
        let cache = DiskCache::new(&root);
        assert!(matches!(
            cache.ensure_story_dir("trip"),
            Err(StorageError::CreateDir { .. })
        ));
    }

    // =========================================================================
    // Store / load
    // =========================================================================

    #[test]
    fn store_then_load() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        let path = cache.story_path("trip");
        cache.store(&path, &entry()).unwrap();
        assert_eq!(cache.load::<Entry>(&path), Some(entry()));
    }

    #[test]
    fn load_missing_file_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        assert_eq!(cache.load::<Entry>(&cache.index_path()), None);
    }

    #[test]
    fn load_corrupt_json_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        fs::write(cache.index_path(), "not json").unwrap();
        assert_eq!(cache.load::<Entry>(&cache.index_path()), None);
    }

    #[test]
    fn load_wrong_version_is_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        let json = format!(
            r#"{{"version": {}, "entry": {{"stamp": 1, "name": "x"}}}}"#,
            CACHE_VERSION + 1
        );
        fs::write(cache.index_path(), json).unwrap();
        assert_eq!(cache.load::<Entry>(&cache.index_path()), None);
    }

    #[test]
    fn store_overwrites_existing_entry() {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::new(tmp.path());
        let path = cache.index_path();
        cache.store(&path, &entry()).unwrap();
        let newer = Entry {
            stamp: 99,
            name: "trip".into(),
        };
        cache.store(&path, &newer).unwrap();
        assert_eq!(cache.load::<Entry>(&path), Some(newer));
    }

    // =========================================================================
    // Atomic writes
    // =========================================================================

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("a.jpg");
        write_atomic(&dest, b"jpeg").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"jpeg");
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn write_atomic_failure_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("missing-dir").join("a.jpg");
        assert!(matches!(
            write_atomic(&dest, b"jpeg"),
            Err(StorageError::Write { .. })
        ));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    // =========================================================================
    // Hashing and stats
    // =========================================================================

    #[test]
    fn hash_bytes_is_short_and_stable() {
        let h1 = hash_bytes(b"hello world");
        let h2 = hash_bytes(b"hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1, "b94d27b9");
        assert!(naming::is_valid_hash(&h1));
    }

    #[test]
    fn hash_bytes_changes_with_content() {
        assert_ne!(hash_bytes(b"version 1"), hash_bytes(b"version 2"));
    }

    #[test]
    fn cache_stats_display_with_hits() {
        let s = CacheStats::default();
        for _ in 0..5 {
            s.hit();
        }
        s.miss();
        s.miss();
        assert_eq!(format!("{}", s), "5 cached, 2 generated (7 total)");
    }

    #[test]
    fn cache_stats_display_no_hits() {
        let s = CacheStats::default();
        s.miss();
        assert_eq!(format!("{}", s), "1 generated");
    }
}
