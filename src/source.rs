//! Access to story folders.
//!
//! The compilers only see stories through [`SourceRepository`]: a list of
//! folder names, one timestamp per folder, the raw definition and picture
//! bytes. [`FsSource`] maps that onto a directory tree; [`MemorySource`]
//! keeps everything in memory with explicitly set timestamps, which is what
//! the cache-validity tests drive.
//!
//! ```text
//! <story_root>/
//! └── iceland-2019/
//!     ├── index.xml        # definition; its mtime is the folder timestamp
//!     ├── IMG_0412.jpg
//!     └── IMG_0413.jpg
//! ```

use crate::naming;
use crate::types::Timestamp;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Name of the definition file inside each story folder.
pub const DEFINITION_FILENAME: &str = "index.xml";

/// Extension of original pictures.
pub const PICTURE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Story '{0}' not found")]
    StoryNotFound(String),
    #[error("Picture '{picture}' not found")]
    PictureNotFound { story: String, picture: String },
    #[error("Unable to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read-only view of the story folders.
pub trait SourceRepository: Send + Sync {
    /// Names of every folder holding a story definition, sorted.
    fn list_folders(&self) -> Result<Vec<String>, SourceError>;

    /// Last-modified time of the story's definition.
    fn folder_timestamp(&self, story: &str) -> Result<Timestamp, SourceError>;

    fn read_definition(&self, story: &str) -> Result<Vec<u8>, SourceError>;

    fn read_picture(&self, story: &str, stem: &str) -> Result<Vec<u8>, SourceError>;

    fn picture_exists(&self, story: &str, stem: &str) -> bool;
}

/// Milliseconds since the epoch; times before it clamp to 0.
pub fn system_time_millis(time: SystemTime) -> Timestamp {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

// ============================================================================
// Filesystem
// ============================================================================

/// Stories stored as folders under a root directory.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn story_dir(&self, story: &str) -> Result<PathBuf, SourceError> {
        if !naming::is_valid_story_name(story) {
            return Err(SourceError::StoryNotFound(story.to_string()));
        }
        Ok(self.root.join(story))
    }

    fn picture_path(&self, story: &str, stem: &str) -> Result<PathBuf, SourceError> {
        if !naming::is_valid_picture_name(stem) {
            return Err(SourceError::PictureNotFound {
                story: story.to_string(),
                picture: stem.to_string(),
            });
        }
        Ok(self
            .story_dir(story)?
            .join(format!("{stem}.{PICTURE_EXTENSION}")))
    }
}

impl SourceRepository for FsSource {
    fn list_folders(&self) -> Result<Vec<String>, SourceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            // No story root yet means no stories
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SourceError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SourceError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() && path.join(DEFINITION_FILENAME).is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn folder_timestamp(&self, story: &str) -> Result<Timestamp, SourceError> {
        let path = self.story_dir(story)?.join(DEFINITION_FILENAME);
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|_| SourceError::StoryNotFound(story.to_string()))?;
        Ok(system_time_millis(modified))
    }

    fn read_definition(&self, story: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.story_dir(story)?.join(DEFINITION_FILENAME);
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SourceError::StoryNotFound(story.to_string()),
            _ => SourceError::Io { path, source },
        })
    }

    fn read_picture(&self, story: &str, stem: &str) -> Result<Vec<u8>, SourceError> {
        let path = self.picture_path(story, stem)?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SourceError::PictureNotFound {
                story: story.to_string(),
                picture: stem.to_string(),
            },
            _ => SourceError::Io { path, source },
        })
    }

    fn picture_exists(&self, story: &str, stem: &str) -> bool {
        self.picture_path(story, stem)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }
}

// ============================================================================
// In memory
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MemoryStory {
    timestamp: Timestamp,
    definition: Vec<u8>,
    pictures: HashMap<String, Vec<u8>>,
}

/// Stories held in memory, with timestamps set by the caller.
#[derive(Debug, Default)]
pub struct MemorySource {
    stories: RwLock<BTreeMap<String, MemoryStory>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a story's definition and timestamp. Pictures already
    /// added are kept.
    pub fn put_story(&self, name: &str, timestamp: Timestamp, definition: &str) {
        let mut stories = self.stories.write().unwrap_or_else(PoisonError::into_inner);
        let story = stories.entry(name.to_string()).or_default();
        story.timestamp = timestamp;
        story.definition = definition.as_bytes().to_vec();
    }

    /// Add or replace a picture. Does not change the story timestamp.
    pub fn put_picture(&self, story: &str, stem: &str, bytes: Vec<u8>) {
        let mut stories = self.stories.write().unwrap_or_else(PoisonError::into_inner);
        stories
            .entry(story.to_string())
            .or_default()
            .pictures
            .insert(stem.to_string(), bytes);
    }

    /// Set a story's timestamp, as if its definition had been saved.
    pub fn touch(&self, story: &str, timestamp: Timestamp) {
        let mut stories = self.stories.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(s) = stories.get_mut(story) {
            s.timestamp = timestamp;
        }
    }

    pub fn remove_story(&self, story: &str) {
        let mut stories = self.stories.write().unwrap_or_else(PoisonError::into_inner);
        stories.remove(story);
    }

    fn with_story<R>(
        &self,
        story: &str,
        f: impl FnOnce(&MemoryStory) -> Result<R, SourceError>,
    ) -> Result<R, SourceError> {
        let stories = self.stories.read().unwrap_or_else(PoisonError::into_inner);
        match stories.get(story) {
            Some(s) if !s.definition.is_empty() => f(s),
            _ => Err(SourceError::StoryNotFound(story.to_string())),
        }
    }
}

impl SourceRepository for MemorySource {
    fn list_folders(&self) -> Result<Vec<String>, SourceError> {
        let stories = self.stories.read().unwrap_or_else(PoisonError::into_inner);
        Ok(stories
            .iter()
            .filter(|(_, s)| !s.definition.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn folder_timestamp(&self, story: &str) -> Result<Timestamp, SourceError> {
        self.with_story(story, |s| Ok(s.timestamp))
    }

    fn read_definition(&self, story: &str) -> Result<Vec<u8>, SourceError> {
        self.with_story(story, |s| Ok(s.definition.clone()))
    }

    fn read_picture(&self, story: &str, stem: &str) -> Result<Vec<u8>, SourceError> {
        self.with_story(story, |s| {
            s.pictures
                .get(stem)
                .cloned()
                .ok_or_else(|| SourceError::PictureNotFound {
                    story: story.to_string(),
                    picture: stem.to_string(),
                })
        })
    }

    fn picture_exists(&self, story: &str, stem: &str) -> bool {
        self.with_story(story, |s| Ok(s.pictures.contains_key(stem)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_story(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DEFINITION_FILENAME), "<story/>").unwrap();
    }

    // =========================================================================
    // FsSource
    // =========================================================================

    #[test]
    fn list_folders_only_includes_story_folders() {
        let tmp = TempDir::new().unwrap();
        write_story(tmp.path(), "b-story");
        write_story(tmp.path(), "a-story");
        fs::create_dir_all(tmp.path().join("no-definition")).unwrap();
        fs::write(tmp.path().join("stray.txt"), "x").unwrap();

        let source = FsSource::new(tmp.path());
        assert_eq!(source.list_folders().unwrap(), vec!["a-story", "b-story"]);
    }

    #[test]
    fn list_folders_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let source = FsSource::new(tmp.path().join("nothing-here"));
        assert!(source.list_folders().unwrap().is_empty());
    }

    #[test]
    fn folder_timestamp_of_existing_story() {
        let tmp = TempDir::new().unwrap();
        write_story(tmp.path(), "trip");
        let source = FsSource::new(tmp.path());
        assert!(source.folder_timestamp("trip").unwrap() > 0);
    }

    #[test]
    fn folder_timestamp_missing_or_invalid_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let source = FsSource::new(tmp.path());
        assert!(matches!(
            source.folder_timestamp("nope"),
            Err(SourceError::StoryNotFound(_))
        ));
        assert!(matches!(
            source.folder_timestamp("../etc"),
            Err(SourceError::StoryNotFound(_))
        ));
    }

    #[test]
    fn read_picture_and_exists() {
        let tmp = TempDir::new().unwrap();
        write_story(tmp.path(), "trip");
        fs::write(tmp.path().join("trip/IMG_1.jpg"), b"jpeg").unwrap();
        let source = FsSource::new(tmp.path());

        assert!(source.picture_exists("trip", "IMG_1"));
        assert!(!source.picture_exists("trip", "IMG_2"));
        assert!(!source.picture_exists("trip", "../trip/IMG_1"));
        assert_eq!(source.read_picture("trip", "IMG_1").unwrap(), b"jpeg");
        assert!(matches!(
            source.read_picture("trip", "IMG_2"),
            Err(SourceError::PictureNotFound { .. })
        ));
    }

    // =========================================================================
    // MemorySource
    // =========================================================================

    #[test]
    fn memory_source_roundtrip() {
        let source = MemorySource::new();
        source.put_story("trip", 100, "<story/>");
        source.put_picture("trip", "a", vec![1, 2, 3]);

        assert_eq!(source.list_folders().unwrap(), vec!["trip"]);
        assert_eq!(source.folder_timestamp("trip").unwrap(), 100);
        assert_eq!(source.read_definition("trip").unwrap(), b"<story/>");
        assert_eq!(source.read_picture("trip", "a").unwrap(), vec![1, 2, 3]);
        assert!(source.picture_exists("trip", "a"));

        source.touch("trip", 200);
        assert_eq!(source.folder_timestamp("trip").unwrap(), 200);

        source.remove_story("trip");
        assert!(matches!(
            source.folder_timestamp("trip"),
            Err(SourceError::StoryNotFound(_))
        ));
    }

    #[test]
    fn memory_source_pictures_without_definition_are_not_a_story() {
        let source = MemorySource::new();
        source.put_picture("loose", "a", vec![1]);
        assert!(source.list_folders().unwrap().is_empty());
        assert!(!source.picture_exists("loose", "a"));
    }
}
