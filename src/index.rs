//! Site index.
//!
//! The index lists every story folder, newest first, with its cover
//! thumbnail, or an error line when the story does not compile. It is
//! cached at three levels:
//!
//! - **Memory**: the last page built is reused for `memory_ttl` without
//!   looking at the disk at all.
//! - **Disk**: `<cache>/index.cache` records the latest folder timestamp it
//!   was built from and the set of folders it covers. It stays valid while
//!   no folder is newer and none was added or removed.
//! - **Per story**: a rebuild revisits every folder, but unchanged stories
//!   come straight from their own cache entries.
//!
//! A story that fails to compile becomes a [`FolderEntry::Error`]; only
//! failures of the index itself (listing folders, rendering, storing)
//! fail the build.

use crate::cache::{CacheStats, DiskCache, StorageError};
use crate::error::{self, Categorized, Status};
use crate::imaging::SizeClass;
use crate::naming;
use crate::source::{SourceError, SourceRepository};
use crate::story::StoryCompiler;
use crate::template::{IndexView, TemplateError, Templates};
use crate::types::{CompiledStory, Timestamp, date_timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Unable to list stories: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Categorized for IndexError {
    fn status(&self) -> Status {
        Status::Internal
    }
}

/// Cover thumbnail reference. Dimensions are those of the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Relative to the site root: `<story>/<stem>.<hash>.w100.jpg`.
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// One line of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FolderEntry {
    Story {
        name: String,
        /// Source timestamp of the compiled story.
        updated: Timestamp,
        date: Option<NaiveDate>,
        title: String,
        /// Description markup.
        description: String,
        thumbnail: Thumbnail,
    },
    Error {
        name: String,
        /// Timestamp of the story's definition.
        updated: Timestamp,
        message: String,
    },
}

impl FolderEntry {
    fn from_story(story: &CompiledStory) -> Self {
        let Some(cover) = story.index_picture() else {
            return FolderEntry::Error {
                name: story.name.clone(),
                updated: story.last_modified,
                message: "Story has no pictures".to_string(),
            };
        };
        FolderEntry::Story {
            name: story.name.clone(),
            updated: story.last_modified,
            date: story.date,
            title: story.title.clone(),
            description: story.description.clone(),
            thumbnail: Thumbnail {
                url: format!(
                    "{}/{}",
                    story.name,
                    naming::rendition_filename(
                        &cover.stem,
                        &cover.hash,
                        SizeClass::THUMBNAIL.label()
                    )
                ),
                width: cover.width,
                height: cover.height,
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FolderEntry::Story { name, .. } | FolderEntry::Error { name, .. } => name,
        }
    }

    pub fn updated(&self) -> Timestamp {
        match self {
            FolderEntry::Story { updated, .. } | FolderEntry::Error { updated, .. } => *updated,
        }
    }

    /// Declared date if present, else the source timestamp.
    pub fn effective_date(&self) -> Timestamp {
        match self {
            FolderEntry::Story {
                date: Some(date), ..
            } => date_timestamp(*date),
            _ => self.updated(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FolderEntry::Error { .. })
    }
}

/// Newest effective date first, then by name.
pub fn sort_entries(entries: &mut [FolderEntry]) {
    entries.sort_by(|a, b| {
        b.effective_date()
            .cmp(&a.effective_date())
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// All index entries in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub entries: Vec<FolderEntry>,
}

impl IndexSummary {
    pub fn new(mut entries: Vec<FolderEntry>) -> Self {
        sort_entries(&mut entries);
        Self { entries }
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A built index: the summary and its rendered body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPage {
    /// Latest folder timestamp this page was built from.
    pub valid_as_of: Timestamp,
    /// Folders covered, sorted.
    pub folders: Vec<String>,
    pub summary: IndexSummary,
    pub html: String,
}

/// Progress of an index rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEvent {
    Started { total: usize },
    /// About to process `name`; `position` counts from 1.
    Folder {
        name: String,
        position: usize,
        total: usize,
    },
    Finished { entries: usize, errors: usize },
}

fn notify(progress: Option<&Sender<IndexEvent>>, event: IndexEvent) {
    if let Some(tx) = progress {
        // Nobody listening is fine
        let _ = tx.send(event);
    }
}

struct Remembered {
    built_at: Instant,
    page: Arc<IndexPage>,
}

pub struct IndexCompiler {
    source: Arc<dyn SourceRepository>,
    compiler: Arc<StoryCompiler>,
    templates: Arc<dyn Templates>,
    cache: DiskCache,
    memory_ttl: Duration,
    memory: Mutex<Option<Remembered>>,
    building: Mutex<()>,
    stats: CacheStats,
}

impl IndexCompiler {
    pub fn new(
        source: Arc<dyn SourceRepository>,
        compiler: Arc<StoryCompiler>,
        templates: Arc<dyn Templates>,
        cache: DiskCache,
        memory_ttl: Duration,
    ) -> Self {
        Self {
            source,
            compiler,
            templates,
            cache,
            memory_ttl,
            memory: Mutex::new(None),
            building: Mutex::new(()),
            stats: CacheStats::default(),
        }
    }

    /// Disk hits and rebuilds so far. Memory hits are not counted.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn memory(&self) -> MutexGuard<'_, Option<Remembered>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remembered(&self) -> Option<Arc<IndexPage>> {
        self.memory()
            .as_ref()
            .filter(|r| r.built_at.elapsed() < self.memory_ttl)
            .map(|r| Arc::clone(&r.page))
    }

    fn remember(&self, page: &Arc<IndexPage>) {
        *self.memory() = Some(Remembered {
            built_at: Instant::now(),
            page: Arc::clone(page),
        });
    }

    /// The current index page.
    ///
    /// `force` skips the memory and disk layers and recompiles every story.
    /// Events are sent to `progress` only when folders are actually visited.
    pub fn build(
        &self,
        force: bool,
        progress: Option<&Sender<IndexEvent>>,
    ) -> Result<Arc<IndexPage>, IndexError> {
        if !force && let Some(page) = self.remembered() {
            return Ok(page);
        }

        let _building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
        // A build that finished while we waited is as good as ours
        if !force && let Some(page) = self.remembered() {
            return Ok(page);
        }

        let mut stamped = Vec::new();
        for name in self.source.list_folders()? {
            match self.source.folder_timestamp(&name) {
                Ok(ts) => stamped.push((name, ts)),
                Err(e) => warn!(folder = %name, error = %e, "skipping folder"),
            }
        }
        let latest = stamped.iter().map(|(_, ts)| *ts).max().unwrap_or(0);
        let folders: Vec<String> = stamped.iter().map(|(name, _)| name.clone()).collect();

        let path = self.cache.index_path();
        if !force
            && let Some(stored) = self.cache.load::<IndexPage>(&path)
            && stored.valid_as_of >= latest
            && stored.folders == folders
        {
            self.stats.hit();
            debug!(stories = folders.len(), "index cache hit");
            let page = Arc::new(stored);
            self.remember(&page);
            return Ok(page);
        }

        self.stats.miss();
        let total = stamped.len();
        info!(stories = total, force, "rebuilding index");
        notify(progress, IndexEvent::Started { total });

        let mut entries = Vec::with_capacity(total);
        for (i, (name, updated)) in stamped.into_iter().enumerate() {
            notify(
                progress,
                IndexEvent::Folder {
                    name: name.clone(),
                    position: i + 1,
                    total,
                },
            );
            entries.push(self.folder_entry(name, updated, force));
        }

        let summary = IndexSummary::new(entries);
        let html = self.templates.render_index(&IndexView {
            entries: &summary.entries,
        })?;
        let page = IndexPage {
            valid_as_of: latest,
            folders,
            summary,
            html,
        };
        self.cache.store(&path, &page)?;

        notify(
            progress,
            IndexEvent::Finished {
                entries: page.summary.len(),
                errors: page.summary.error_count(),
            },
        );
        let page = Arc::new(page);
        self.remember(&page);
        Ok(page)
    }

    fn folder_entry(&self, name: String, updated: Timestamp, force: bool) -> FolderEntry {
        match self.compiler.compile(&name, updated, force) {
            Ok(story) => FolderEntry::from_story(&story),
            Err(e) => {
                warn!(story = %name, error = %error::chain(&e), "story failed to compile");
                FolderEntry::Error {
                    name,
                    updated,
                    message: e.public_message(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, fake_picture};
    use crate::source::MemorySource;
    use crate::story::tests::add_story;
    use crate::template::{MaudTemplates, StoryView};
    use std::sync::mpsc;
    use tempfile::TempDir;

    const TTL_NONE: Duration = Duration::ZERO;

    struct Fixture {
        _tmp: TempDir,
        source: Arc<MemorySource>,
        compiler: Arc<StoryCompiler>,
        index: IndexCompiler,
    }

    fn fixture_with(ttl: Duration, templates: Arc<dyn Templates>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let source = Arc::new(MemorySource::new());
        let cache = DiskCache::new(tmp.path());
        let compiler = Arc::new(StoryCompiler::new(
            source.clone(),
            Arc::new(MockBackend::new()),
            cache.clone(),
            Arc::new(MaudTemplates::default()),
        ));
        let index = IndexCompiler::new(source.clone(), compiler.clone(), templates, cache, ttl);
        Fixture {
            _tmp: tmp,
            source,
            compiler,
            index,
        }
    }

    fn fixture(ttl: Duration) -> Fixture {
        fixture_with(ttl, Arc::new(MaudTemplates::default()))
    }

    fn add_dated_story(source: &MemorySource, name: &str, timestamp: Timestamp, date: &str) {
        source.put_story(
            name,
            timestamp,
            &format!(
                r#"<story date="{date}"><title>{name}</title><description/><pic src="a"/></story>"#
            ),
        );
        source.put_picture(name, "a", fake_picture(800, 600, name));
    }

    fn names(page: &IndexPage) -> Vec<&str> {
        page.summary.entries.iter().map(|e| e.name()).collect()
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn newest_first_then_by_name() {
        let f = fixture(TTL_NONE);
        add_dated_story(&f.source, "c", 1, "2020-01-01");
        add_dated_story(&f.source, "a", 1, "2021-06-01");
        add_dated_story(&f.source, "b", 1, "2021-06-01");

        let page = f.index.build(false, None).unwrap();
        assert_eq!(names(&page), vec!["a", "b", "c"]);
    }

    #[test]
    fn undated_story_sorts_by_timestamp() {
        let f = fixture(TTL_NONE);
        // 2021-06-01 is 1_622_505_600_000
        add_dated_story(&f.source, "dated", 1, "2021-06-01");
        add_story(&f.source, "newer", 1_700_000_000_000, &["a"]);
        add_story(&f.source, "older", 1_500_000_000_000, &["a"]);

        let page = f.index.build(false, None).unwrap();
        assert_eq!(names(&page), vec!["newer", "dated", "older"]);
    }

    #[test]
    fn sort_entries_orders_errors_by_timestamp() {
        let mut entries = vec![
            FolderEntry::Error {
                name: "x".into(),
                updated: 5,
                message: String::new(),
            },
            FolderEntry::Error {
                name: "y".into(),
                updated: 9,
                message: String::new(),
            },
        ];
        sort_entries(&mut entries);
        assert_eq!(entries[0].name(), "y");
    }

    // =========================================================================
    // Entries
    // =========================================================================

    #[test]
    fn story_entry_points_at_cover_thumbnail() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "trip", 7, &["a", "b"]);

        let page = f.index.build(false, None).unwrap();
        let FolderEntry::Story {
            thumbnail, updated, ..
        } = &page.summary.entries[0]
        else {
            panic!("expected a story entry");
        };
        let hash = crate::cache::hash_bytes(&fake_picture(800, 600, "a"));
        assert_eq!(thumbnail.url, format!("trip/a.{hash}.w100.jpg"));
        assert_eq!((thumbnail.width, thumbnail.height), (800, 600));
        assert_eq!(*updated, 7);
        assert!(page.html.contains(&thumbnail.url));
    }

    #[test]
    fn broken_story_becomes_error_entry() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "good-one", 1, &["a"]);
        add_story(&f.source, "good-two", 2, &["a"]);
        f.source
            .put_story("broken", 3, "<story><description/><pic src=\"a\"/></story>");

        let page = f.index.build(false, None).unwrap();

        assert_eq!(page.summary.len(), 3);
        assert_eq!(page.summary.error_count(), 1);
        let broken = page
            .summary
            .entries
            .iter()
            .find(|e| e.name() == "broken")
            .unwrap();
        assert_eq!(
            broken,
            &FolderEntry::Error {
                name: "broken".into(),
                updated: 3,
                message: "Story 'broken' is malformed: Expected exactly one title, found 0"
                    .into(),
            }
        );
        assert!(page.html.contains("Expected exactly one title, found 0"));
    }

    // =========================================================================
    // Cache validity
    // =========================================================================

    #[test]
    fn unchanged_folders_reuse_disk_entry() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "one", 1, &["a"]);
        add_story(&f.source, "two", 2, &["a"]);

        let first = f.index.build(false, None).unwrap();
        let compiles = f.compiler.stats().total();
        let second = f.index.build(false, None).unwrap();

        assert_eq!(first, second);
        assert_eq!(f.index.stats().hits(), 1);
        assert_eq!(f.compiler.stats().total(), compiles);
    }

    #[test]
    fn newer_folder_rebuilds_but_only_recompiles_it() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "one", 1, &["a"]);
        add_story(&f.source, "two", 2, &["a"]);
        f.index.build(false, None).unwrap();

        f.source.touch("one", 10);
        let page = f.index.build(false, None).unwrap();

        assert_eq!(f.index.stats().misses(), 2);
        assert_eq!(f.compiler.stats().misses(), 3);
        assert_eq!(f.compiler.stats().hits(), 1);
        assert_eq!(page.valid_as_of, 10);
    }

    #[test]
    fn removed_folder_rebuilds() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "one", 1, &["a"]);
        add_story(&f.source, "two", 2, &["a"]);
        f.index.build(false, None).unwrap();

        f.source.remove_story("two");
        let page = f.index.build(false, None).unwrap();

        assert_eq!(names(&page), vec!["one"]);
        assert_eq!(f.index.stats().misses(), 2);
    }

    #[test]
    fn force_rebuilds_everything() {
        let f = fixture(Duration::from_secs(60));
        add_story(&f.source, "one", 1, &["a"]);
        f.index.build(false, None).unwrap();
        f.index.build(true, None).unwrap();

        assert_eq!(f.index.stats().misses(), 2);
        assert_eq!(f.compiler.stats().misses(), 2);
    }

    #[test]
    fn memory_layer_skips_disk_within_ttl() {
        let f = fixture(Duration::from_secs(60));
        add_story(&f.source, "one", 1, &["a"]);

        let first = f.index.build(false, None).unwrap();
        f.source.touch("one", 99);
        let second = f.index.build(false, None).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.index.stats().total(), 1);
    }

    #[test]
    fn empty_source_builds_empty_index() {
        let f = fixture(TTL_NONE);
        let page = f.index.build(false, None).unwrap();
        assert!(page.summary.is_empty());
        assert_eq!(page.valid_as_of, 0);
    }

    // =========================================================================
    // Progress
    // =========================================================================

    #[test]
    fn progress_reports_each_folder() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "a", 1, &["a"]);
        add_story(&f.source, "b", 1, &["a"]);
        f.source.put_story("c", 1, "<story/>");

        let (tx, rx) = mpsc::channel();
        f.index.build(false, Some(&tx)).unwrap();
        drop(tx);
        let events: Vec<_> = rx.iter().collect();

        assert_eq!(
            events,
            vec![
                IndexEvent::Started { total: 3 },
                IndexEvent::Folder {
                    name: "a".into(),
                    position: 1,
                    total: 3
                },
                IndexEvent::Folder {
                    name: "b".into(),
                    position: 2,
                    total: 3
                },
                IndexEvent::Folder {
                    name: "c".into(),
                    position: 3,
                    total: 3
                },
                IndexEvent::Finished {
                    entries: 3,
                    errors: 1
                },
            ]
        );
    }

    #[test]
    fn dropped_receiver_does_not_fail_build() {
        let f = fixture(TTL_NONE);
        add_story(&f.source, "a", 1, &["a"]);
        let (tx, rx) = mpsc::channel();
        drop(rx);
        assert!(f.index.build(false, Some(&tx)).is_ok());
    }

    // =========================================================================
    // Failures
    // =========================================================================

    struct FailingTemplates;

    impl Templates for FailingTemplates {
        fn render_story(&self, _view: &StoryView<'_>) -> Result<String, TemplateError> {
            Ok(String::new())
        }

        fn render_index(&self, _view: &IndexView<'_>) -> Result<String, TemplateError> {
            Err(TemplateError::Render {
                page: "index",
                reason: "boom".into(),
            })
        }
    }

    #[test]
    fn template_failure_fails_the_build() {
        let f = fixture_with(TTL_NONE, Arc::new(FailingTemplates));
        add_story(&f.source, "a", 1, &["a"]);

        let err = f.index.build(false, None).unwrap_err();
        assert!(matches!(err, IndexError::Template(_)));
        assert_eq!(err.public_message(), crate::error::INTERNAL_MESSAGE);
    }
}
