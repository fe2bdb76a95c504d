//! Bounded in-memory set of compiled stories.
//!
//! Sits in front of [`StoryCompiler`]: a request first checks the folder's
//! live timestamp, then serves the in-memory story if it was built from
//! that timestamp or later. Otherwise the compiler runs (and may itself
//! answer from disk).
//!
//! Recency is a logical clock bumped on every successful access; when the
//! set grows past its capacity the entry with the smallest tick goes.
//!
//! The map lock is only held for lookups and inserts. Compilation runs
//! under a per-story lock instead, so a slow story never blocks requests
//! for another one, while two requests for the same story still compile
//! it once.

use crate::error::{Categorized, Status};
use crate::naming;
use crate::source::SourceRepository;
use crate::story::{CompileError, StoryCompiler};
use crate::sync::KeyedLocks;
use crate::types::{CompiledStory, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoryError {
    #[error("Story '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl Categorized for StoryError {
    fn status(&self) -> Status {
        match self {
            StoryError::NotFound(_) => Status::NotFound,
            StoryError::Compile(e) => e.status(),
        }
    }
}

struct Entry {
    story: Arc<CompiledStory>,
    last_access: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    clock: u64,
}

impl State {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct StoryWorkingSet {
    source: Arc<dyn SourceRepository>,
    compiler: Arc<StoryCompiler>,
    capacity: usize,
    state: Mutex<State>,
    compiling: KeyedLocks<String>,
}

impl StoryWorkingSet {
    /// `capacity` is raised to 1 if zero.
    pub fn new(
        source: Arc<dyn SourceRepository>,
        compiler: Arc<StoryCompiler>,
        capacity: usize,
    ) -> Self {
        Self {
            source,
            compiler,
            capacity: capacity.max(1),
            state: Mutex::new(State::default()),
            compiling: KeyedLocks::new(),
        }
    }

    pub fn compiler(&self) -> &StoryCompiler {
        &self.compiler
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current compiled form of `name`.
    pub fn get(&self, name: &str, force: bool) -> Result<Arc<CompiledStory>, StoryError> {
        if !naming::is_valid_story_name(name) {
            return Err(StoryError::NotFound(name.to_string()));
        }
        let live = self
            .source
            .folder_timestamp(name)
            .map_err(|_| StoryError::NotFound(name.to_string()))?;

        if !force && let Some(story) = self.fresh(name, live) {
            return Ok(story);
        }

        self.compiling.with_lock(&name.to_string(), || {
            // Someone else may have finished compiling while we waited
            if !force && let Some(story) = self.fresh(name, live) {
                return Ok(story);
            }
            let story = Arc::new(self.compiler.compile(name, live, force)?);
            self.insert(name, Arc::clone(&story));
            Ok(story)
        })
    }

    /// The in-memory story if it is valid for `live`, touching its recency.
    fn fresh(&self, name: &str, live: Timestamp) -> Option<Arc<CompiledStory>> {
        let mut guard = self.state();
        let tick = guard.tick();
        let entry = guard.entries.get_mut(name)?;
        if entry.story.last_modified < live {
            debug!(story = name, "working set entry is stale");
            return None;
        }
        entry.last_access = tick;
        Some(Arc::clone(&entry.story))
    }

    fn insert(&self, name: &str, story: Arc<CompiledStory>) {
        let mut guard = self.state();
        let state = &mut *guard;
        let last_access = state.tick();
        state
            .entries
            .insert(name.to_string(), Entry { story, last_access });

        while state.entries.len() > self.capacity {
            let Some(oldest) = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            state.entries.remove(&oldest);
            debug!(story = %oldest, "evicted from working set");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state().entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names held in memory, most recently used first.
    pub fn cached_names(&self) -> Vec<String> {
        let state = self.state();
        let mut names: Vec<_> = state
            .entries
            .iter()
            .map(|(k, e)| (e.last_access, k.clone()))
            .collect();
        names.sort_by(|a, b| b.0.cmp(&a.0));
        names.into_iter().map(|(_, k)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DiskCache;
    use crate::imaging::backend::tests::MockBackend;
    use crate::source::MemorySource;
    use crate::story::tests::{add_story, definition};
    use crate::template::MaudTemplates;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        source: Arc<MemorySource>,
        set: StoryWorkingSet,
    }

    fn fixture(capacity: usize) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let source = Arc::new(MemorySource::new());
        let compiler = StoryCompiler::new(
            source.clone(),
            Arc::new(MockBackend::new()),
            DiskCache::new(tmp.path()),
            Arc::new(MaudTemplates::default()),
        );
        let set = StoryWorkingSet::new(source.clone(), Arc::new(compiler), capacity);
        Fixture {
            _tmp: tmp,
            source,
            set,
        }
    }

    fn name(i: usize) -> String {
        format!("story-{i:02}")
    }

    // =========================================================================
    // Hits and staleness
    // =========================================================================

    #[test]
    fn repeated_get_compiles_once() {
        let f = fixture(10);
        add_story(&f.source, "trip", 1000, &["a"]);

        let first = f.set.get("trip", false).unwrap();
        for _ in 0..5 {
            let again = f.set.get("trip", false).unwrap();
            assert_eq!(again.content, first.content);
            assert!(Arc::ptr_eq(&again, &first));
        }
        assert_eq!(f.set.compiler().stats().total(), 1);
    }

    #[test]
    fn advanced_timestamp_recompiles() {
        let f = fixture(10);
        add_story(&f.source, "trip", 1000, &["a"]);
        f.set.get("trip", false).unwrap();

        f.source
            .put_story("trip", 5000, &definition("Later", &["a"], None));
        let story = f.set.get("trip", false).unwrap();

        assert_eq!(story.title, "Later");
        assert!(story.last_modified >= 5000);
        assert_eq!(f.set.compiler().stats().misses(), 2);
    }

    #[test]
    fn force_bypasses_memory_and_disk() {
        let f = fixture(10);
        add_story(&f.source, "trip", 1000, &["a"]);
        let first = f.set.get("trip", false).unwrap();
        let second = f.set.get("trip", true).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(f.set.compiler().stats().misses(), 2);
    }

    #[test]
    fn missing_or_invalid_story_is_not_found() {
        let f = fixture(10);
        assert!(matches!(f.set.get("nope", false), Err(StoryError::NotFound(_))));
        assert!(matches!(f.set.get("../x", false), Err(StoryError::NotFound(_))));
        assert_eq!(
            f.set.get("nope", false).unwrap_err().status(),
            Status::NotFound
        );
    }

    #[test]
    fn compile_errors_are_forwarded() {
        let f = fixture(10);
        f.source.put_story("bad", 1, "<story><description/></story>");
        let err = f.set.get("bad", false).unwrap_err();
        assert!(matches!(
            err,
            StoryError::Compile(CompileError::MalformedStory { .. })
        ));
        assert_eq!(err.status(), Status::BadContent);
        assert!(!f.set.contains("bad"));
    }

    // =========================================================================
    // Eviction
    // =========================================================================

    #[test]
    fn eleventh_story_evicts_least_recent() {
        let f = fixture(10);
        for i in 0..11 {
            add_story(&f.source, &name(i), 1, &["a"]);
        }
        for i in 0..10 {
            f.set.get(&name(i), false).unwrap();
        }
        assert_eq!(f.set.len(), 10);

        f.set.get(&name(10), false).unwrap();

        assert_eq!(f.set.len(), 10);
        assert!(!f.set.contains(&name(0)));
        for i in 1..11 {
            assert!(f.set.contains(&name(i)), "{} should be kept", name(i));
        }
    }

    #[test]
    fn access_refreshes_recency() {
        let f = fixture(10);
        for i in 0..11 {
            add_story(&f.source, &name(i), 1, &["a"]);
        }
        for i in 0..10 {
            f.set.get(&name(i), false).unwrap();
        }
        // Touch the oldest; the next oldest becomes the victim
        f.set.get(&name(0), false).unwrap();
        f.set.get(&name(10), false).unwrap();

        assert!(f.set.contains(&name(0)));
        assert!(!f.set.contains(&name(1)));
        assert_eq!(f.set.cached_names()[0], name(10));
        assert_eq!(f.set.cached_names()[1], name(0));
    }

    #[test]
    fn evicted_story_reloads_from_disk() {
        let f = fixture(1);
        add_story(&f.source, "one", 1, &["a"]);
        add_story(&f.source, "two", 1, &["a"]);

        f.set.get("one", false).unwrap();
        f.set.get("two", false).unwrap();
        assert!(!f.set.contains("one"));

        f.set.get("one", false).unwrap();
        let stats = f.set.compiler().stats();
        assert_eq!(stats.misses(), 2);
        assert_eq!(stats.hits(), 1);
    }

    // =========================================================================
    // Concurrency
    // =========================================================================

    #[test]
    fn concurrent_gets_compile_once() {
        let f = fixture(10);
        add_story(&f.source, "trip", 1, &["a", "b", "c"]);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| f.set.get("trip", false).unwrap());
            }
        });

        assert_eq!(f.set.compiler().stats().total(), 1);
        assert_eq!(f.set.len(), 1);
    }
}
