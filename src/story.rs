//! Story compilation.
//!
//! [`StoryCompiler::compile`] turns one story folder into a
//! [`CompiledStory`] and persists it under `<cache>/<story>/story.cache`.
//! The persisted entry carries the source timestamp it was built from; as
//! long as that is not older than the folder's live timestamp, the entry is
//! returned as-is without opening the definition or any picture.
//!
//! On a miss every declared picture is read once: its bytes give the
//! content hash and size, the backend gives dimensions and best-effort
//! camera metadata. Renditions are not produced here; the rendered body
//! only links to them, and [`PictureRenderer`](crate::rendition) creates
//! them on first request.

use crate::cache::{CacheStats, DiskCache, StorageError, hash_bytes};
use crate::definition::{self, Block, DefinitionError, PictureDecl};
use crate::error::{Categorized, Status};
use crate::imaging::{BackendError, ImageBackend};
use crate::naming;
use crate::source::{SourceError, SourceRepository};
use crate::template::{StoryBlock, StoryView, TemplateError, Templates};
use crate::types::{CompiledStory, PictureRecord, Timestamp};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Story '{story}' is malformed: {reason}")]
    MalformedStory {
        story: String,
        reason: DefinitionError,
    },
    #[error("Picture '{picture}' not found")]
    PictureNotFound { story: String, picture: String },
    #[error("Unable to process picture '{picture}': {reason}")]
    Imaging {
        picture: String,
        reason: BackendError,
    },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Categorized for CompileError {
    fn status(&self) -> Status {
        match self {
            CompileError::MalformedStory { .. }
            | CompileError::PictureNotFound { .. }
            | CompileError::Imaging { .. } => Status::BadContent,
            CompileError::Source(SourceError::StoryNotFound(_)) => Status::NotFound,
            CompileError::Source(SourceError::PictureNotFound { .. }) => Status::BadContent,
            CompileError::Source(SourceError::Io { .. })
            | CompileError::Template(_)
            | CompileError::Storage(_) => Status::Internal,
        }
    }
}

/// Compiles story folders and keeps their persisted form up to date.
pub struct StoryCompiler {
    source: Arc<dyn SourceRepository>,
    backend: Arc<dyn ImageBackend>,
    cache: DiskCache,
    templates: Arc<dyn Templates>,
    stats: CacheStats,
}

impl StoryCompiler {
    pub fn new(
        source: Arc<dyn SourceRepository>,
        backend: Arc<dyn ImageBackend>,
        cache: DiskCache,
        templates: Arc<dyn Templates>,
    ) -> Self {
        Self {
            source,
            backend,
            cache,
            templates,
            stats: CacheStats::default(),
        }
    }

    /// Disk hits and compilations so far.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Return the compiled form of `name`, valid for `source_timestamp`.
    ///
    /// Unless `force` is set, a persisted entry built from a timestamp at
    /// least as recent is returned without touching the story folder.
    pub fn compile(
        &self,
        name: &str,
        source_timestamp: Timestamp,
        force: bool,
    ) -> Result<CompiledStory, CompileError> {
        if !naming::is_valid_story_name(name) {
            return Err(SourceError::StoryNotFound(name.to_string()).into());
        }

        let path = self.cache.story_path(name);
        if !force
            && let Some(cached) = self.cache.load::<CompiledStory>(&path)
            && cached.name == name
            && cached.last_modified >= source_timestamp
        {
            self.stats.hit();
            debug!(story = name, "story cache hit");
            return Ok(cached);
        }

        self.stats.miss();
        info!(story = name, force, "compiling story");
        let story = self.build(name, source_timestamp)?;

        self.cache.ensure_story_dir(name)?;
        self.cache.store(&path, &story)?;
        Ok(story)
    }

    fn build(&self, name: &str, source_timestamp: Timestamp) -> Result<CompiledStory, CompileError> {
        let raw = self.source.read_definition(name)?;
        let definition =
            definition::parse(&raw).map_err(|reason| CompileError::MalformedStory {
                story: name.to_string(),
                reason,
            })?;

        let mut pictures = definition
            .pictures()
            .enumerate()
            .map(|(position, decl)| self.picture_record(name, position, decl))
            .collect::<Result<Vec<_>, _>>()?;
        if !pictures.iter().any(|p| p.index)
            && let Some(first) = pictures.first_mut()
        {
            first.index = true;
        }

        let content = {
            // Picture blocks pair up with records in declaration order
            let mut records = pictures.iter();
            let blocks = definition
                .body
                .iter()
                .filter_map(|block| match block {
                    Block::Picture(_) => records.next().map(StoryBlock::Picture),
                    Block::Note(note) => Some(StoryBlock::Note(note)),
                })
                .collect();
            self.templates.render_story(&StoryView {
                name,
                title: &definition.title,
                date: definition.date,
                blocks,
            })?
        };

        Ok(CompiledStory {
            name: name.to_string(),
            last_modified: source_timestamp,
            date: definition.date,
            title: definition.title,
            description: definition.description,
            content,
            pictures,
        })
    }

    fn picture_record(
        &self,
        story: &str,
        position: usize,
        decl: &PictureDecl,
    ) -> Result<PictureRecord, CompileError> {
        let not_found = || CompileError::PictureNotFound {
            story: story.to_string(),
            picture: decl.src.clone(),
        };
        if !naming::is_valid_picture_name(&decl.src) || !self.source.picture_exists(story, &decl.src)
        {
            return Err(not_found());
        }

        let bytes = self
            .source
            .read_picture(story, &decl.src)
            .map_err(|e| match e {
                SourceError::PictureNotFound { .. } => not_found(),
                other => other.into(),
            })?;
        let dims = self
            .backend
            .identify(&bytes)
            .map_err(|reason| CompileError::Imaging {
                picture: decl.src.clone(),
                reason,
            })?;
        let metadata = self.backend.read_metadata(&bytes).filter(|m| !m.is_empty());

        Ok(PictureRecord {
            id: format!("pic{position}"),
            stem: decl.src.clone(),
            hash: hash_bytes(&bytes),
            size: bytes.len() as u64,
            width: dims.width,
            height: dims.height,
            index: decl.index,
            caption: decl.caption.clone(),
            metadata,
        })
    }
}
