//! Entry points for a page-serving layer.
//!
//! [`Site`] owns one of each pipeline component, wired to the same source
//! and cache, and answers the three kinds of request a front end makes:
//! a story page, the index page and a picture rendition.
//!
//! Picture requests name a rendition by `stem.hash.size`. When the hash is
//! not the picture's current one (the page that linked it is older than
//! the picture) the answer is [`PictureResponse::Moved`] with the current
//! filename, so the front end can redirect instead of serving stale bytes.

use crate::cache::DiskCache;
use crate::config::SiteConfig;
use crate::error::{Categorized, Status};
use crate::imaging::{ImageBackend, Quality, SizeClass};
use crate::index::{IndexCompiler, IndexError, IndexEvent, IndexPage};
use crate::naming;
use crate::rendition::{PictureRenderer, RenderError};
use crate::source::{FsSource, SourceError, SourceRepository};
use crate::story::StoryCompiler;
use crate::template::{MaudTemplates, TemplateError, Templates};
use crate::types::CompiledStory;
use crate::working_set::{StoryError, StoryWorkingSet};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PictureError {
    #[error(transparent)]
    Story(#[from] StoryError),
    #[error("Picture '{0}' not found")]
    NotFound(String),
    #[error("Size '{0}' not available")]
    SizeNotAvailable(String),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl Categorized for PictureError {
    fn status(&self) -> Status {
        match self {
            PictureError::Story(e) => e.status(),
            PictureError::NotFound(_) | PictureError::SizeNotAvailable(_) => Status::NotFound,
            PictureError::Render(e) => e.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PictureResponse {
    /// Rendition on disk, ready to serve.
    Ready(PathBuf),
    /// The requested hash is outdated; this is the current filename.
    Moved(String),
}

pub struct Site {
    source: Arc<dyn SourceRepository>,
    stories: StoryWorkingSet,
    renderer: PictureRenderer,
    index: IndexCompiler,
}

impl Site {
    /// Site over the configured story folders.
    pub fn open(config: &SiteConfig, backend: Arc<dyn ImageBackend>) -> Result<Self, TemplateError> {
        let source = Arc::new(FsSource::new(&config.story_root));
        Self::with_source(config, source, backend)
    }

    /// Site over any story source.
    pub fn with_source(
        config: &SiteConfig,
        source: Arc<dyn SourceRepository>,
        backend: Arc<dyn ImageBackend>,
    ) -> Result<Self, TemplateError> {
        let templates: Arc<dyn Templates> = Arc::new(MaudTemplates::from_config(config)?);
        let cache = DiskCache::new(&config.cache_root);

        let compiler = Arc::new(StoryCompiler::new(
            Arc::clone(&source),
            Arc::clone(&backend),
            cache.clone(),
            Arc::clone(&templates),
        ));
        let stories = StoryWorkingSet::new(
            Arc::clone(&source),
            Arc::clone(&compiler),
            config.working_set.capacity,
        );
        let renderer = PictureRenderer::new(
            Arc::clone(&source),
            backend,
            cache.clone(),
            Quality::new(config.images.quality),
            config.processing.max_resizes,
        );
        let index = IndexCompiler::new(
            Arc::clone(&source),
            compiler,
            templates,
            cache,
            config.index.memory_ttl(),
        );

        Ok(Self {
            source,
            stories,
            renderer,
            index,
        })
    }

    pub fn stories(&self) -> &StoryWorkingSet {
        &self.stories
    }

    pub fn renderer(&self) -> &PictureRenderer {
        &self.renderer
    }

    pub fn index_compiler(&self) -> &IndexCompiler {
        &self.index
    }

    /// Names of every story folder.
    pub fn story_names(&self) -> Result<Vec<String>, SourceError> {
        self.source.list_folders()
    }

    pub fn story(&self, name: &str, reload: bool) -> Result<Arc<CompiledStory>, StoryError> {
        self.stories.get(name, reload)
    }

    pub fn index(
        &self,
        reload: bool,
        progress: Option<&Sender<IndexEvent>>,
    ) -> Result<Arc<IndexPage>, IndexError> {
        self.index.build(reload, progress)
    }

    /// Resolve a rendition request.
    pub fn picture(
        &self,
        story: &str,
        stem: &str,
        hash: &str,
        size_label: &str,
        reload: bool,
    ) -> Result<PictureResponse, PictureError> {
        let size = SizeClass::parse(size_label)
            .ok_or_else(|| PictureError::SizeNotAvailable(size_label.to_string()))?;
        let compiled = self.stories.get(story, reload)?;
        let record = compiled
            .picture(stem)
            .ok_or_else(|| PictureError::NotFound(stem.to_string()))?;

        if record.hash != hash {
            return Ok(PictureResponse::Moved(naming::rendition_filename(
                stem,
                &record.hash,
                size.label(),
            )));
        }
        Ok(PictureResponse::Ready(
            self.renderer.render(story, record, size)?,
        ))
    }

    /// Resolve a rendition request given as a filename
    /// (`<stem>.<hash>.<size>.jpg`).
    pub fn picture_file(
        &self,
        story: &str,
        filename: &str,
        reload: bool,
    ) -> Result<PictureResponse, PictureError> {
        let name = naming::parse_rendition_filename(filename)
            .ok_or_else(|| PictureError::NotFound(filename.to_string()))?;
        self.picture(story, name.stem, name.hash, name.size, reload)
    }

    /// Produce every size of every picture of `story`, in parallel on the
    /// current rayon pool. Returns the number of renditions now on disk.
    ///
    /// `reload` recompiles the story first. Renditions already on disk are
    /// kept either way: their names carry the content hash.
    pub fn warm(&self, story: &str, reload: bool) -> Result<usize, PictureError> {
        let compiled = self.stories.get(story, reload)?;
        let jobs: Vec<_> = compiled
            .pictures
            .iter()
            .flat_map(|p| SizeClass::ALL.into_iter().map(move |size| (p, size)))
            .collect();

        jobs.par_iter()
            .map(|(picture, size)| self.renderer.render(story, picture, *size))
            .collect::<Result<Vec<_>, _>>()
            .map(|paths| paths.len())
            .map_err(PictureError::from)
    }
}
