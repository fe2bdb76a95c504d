//! Picture renditions.
//!
//! A rendition is an original picture scaled to fit one [`SizeClass`] box
//! and re-encoded as JPEG. It lives at
//! `<cache>/<story>/<stem>.<hash>.<size>.jpg` and is never rewritten: a
//! changed original has a different hash and therefore a different file.
//!
//! A miss goes through:
//!
//! 1. check the cache (a hit needs no locking at all)
//! 2. take the lock for `(story, stem, hash, size)`
//! 3. check again, another request may have just written it
//! 4. take a resize slot, decode/scale/encode, give the slot back
//! 5. write to a temporary file and rename it into place
//!
//! The slot is taken after the key lock so a request blocked behind a
//! duplicate never sits on a slot.

use crate::cache::{CacheStats, DiskCache, StorageError, hash_bytes, write_atomic};
use crate::error::{Categorized, Status};
use crate::imaging::{BackendError, ImageBackend, Quality, ResizeParams, SizeClass, fit_within};
use crate::naming;
use crate::source::{SourceError, SourceRepository};
use crate::sync::{KeyedLocks, ResizeSlots};
use crate::types::PictureRecord;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Picture '{picture}' has changed since its story was compiled")]
    Changed { picture: String },
    #[error("Unable to render '{picture}' at {size}: {reason}")]
    Imaging {
        picture: String,
        size: SizeClass,
        reason: BackendError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Categorized for RenderError {
    fn status(&self) -> Status {
        match self {
            RenderError::Source(SourceError::Io { .. }) | RenderError::Storage(_) => {
                Status::Internal
            }
            RenderError::Source(_) | RenderError::Changed { .. } => Status::NotFound,
            RenderError::Imaging { .. } => Status::BadContent,
        }
    }
}

type RenditionKey = (String, String, String, SizeClass);

/// Produces and caches renditions.
pub struct PictureRenderer {
    source: Arc<dyn SourceRepository>,
    backend: Arc<dyn ImageBackend>,
    cache: DiskCache,
    quality: Quality,
    slots: ResizeSlots,
    locks: KeyedLocks<RenditionKey>,
    stats: CacheStats,
}

impl PictureRenderer {
    /// `max_resizes` bounds concurrent resize/encode work across every
    /// picture and size.
    pub fn new(
        source: Arc<dyn SourceRepository>,
        backend: Arc<dyn ImageBackend>,
        cache: DiskCache,
        quality: Quality,
        max_resizes: usize,
    ) -> Self {
        Self {
            source,
            backend,
            cache,
            quality,
            slots: ResizeSlots::new(max_resizes),
            locks: KeyedLocks::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn slots(&self) -> &ResizeSlots {
        &self.slots
    }

    /// Path of the rendition of `picture` at `size`, producing it first if
    /// needed.
    pub fn render(
        &self,
        story: &str,
        picture: &PictureRecord,
        size: SizeClass,
    ) -> Result<PathBuf, RenderError> {
        if !naming::is_valid_story_name(story) {
            return Err(SourceError::StoryNotFound(story.to_string()).into());
        }
        if !naming::is_valid_picture_name(&picture.stem) || !naming::is_valid_hash(&picture.hash) {
            return Err(SourceError::PictureNotFound {
                story: story.to_string(),
                picture: picture.stem.clone(),
            }
            .into());
        }

        let path = self
            .cache
            .rendition_path(story, &picture.stem, &picture.hash, size);
        if path.is_file() {
            self.stats.hit();
            return Ok(path);
        }

        let key = (
            story.to_string(),
            picture.stem.clone(),
            picture.hash.clone(),
            size,
        );
        self.locks.with_lock(&key, || {
            if path.is_file() {
                self.stats.hit();
                debug!(story, picture = %picture.stem, %size, "rendition written while waiting");
                return Ok(path.clone());
            }
            self.produce(story, picture, size, &path)?;
            self.stats.miss();
            Ok(path.clone())
        })
    }

    fn produce(
        &self,
        story: &str,
        picture: &PictureRecord,
        size: SizeClass,
        path: &std::path::Path,
    ) -> Result<(), RenderError> {
        let bytes = self.source.read_picture(story, &picture.stem)?;
        if hash_bytes(&bytes) != picture.hash {
            return Err(RenderError::Changed {
                picture: picture.stem.clone(),
            });
        }

        let (width, height) = fit_within((picture.width, picture.height), size.bounds());
        let encoded = {
            let _slot = self.slots.acquire();
            self.backend
                .resize(&ResizeParams {
                    source: &bytes,
                    width,
                    height,
                    quality: self.quality,
                })
                .map_err(|reason| RenderError::Imaging {
                    picture: picture.stem.clone(),
                    size,
                    reason,
                })?
        };

        self.cache.ensure_story_dir(story)?;
        write_atomic(path, &encoded)?;
        info!(
            story,
            picture = %picture.stem,
            %size,
            width,
            height,
            bytes = encoded.len(),
            "rendition written"
        );
        Ok(())
    }
}
