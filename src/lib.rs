//! # picstory
//!
//! Serves picture stories: folders holding an `index.xml` story definition
//! and the JPEG pictures it references. Every expensive artifact (compiled
//! story pages, the index page, resized pictures) is derived from the
//! story folders and cached, so a request only does work when a folder
//! changed since the artifact was built.
//!
//! # Architecture: Derived-Artifact Cache
//!
//! ```text
//!                      ┌──────────────┐
//!   story folders ───► │ StoryCompiler│ ──► <cache>/<story>/story.cache
//!   (SourceRepository) └──────┬───────┘
//!                             │ compiled stories
//!            ┌────────────────┼─────────────────┐
//!            ▼                ▼                 ▼
//!   StoryWorkingSet     IndexCompiler     PictureRenderer
//!   (LRU, in memory)    index.cache       <stem>.<hash>.<size>.jpg
//! ```
//!
//! Each layer checks validity against the source timestamp it was built
//! from: memory first, then disk, then a rebuild. Renditions are keyed by
//! the content hash of the picture, so they never go stale; a changed
//! picture simply gets a new filename.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`source`] | Read-only access to story folders (filesystem or in-memory) |
//! | [`definition`] | Parses and validates `index.xml` |
//! | [`story`] | Compiles one story into its page and picture records, with disk cache |
//! | [`working_set`] | Bounded LRU of compiled stories in front of the compiler |
//! | [`rendition`] | Produces resized pictures on demand, with bounded concurrency |
//! | [`index`] | Builds the index page over every story folder |
//! | [`site`] | Wires the components together and answers page requests |
//! | [`template`] | Maud page templates and configured fragments |
//! | [`cache`] | Disk cache layout, versioned entries, atomic writes, hit/miss stats |
//! | [`sync`] | Per-key locks and the resize slot semaphore |
//! | [`config`] | `config.toml` loading, validation and stock defaults |
//! | [`imaging`] | Pure-Rust image backend: identify, EXIF, resize, JPEG encode |
//! | [`naming`] | Story, picture and rendition name rules |
//! | [`types`] | Compiled story and picture record types |
//! | [`error`] | Status categories shared by every user-reachable error |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Timestamps Over Content Hashes for Stories
//!
//! A story is rebuilt when the newest modification time in its folder is
//! later than the timestamp stored with the compiled entry. Reading every
//! picture to hash it on each request would cost more than the compile it
//! avoids. Pictures themselves are hashed once per compile, and the hash
//! becomes part of every rendition URL.
//!
//! ## Broken Stories Do Not Break the Index
//!
//! The index compiles every story. A story that fails shows up as an error
//! entry carrying a message safe for visitors; the rest of the index is
//! unaffected. Which messages are safe is decided by [`error::Categorized`].
//!
//! ## Maud Over Template Engines
//!
//! Pages are built with [Maud](https://maud.lambda.xyz/). Interpolation is
//! escaped by default; only story markup (descriptions, captions, notes)
//! and the configured fragments are passed through as-is.

pub mod cache;
pub mod config;
pub mod definition;
pub mod error;
pub mod imaging;
pub mod index;
pub mod naming;
pub mod output;
pub mod rendition;
pub mod site;
pub mod source;
pub mod story;
pub mod sync;
pub mod template;
pub mod types;
pub mod working_set;
