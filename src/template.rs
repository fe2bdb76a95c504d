//! HTML fragments for stories and the site index.
//!
//! The compilers hand over plain view structs; [`Templates`] turns them
//! into markup. [`MaudTemplates`] is the production implementation, built
//! with [maud](https://maud.lambda.xyz/) so every interpolated string is
//! escaped unless it is deliberately wrapped in `PreEscaped`.
//!
//! Only author-controlled markup is passed through unescaped: description,
//! captions and notes from `index.xml`, and the configured intro/final
//! fragments. The site name is plain text.
//!
//! Rendition URLs are relative. A story page lives at `/<story>/`, so its
//! pictures are `<stem>.<hash>.<size>.jpg`; the index lives at `/`, so its
//! thumbnails are `<story>/<stem>.<hash>.w100.jpg`.

use crate::config::SiteConfig;
use crate::imaging::{SizeClass, fit_within};
use crate::index::FolderEntry;
use crate::naming;
use crate::types::{PhotoMetadata, PictureRecord};
use chrono::NaiveDate;
use maud::{Markup, PreEscaped, html};
use thiserror::Error;

/// Size class shown inline in a story.
pub const STORY_SIZE: SizeClass = SizeClass::W600;
/// Size class a story picture links to.
pub const ZOOM_SIZE: SizeClass = SizeClass::W800;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Configured fragment '{name}' is not well-formed: {reason}")]
    InvalidFragment { name: &'static str, reason: String },
    #[error("Unable to render {page}: {reason}")]
    Render { page: &'static str, reason: String },
}

/// One item of a story body, resolved against the compiled pictures.
#[derive(Debug, Clone, Copy)]
pub enum StoryBlock<'a> {
    Picture(&'a PictureRecord),
    /// Note markup.
    Note(&'a str),
}

#[derive(Debug, Clone)]
pub struct StoryView<'a> {
    pub name: &'a str,
    pub title: &'a str,
    pub date: Option<NaiveDate>,
    pub blocks: Vec<StoryBlock<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexView<'a> {
    /// Entries in display order.
    pub entries: &'a [FolderEntry],
}

/// Renders story bodies and the index page body.
pub trait Templates: Send + Sync {
    fn render_story(&self, view: &StoryView<'_>) -> Result<String, TemplateError>;

    fn render_index(&self, view: &IndexView<'_>) -> Result<String, TemplateError>;
}

/// Templates built from the site configuration.
#[derive(Debug, Clone, Default)]
pub struct MaudTemplates {
    site_name: String,
    index_intro: String,
    index_final: String,
    story_final: String,
}

impl MaudTemplates {
    /// Take the configured fragments, checking that each one is well-formed
    /// so a typo shows up at startup rather than as a broken page.
    pub fn from_config(config: &SiteConfig) -> Result<Self, TemplateError> {
        check_fragment("index_intro", &config.index_intro)?;
        check_fragment("index_final", &config.index_final)?;
        check_fragment("story_final", &config.story_final)?;
        Ok(Self {
            site_name: config.site_name.clone(),
            index_intro: config.index_intro.clone(),
            index_final: config.index_final.clone(),
            story_final: config.story_final.clone(),
        })
    }
}

fn check_fragment(name: &'static str, fragment: &str) -> Result<(), TemplateError> {
    if fragment.trim().is_empty() {
        return Ok(());
    }
    let wrapped = format!("<fragment>{fragment}</fragment>");
    roxmltree::Document::parse(&wrapped)
        .map(|_| ())
        .map_err(|e| TemplateError::InvalidFragment {
            name,
            reason: e.to_string(),
        })
}

fn rendition_url(picture: &PictureRecord, size: SizeClass) -> String {
    naming::rendition_filename(&picture.stem, &picture.hash, size.label())
}

impl Templates for MaudTemplates {
    fn render_story(&self, view: &StoryView<'_>) -> Result<String, TemplateError> {
        let markup = html! {
            article.story data-story=(view.name) {
                header.story-header {
                    h1 { (view.title) }
                    @if let Some(date) = view.date {
                        (date_markup(date))
                    }
                }
                @for block in &view.blocks {
                    @match block {
                        StoryBlock::Picture(picture) => {
                            (story_picture(picture))
                        }
                        StoryBlock::Note(note) => {
                            div.note { (PreEscaped(*note)) }
                        }
                    }
                }
                @if !self.story_final.is_empty() {
                    footer.story-final { (PreEscaped(&self.story_final)) }
                }
            }
        };
        Ok(markup.into_string())
    }

    fn render_index(&self, view: &IndexView<'_>) -> Result<String, TemplateError> {
        let markup = html! {
            h1.site-name { (self.site_name) }
            @if !self.index_intro.is_empty() {
                div.index-intro { (PreEscaped(&self.index_intro)) }
            }
            ul.stories {
                @for entry in view.entries {
                    (index_entry(entry))
                }
            }
            @if !self.index_final.is_empty() {
                div.index-final { (PreEscaped(&self.index_final)) }
            }
        };
        Ok(markup.into_string())
    }
}

fn date_markup(date: NaiveDate) -> Markup {
    html! {
        time datetime=(date.format("%Y-%m-%d").to_string()) {
            (date.format("%-d %B %Y").to_string())
        }
    }
}

fn story_picture(picture: &PictureRecord) -> Markup {
    let (width, height) = fit_within((picture.width, picture.height), STORY_SIZE.bounds());
    html! {
        figure.picture id=(picture.id) {
            a href=(rendition_url(picture, ZOOM_SIZE)) {
                img src=(rendition_url(picture, STORY_SIZE))
                    width=(width) height=(height) alt=(picture.stem) loading="lazy";
            }
            @if picture.caption.is_some() || picture.metadata.is_some() {
                figcaption {
                    @if let Some(caption) = &picture.caption {
                        span.caption { (PreEscaped(caption)) }
                    }
                    @if let Some(meta) = &picture.metadata {
                        (photo_details(meta))
                    }
                }
            }
        }
    }
}

fn photo_details(meta: &PhotoMetadata) -> Markup {
    let settings: Vec<&str> = [
        meta.aperture.as_deref(),
        meta.shutter_speed.as_deref(),
        meta.focal_length.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();

    html! {
        span.exif {
            @if let Some(date) = &meta.capture_date {
                span.taken { (date) @if let Some(time) = &meta.capture_time { " " (time) } }
            }
            @if !settings.is_empty() {
                span.settings { (settings.join(" ")) }
            }
            @if let Some(iso) = meta.iso {
                span.iso { "ISO " (iso) }
            }
            @if let Some(gps) = &meta.gps {
                span.gps data-lat=(gps.latitude) data-lon=(gps.longitude) { (gps.display) }
            }
        }
    }
}

fn index_entry(entry: &FolderEntry) -> Markup {
    match entry {
        FolderEntry::Story {
            name,
            date,
            title,
            description,
            thumbnail,
            ..
        } => {
            let (width, height) = fit_within(
                (thumbnail.width, thumbnail.height),
                SizeClass::THUMBNAIL.bounds(),
            );
            html! {
                li.story {
                    a href={ (name) "/" } {
                        img src=(thumbnail.url) width=(width) height=(height) alt=(title) loading="lazy";
                        span.story-title { (title) }
                    }
                    @if let Some(date) = date {
                        (date_markup(*date))
                    }
                    div.story-description { (PreEscaped(description)) }
                }
            }
        }
        FolderEntry::Error { name, message, .. } => html! {
            li.story.error {
                span.story-name { (name) }
                p.error-message { (message) }
            }
        },
    }
}
