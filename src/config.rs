//! Site configuration module.
//!
//! Handles loading and validating `config.toml`. User values are merged on
//! top of the stock defaults, so a config file only needs the keys it wants
//! to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! story_root = "stories"    # One folder per story, each with index.xml
//! cache_root = "cache"      # Compiled stories, index and renditions
//! site_name = "Picture stories"
//! index_intro = ""          # Markup placed above the story list
//! index_final = ""          # Markup placed below the story list
//! story_final = ""          # Markup appended to every story
//!
//! [images]
//! quality = 75              # JPEG quality for renditions (1-100)
//!
//! [processing]
//! max_resizes = 2           # Concurrent resize/encode operations
//! max_processes = 4         # Worker threads for `warm` (omit for auto = CPU cores)
//!
//! [working_set]
//! capacity = 10             # Compiled stories kept in memory
//!
//! [index]
//! memory_ttl_secs = 60      # How long a rendered index is reused without checking disk
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory holding one folder per story.
    pub story_root: PathBuf,
    /// Directory for compiled stories, the index cache and renditions.
    pub cache_root: PathBuf,
    /// Site name shown on the index page (plain text).
    pub site_name: String,
    /// Markup placed above the story list.
    pub index_intro: String,
    /// Markup placed below the story list.
    pub index_final: String,
    /// Markup appended to every story body.
    pub story_final: String,
    pub images: ImagesConfig,
    pub processing: ProcessingConfig,
    pub working_set: WorkingSetConfig,
    pub index: IndexConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            story_root: PathBuf::from("stories"),
            cache_root: PathBuf::from("cache"),
            site_name: "Picture stories".to_string(),
            index_intro: String::new(),
            index_final: String::new(),
            story_final: String::new(),
            images: ImagesConfig::default(),
            processing: ProcessingConfig::default(),
            working_set: WorkingSetConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.processing.max_resizes == 0 {
            return Err(ConfigError::Validation(
                "processing.max_resizes must be at least 1".into(),
            ));
        }
        if self.working_set.capacity == 0 {
            return Err(ConfigError::Validation(
                "working_set.capacity must be at least 1".into(),
            ));
        }
        if self.story_root.as_os_str().is_empty() || self.cache_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "story_root and cache_root must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve relative roots against the directory the config was loaded from.
    pub fn rooted_at(mut self, base: &Path) -> Self {
        if self.story_root.is_relative() {
            self.story_root = base.join(&self.story_root);
        }
        if self.cache_root.is_relative() {
            self.cache_root = base.join(&self.cache_root);
        }
        self
    }
}

/// Rendition encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// JPEG quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { quality: 75 }
    }
}

/// Concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of resize/encode operations running at once,
    /// across all pictures and sizes.
    pub max_resizes: usize,
    /// Worker threads for bulk rendering. When absent, defaults to the
    /// number of CPU cores. Values larger than the core count are clamped.
    pub max_processes: Option<usize>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_resizes: 2,
            max_processes: None,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// In-memory story cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkingSetConfig {
    /// Number of compiled stories kept in memory.
    pub capacity: usize,
}

impl Default for WorkingSetConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

/// Index page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// Seconds a rendered index is served from memory before the folder
    /// timestamps are checked again.
    pub memory_ttl_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: 60,
        }
    }
}

impl IndexConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// validates the result and resolves relative roots against the file's
/// directory. A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    let dir = path.parent().unwrap_or(Path::new(""));
    Ok(config.rooted_at(dir))
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# picstory configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Relative paths are resolved against
# the directory holding this file. Unknown keys will cause an error.

# One folder per story; each folder holds index.xml and <picture>.jpg files.
story_root = "stories"

# Compiled stories, the index cache and resized pictures.
cache_root = "cache"

# Shown as the index page heading.
site_name = "Picture stories"

# Markup fragments placed around the story list and after every story.
index_intro = ""
index_final = ""
story_final = ""

# ---------------------------------------------------------------------------
# Renditions
# ---------------------------------------------------------------------------
[images]
# JPEG quality for resized pictures (1 = worst, 100 = best).
quality = 75

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Resize/encode operations allowed to run at the same time.
max_resizes = 2

# Worker threads for the warm command.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Caching
# ---------------------------------------------------------------------------
[working_set]
# Compiled stories kept in memory; older ones are reloaded from disk.
capacity = 10

[index]
# Seconds the rendered index is reused before folder timestamps are rechecked.
memory_ttl_secs = 60
"##
}
