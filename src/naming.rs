//! Name grammars shared by stories, pictures and renditions.
//!
//! Names come from URLs and from story definitions, and every one of them
//! ends up as a path component under the story or cache root. Validating
//! them against a closed character set is what keeps `..` and friends out
//! of the filesystem.
//!
//! | Kind | Grammar | Example |
//! |------|---------|---------|
//! | Story folder | `[a-z0-9_-]+` | `iceland-2019` |
//! | Picture stem | `[a-zA-Z0-9_-]+` | `IMG_0412` |
//! | Content hash | `[a-z0-9]{8}` | `3fa9c01b` |
//! | Rendition file | `<stem>.<hash>.<size>.jpg` | `IMG_0412.3fa9c01b.w600.jpg` |

/// Length of the short content hash embedded in rendition filenames.
pub const HASH_LEN: usize = 8;

fn is_lc_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Story folder names: lowercase letters, digits, `_` and `-`.
pub fn is_valid_story_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_lc_name_char)
}

/// Picture stems: letters of either case, digits, `_` and `-`.
pub fn is_valid_picture_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_name_char)
}

/// Short content hashes: exactly eight lowercase alphanumerics.
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_LEN
        && hash
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

/// A parsed rendition filename. The size label is kept as written; callers
/// decide whether it names a known size class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionName<'a> {
    pub stem: &'a str,
    pub hash: &'a str,
    pub size: &'a str,
}

/// Build the filename of a rendition: `<stem>.<hash>.<size>.jpg`.
pub fn rendition_filename(stem: &str, hash: &str, size_label: &str) -> String {
    format!("{stem}.{hash}.{size_label}.jpg")
}

/// Parse `<stem>.<hash>.<size>.jpg`.
///
/// Returns `None` when any part fails its grammar. The size label must be
/// a lowercase name; whether it is an actual size class is not checked here.
pub fn parse_rendition_filename(filename: &str) -> Option<RenditionName<'_>> {
    let rest = filename.strip_suffix(".jpg")?;
    let mut parts = rest.splitn(3, '.');
    let stem = parts.next()?;
    let hash = parts.next()?;
    let size = parts.next()?;

    if !is_valid_picture_name(stem) || !is_valid_hash(hash) || !is_valid_story_name(size) {
        return None;
    }
    Some(RenditionName { stem, hash, size })
}
