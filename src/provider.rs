//! Download directory layout and naming rules.
//!
//! Chapters live at `<download_dir>/<source>/<manga>/<chapter>` (or
//! `<chapter>.cbz`). Every path component goes through
//! [`build_valid_filename`] so names coming from remote catalogs can never
//! escape the download root or trip FAT-formatted storage.

use crate::types::{Chapter, Manga};
use std::path::{Path, PathBuf};

/// Suffix of the staging directory a chapter is downloaded into
pub const TMP_DIR_SUFFIX: &str = "_tmp";

/// Extension of finished chapter archives
pub const CBZ_EXTENSION: &str = "cbz";

/// Longest component name, in bytes (ext4 limit minus reserved room)
const MAX_FILENAME_BYTES: usize = 240;

/// Replace characters that are invalid on FAT/ext4 and cap the length
///
/// Leading and trailing dots and spaces are trimmed; an empty result becomes
/// `(invalid)`.
pub fn build_valid_filename(name: &str) -> String {
    let trimmed = name.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return "(invalid)".to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        let replacement = if is_valid_fat_filename_char(c) { c } else { '_' };
        if out.len() + replacement.len_utf8() > MAX_FILENAME_BYTES {
            break;
        }
        out.push(replacement);
    }
    out
}

fn is_valid_fat_filename_char(c: char) -> bool {
    !matches!(
        c,
        '\u{0}'..='\u{1f}' | '"' | '*' | '/' | ':' | '<' | '>' | '?' | '\\' | '|' | '\u{7f}'
    )
}

/// Resolves where chapters are stored on disk
#[derive(Clone, Debug)]
pub struct DownloadProvider {
    root: PathBuf,
}

impl DownloadProvider {
    /// Create a provider rooted at the download directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The download root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for a source, e.g. `MangaDex (EN)`
    pub fn source_dir_name(source_name: &str, lang: &str) -> String {
        if lang.is_empty() {
            build_valid_filename(source_name)
        } else {
            build_valid_filename(&format!("{} ({})", source_name, lang.to_uppercase()))
        }
    }

    /// Directory name for a manga
    pub fn manga_dir_name(title: &str) -> String {
        build_valid_filename(title)
    }

    /// Directory name for a chapter: `<scanlator>_<name>` when a scanlator is set
    pub fn chapter_dir_name(chapter: &Chapter) -> String {
        match chapter.scanlator.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(scanlator) => build_valid_filename(&format!("{}_{}", scanlator, chapter.name)),
            None => build_valid_filename(&chapter.name),
        }
    }

    /// Directory holding every chapter of a manga
    pub fn manga_dir(&self, source_dir: &str, manga: &Manga) -> PathBuf {
        self.root
            .join(source_dir)
            .join(Self::manga_dir_name(&manga.title))
    }

    /// Existing directory or archive for a chapter, if it has been downloaded
    pub fn find_chapter_dir(
        &self,
        source_dir: &str,
        manga: &Manga,
        chapter: &Chapter,
    ) -> Option<PathBuf> {
        let manga_dir = self.manga_dir(source_dir, manga);
        let dir_name = Self::chapter_dir_name(chapter);

        let dir = manga_dir.join(&dir_name);
        if dir.is_dir() {
            return Some(dir);
        }
        let archive = manga_dir.join(format!("{}.{}", dir_name, CBZ_EXTENSION));
        if archive.is_file() {
            return Some(archive);
        }
        None
    }

    /// Staging directory name for a chapter directory name
    pub fn tmp_dir_name(dir_name: &str) -> String {
        format!("{}{}", dir_name, TMP_DIR_SUFFIX)
    }
}
