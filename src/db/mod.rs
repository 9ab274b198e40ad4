//! Database layer for chapter-dl
//!
//! SQLite persistence for everything that must survive a process restart.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`queue_store`] — Durable mirror of the download queue
//! - [`downloaded`] — Index of chapters already materialized on disk
//! - [`state`] — Runtime state (shutdown tracking)

use crate::error::{DatabaseError, Error};
use crate::types::{Chapter, ChapterId, Manga, MangaId, SourceId};
use sqlx::{FromRow, sqlite::SqlitePool};

mod downloaded;
mod migrations;
mod queue_store;
mod state;

/// Queue entry as persisted: identity and descriptive fields, never live state
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StoredDownload {
    /// Chapter id (primary key)
    pub chapter_id: ChapterId,
    /// Insertion order; restored queues are sorted by it
    pub position: i64,
    /// Source the chapter is downloaded from
    pub source_id: SourceId,
    /// Owning manga
    pub manga_id: MangaId,
    /// Manga title
    pub manga_title: String,
    /// Chapter name
    pub chapter_name: String,
    /// Scanlation group
    pub scanlator: Option<String>,
    /// Source-relative chapter URL
    pub chapter_url: String,
    /// Position in the source's chapter list
    pub source_order: i64,
}

impl StoredDownload {
    /// Rebuild the manga and chapter this entry was saved from
    pub fn into_parts(self) -> (Manga, Chapter) {
        let manga = Manga {
            id: self.manga_id,
            source: self.source_id,
            title: self.manga_title,
        };
        let chapter = Chapter {
            id: self.chapter_id,
            manga_id: self.manga_id,
            name: self.chapter_name,
            scanlator: self.scanlator,
            url: self.chapter_url,
            source_order: self.source_order,
        };
        (manga, chapter)
    }
}

/// Row of the downloaded-chapters index
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct DownloadedChapter {
    /// Chapter id (primary key)
    pub chapter_id: ChapterId,
    /// Owning manga
    pub manga_id: MangaId,
    /// Source the chapter came from
    pub source_id: SourceId,
    /// Final directory or archive name (without parent)
    pub dir_name: String,
    /// Full path of the directory or archive
    pub path: String,
    /// Unix timestamp of registration
    pub downloaded_at: i64,
}

/// Database handle for chapter-dl
pub struct Database {
    pool: SqlitePool,
}

/// Map a sqlx failure onto a [`DatabaseError::QueryFailed`] with context
pub(crate) fn query_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::QueryFailed(format!("{}: {}", context, e)))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
