//! Index of chapters already materialized on disk.
//!
//! Rows live in SQLite; an in-memory copy is loaded at startup so "is this
//! chapter downloaded?" never touches the disk.

use crate::db::Database;
use crate::error::Result;
use crate::types::{ChapterId, MangaId, SourceId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq)]
struct CachedChapter {
    source_id: SourceId,
    manga_id: MangaId,
    path: PathBuf,
}

/// Download cache shared by the pipeline and the enqueue path
#[derive(Clone)]
pub struct DownloadCache {
    db: Arc<Database>,
    chapters: Arc<RwLock<HashMap<ChapterId, CachedChapter>>>,
}

impl DownloadCache {
    /// Load the index from the database
    pub async fn load(db: Arc<Database>) -> Result<Self> {
        let rows = db.list_downloaded_chapters().await?;
        let chapters = rows
            .into_iter()
            .map(|row| {
                (
                    row.chapter_id,
                    CachedChapter {
                        source_id: row.source_id,
                        manga_id: row.manga_id,
                        path: PathBuf::from(row.path),
                    },
                )
            })
            .collect::<HashMap<_, _>>();

        tracing::debug!(chapters = chapters.len(), "Loaded download cache");

        Ok(Self {
            db,
            chapters: Arc::new(RwLock::new(chapters)),
        })
    }

    /// Register a materialized chapter
    pub async fn add_chapter(
        &self,
        source_id: SourceId,
        manga_id: MangaId,
        chapter_id: ChapterId,
        path: &Path,
    ) -> Result<()> {
        let dir_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.db
            .insert_downloaded_chapter(source_id, manga_id, chapter_id, &dir_name, path)
            .await?;

        self.chapters.write().await.insert(
            chapter_id,
            CachedChapter {
                source_id,
                manga_id,
                path: path.to_path_buf(),
            },
        );
        Ok(())
    }

    /// Whether a chapter is registered as downloaded
    pub async fn is_chapter_downloaded(&self, chapter_id: ChapterId) -> bool {
        self.chapters.read().await.contains_key(&chapter_id)
    }

    /// Where a downloaded chapter lives
    pub async fn chapter_path(&self, chapter_id: ChapterId) -> Option<PathBuf> {
        self.chapters
            .read()
            .await
            .get(&chapter_id)
            .map(|c| c.path.clone())
    }

    /// Forget a chapter (e.g. after the user deleted it)
    pub async fn remove_chapter(&self, chapter_id: ChapterId) -> Result<bool> {
        let removed = self.db.delete_downloaded_chapter(chapter_id).await?;
        self.chapters.write().await.remove(&chapter_id);
        Ok(removed)
    }

    /// Forget every chapter of a manga; returns how many were removed
    pub async fn remove_manga(&self, manga_id: MangaId) -> Result<usize> {
        let removed = self.db.delete_downloaded_manga(manga_id).await?;
        let mut chapters = self.chapters.write().await;
        chapters.retain(|_, c| c.manga_id != manga_id);
        Ok(removed.len())
    }

    /// Downloaded chapters of a manga
    pub async fn chapter_count(&self, manga_id: MangaId) -> usize {
        self.chapters
            .read()
            .await
            .values()
            .filter(|c| c.manga_id == manga_id)
            .count()
    }

    /// Downloaded chapters of a source
    pub async fn source_chapter_count(&self, source_id: SourceId) -> usize {
        self.chapters
            .read()
            .await
            .values()
            .filter(|c| c.source_id == source_id)
            .count()
    }
}
