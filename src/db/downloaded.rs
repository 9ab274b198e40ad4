//! Index of chapters that have been materialized on disk.

use crate::Result;
use crate::types::{ChapterId, MangaId, SourceId};
use std::path::Path;

use super::{Database, DownloadedChapter, query_failed};

impl Database {
    /// Register a materialized chapter, replacing any previous row
    pub async fn insert_downloaded_chapter(
        &self,
        source_id: SourceId,
        manga_id: MangaId,
        chapter_id: ChapterId,
        dir_name: &str,
        path: &Path,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO downloaded_chapters (chapter_id, manga_id, source_id, dir_name, path, downloaded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(chapter_id) DO UPDATE SET
                manga_id = excluded.manga_id,
                source_id = excluded.source_id,
                dir_name = excluded.dir_name,
                path = excluded.path,
                downloaded_at = excluded.downloaded_at
            "#,
        )
        .bind(chapter_id)
        .bind(manga_id)
        .bind(source_id)
        .bind(dir_name)
        .bind(path.to_string_lossy().into_owned())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to register downloaded chapter"))?;

        Ok(())
    }

    /// Look up a downloaded chapter
    pub async fn get_downloaded_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Option<DownloadedChapter>> {
        let row = sqlx::query_as::<_, DownloadedChapter>(
            r#"
            SELECT chapter_id, manga_id, source_id, dir_name, path, downloaded_at
            FROM downloaded_chapters
            WHERE chapter_id = ?
            "#,
        )
        .bind(chapter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed("Failed to get downloaded chapter"))?;

        Ok(row)
    }

    /// Every downloaded chapter, used to warm the in-memory index
    pub async fn list_downloaded_chapters(&self) -> Result<Vec<DownloadedChapter>> {
        let rows = sqlx::query_as::<_, DownloadedChapter>(
            r#"
            SELECT chapter_id, manga_id, source_id, dir_name, path, downloaded_at
            FROM downloaded_chapters
            ORDER BY downloaded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to list downloaded chapters"))?;

        Ok(rows)
    }

    /// Unregister one chapter; returns whether a row was deleted
    pub async fn delete_downloaded_chapter(&self, chapter_id: ChapterId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM downloaded_chapters WHERE chapter_id = ?")
            .bind(chapter_id)
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to delete downloaded chapter"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Unregister every chapter of a manga; returns the removed chapter ids
    pub async fn delete_downloaded_manga(&self, manga_id: MangaId) -> Result<Vec<ChapterId>> {
        let ids: Vec<ChapterId> = sqlx::query_scalar(
            "DELETE FROM downloaded_chapters WHERE manga_id = ? RETURNING chapter_id",
        )
        .bind(manga_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to delete downloaded manga"))?;

        Ok(ids)
    }
}
