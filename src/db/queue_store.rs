//! Durable mirror of the download queue.
//!
//! Only identity and descriptive fields are stored. Live state (status, pages,
//! progress) is rebuilt when the queue is restored.

use crate::Result;
use crate::types::{Chapter, ChapterId, Manga};

use super::{Database, StoredDownload, query_failed};

impl Database {
    /// Persist queue entries in order
    ///
    /// Entries already stored keep their original position, so re-adding a
    /// restored queue is a no-op.
    pub async fn save_queue_entries(&self, entries: &[(&Manga, &Chapter)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("Failed to begin queue save"))?;

        for (manga, chapter) in entries {
            sqlx::query(
                r#"
                INSERT INTO queue_entries (
                    chapter_id, position, source_id, manga_id, manga_title,
                    chapter_name, scanlator, chapter_url, source_order, created_at
                )
                VALUES (
                    ?, (SELECT COALESCE(MAX(position), 0) + 1 FROM queue_entries),
                    ?, ?, ?, ?, ?, ?, ?, ?
                )
                ON CONFLICT(chapter_id) DO NOTHING
                "#,
            )
            .bind(chapter.id)
            .bind(manga.source)
            .bind(manga.id)
            .bind(&manga.title)
            .bind(&chapter.name)
            .bind(&chapter.scanlator)
            .bind(&chapter.url)
            .bind(chapter.source_order)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(query_failed("Failed to save queue entry"))?;
        }

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit queue save"))?;

        Ok(())
    }

    /// Remove queue entries by chapter id
    pub async fn remove_queue_entries(&self, chapter_ids: &[ChapterId]) -> Result<()> {
        if chapter_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(query_failed("Failed to begin queue removal"))?;

        for id in chapter_ids {
            sqlx::query("DELETE FROM queue_entries WHERE chapter_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(query_failed("Failed to remove queue entry"))?;
        }

        tx.commit()
            .await
            .map_err(query_failed("Failed to commit queue removal"))?;

        Ok(())
    }

    /// Remove every queue entry
    pub async fn clear_queue_entries(&self) -> Result<()> {
        sqlx::query("DELETE FROM queue_entries")
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to clear queue"))?;

        Ok(())
    }

    /// Load the persisted queue in insertion order
    ///
    /// Does not modify the store.
    pub async fn restore_queue_entries(&self) -> Result<Vec<StoredDownload>> {
        let rows = sqlx::query_as::<_, StoredDownload>(
            r#"
            SELECT chapter_id, position, source_id, manga_id, manga_title,
                   chapter_name, scanlator, chapter_url, source_order
            FROM queue_entries
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("Failed to restore queue"))?;

        Ok(rows)
    }
}
