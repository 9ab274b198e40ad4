//! Startup restore and shutdown coordination.

use crate::error::Result;
use crate::model::Download;
use crate::provider::DownloadProvider;
use crate::types::{ChapterId, Event};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::ChapterDownloader;
use super::coordinator::Command;

/// How long shutdown waits for in-flight chapters to return
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl ChapterDownloader {
    /// Rebuild the queue persisted by the previous session
    ///
    /// Entries whose chapter is already in the download cache or on disk are
    /// dropped from the store. Entries whose source is not registered stay in
    /// the store and come back once the source is registered again.
    ///
    /// # Returns
    ///
    /// The number of downloads restored into the queue.
    pub(crate) async fn restore_queue(&self) -> Result<usize> {
        let stored = self.db.restore_queue_entries().await?;
        if stored.is_empty() {
            return Ok(0);
        }

        let mut downloads = Vec::with_capacity(stored.len());
        let mut already_downloaded: Vec<ChapterId> = Vec::new();
        let mut unknown_source = 0usize;

        for entry in stored {
            let Some(source) = self.sources.get(entry.source_id) else {
                tracing::warn!(
                    chapter_id = entry.chapter_id.0,
                    source = entry.source_id.0,
                    "Source not registered, leaving chapter out of the restored queue"
                );
                unknown_source += 1;
                continue;
            };

            let (manga, chapter) = entry.into_parts();
            let source_dir = DownloadProvider::source_dir_name(source.name(), source.lang());
            if self.pipeline.cache.is_chapter_downloaded(chapter.id).await
                || self
                    .pipeline
                    .provider
                    .find_chapter_dir(&source_dir, &manga, &chapter)
                    .is_some()
            {
                already_downloaded.push(chapter.id);
                continue;
            }

            downloads.push(Arc::new(Download::new(source, manga, chapter)));
        }

        if !already_downloaded.is_empty() {
            self.db.remove_queue_entries(&already_downloaded).await?;
        }

        let restored = if downloads.is_empty() {
            0
        } else {
            self.request(|reply| Command::Enqueue {
                downloads,
                auto_start: false,
                reply,
            })
            .await??
            .len()
        };

        tracing::info!(
            restored,
            already_downloaded = already_downloaded.len(),
            unknown_source,
            "Restored download queue from previous session"
        );
        Ok(restored)
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new chapters
    /// 2. Pauses the pipeline; in-flight chapters return to `Queue` so the next
    ///    session resumes them (waits at most 30 seconds)
    /// 3. Stops the coordinator task
    /// 4. Marks a clean shutdown in the database
    /// 5. Emits [`Event::Shutdown`] and closes the database pool
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if marking the clean shutdown fails. The remaining
    /// steps are still attempted.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.handle.accepting_new.swap(false, Ordering::SeqCst) {
            tracing::debug!("Shutdown already performed");
            return Ok(());
        }
        tracing::info!("Initiating graceful shutdown");

        match tokio::time::timeout(
            SHUTDOWN_TIMEOUT,
            self.request(|reply| Command::Shutdown { reply }),
        )
        .await
        {
            Ok(Ok(())) => tracing::info!("Download pipeline stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Coordinator already stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for downloads to stop, proceeding with shutdown")
            }
        }

        if let Some(mut task) = self.handle.task.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Coordinator task failed"),
                Err(_) => {
                    tracing::warn!("Coordinator did not stop in time, aborting it");
                    task.abort();
                }
            }
        }

        let marked = self.db.set_clean_shutdown().await;
        match &marked {
            Ok(()) => tracing::info!("Marked clean shutdown in database"),
            Err(e) => tracing::error!(error = %e, "Failed to mark clean shutdown in database"),
        }

        self.events.publish(Event::Shutdown);
        self.db.pool().close().await;

        tracing::info!("Graceful shutdown complete");
        marked
    }
}
