//! Enqueueing chapters and the queue size warning.

use crate::config::QueueWarningConfig;
use crate::error::{Error, Result};
use crate::model::Download;
use crate::provider::DownloadProvider;
use crate::types::{Chapter, Manga, SourceId};
use std::collections::HashMap;
use std::sync::Arc;

use super::ChapterDownloader;
use super::coordinator::Command;

impl ChapterDownloader {
    /// Queue chapters of a manga for download
    ///
    /// Chapters already downloaded (according to the download cache, then the
    /// filesystem) or already queued are skipped. The rest are queued newest
    /// first (descending `source_order`) and handed to the running pipeline.
    ///
    /// With `auto_start`, a queue that was empty before this call starts the
    /// pipeline, after warning when a large number of chapters from metered
    /// sources were queued.
    ///
    /// # Returns
    ///
    /// The number of chapters actually added.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownSource`] if the manga's source is not registered
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - Database errors while persisting the queue
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use chapter_dl::*;
    /// # async fn example(downloader: ChapterDownloader, manga: Manga, chapters: Vec<Chapter>) -> Result<()> {
    /// let added = downloader.queue_chapters(&manga, chapters, true).await?;
    /// println!("{added} chapters queued");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn queue_chapters(
        &self,
        manga: &Manga,
        chapters: Vec<Chapter>,
        auto_start: bool,
    ) -> Result<usize> {
        if chapters.is_empty() {
            return Ok(0);
        }
        if !self.is_accepting() {
            return Err(Error::ShuttingDown);
        }

        let source = self
            .sources
            .get(manga.source)
            .ok_or(Error::UnknownSource(manga.source.0))?;
        let source_dir = DownloadProvider::source_dir_name(source.name(), source.lang());

        let mut to_queue = Vec::with_capacity(chapters.len());
        for chapter in chapters {
            if self.pipeline.cache.is_chapter_downloaded(chapter.id).await {
                continue;
            }
            if let Some(existing) = self
                .pipeline
                .provider
                .find_chapter_dir(&source_dir, manga, &chapter)
            {
                tracing::debug!(
                    chapter_id = chapter.id.0,
                    path = %existing.display(),
                    "Chapter already on disk, not queueing"
                );
                continue;
            }
            if self.queue.contains(chapter.id).await {
                continue;
            }
            to_queue.push(chapter);
        }

        if to_queue.is_empty() {
            return Ok(0);
        }
        to_queue.sort_by(|a, b| b.source_order.cmp(&a.source_order));

        let downloads = to_queue
            .into_iter()
            .map(|chapter| Arc::new(Download::new(source.clone(), manga.clone(), chapter)))
            .collect();

        let added = self
            .request(|reply| Command::Enqueue {
                downloads,
                auto_start,
                reply,
            })
            .await??;
        Ok(added.len())
    }
}

/// Warning text when too many chapters from metered sources are queued
///
/// Unmetered sources never count. Fires when the total exceeds
/// `max_queued_downloads` or one source exceeds `max_chapters_per_source`.
pub(crate) fn queue_size_warning(
    downloads: &[Arc<Download>],
    config: &QueueWarningConfig,
) -> Option<String> {
    let mut per_source: HashMap<SourceId, usize> = HashMap::new();
    for download in downloads.iter().filter(|d| !d.source.is_unmetered()) {
        *per_source.entry(download.source_id()).or_default() += 1;
    }

    let total: usize = per_source.values().sum();
    let busiest = per_source.values().copied().max().unwrap_or(0);

    if total > config.max_queued_downloads {
        Some(format!(
            "{total} chapters queued; large bulk downloads may get you rate limited or blocked by sources"
        ))
    } else if busiest > config.max_chapters_per_source {
        Some(format!(
            "{busiest} chapters queued from one source; it may slow down or block further downloads"
        ))
    } else {
        None
    }
}
