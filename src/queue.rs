//! The download queue.
//!
//! Ordered and unique by chapter id. Every mutation is mirrored to the
//! durable store before it becomes visible, so a restart sees the same queue.
//! Mutations are crate-private and only ever issued by the coordinator task;
//! reads are safe from anywhere.

use crate::db::Database;
use crate::error::Result;
use crate::model::Download;
use crate::types::{ChapterId, DownloadState, QueueStats};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered collection of [`Download`]s
pub struct DownloadQueue {
    downloads: RwLock<Vec<Arc<Download>>>,
    db: Arc<Database>,
}

impl DownloadQueue {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self {
            downloads: RwLock::new(Vec::new()),
            db,
        }
    }

    /// Append downloads whose chapter is not queued yet
    ///
    /// Added downloads are reset to [`DownloadState::Queue`]. Returns the
    /// downloads that were actually added, in order.
    pub(crate) async fn add_all(&self, downloads: Vec<Arc<Download>>) -> Result<Vec<Arc<Download>>> {
        let mut queue = self.downloads.write().await;

        let mut seen: HashSet<ChapterId> = queue.iter().map(|d| d.chapter_id()).collect();
        let added: Vec<Arc<Download>> = downloads
            .into_iter()
            .filter(|d| seen.insert(d.chapter_id()))
            .collect();
        if added.is_empty() {
            return Ok(added);
        }

        let entries: Vec<_> = added.iter().map(|d| (&d.manga, &d.chapter)).collect();
        self.db.save_queue_entries(&entries).await?;

        for download in &added {
            download.set_status(DownloadState::Queue);
        }
        queue.extend(added.iter().cloned());

        tracing::debug!(added = added.len(), total = queue.len(), "Downloads queued");
        Ok(added)
    }

    /// Remove one download
    ///
    /// A download still waiting or running goes back to `NotDownloaded`.
    pub(crate) async fn remove(&self, chapter_id: ChapterId) -> Result<Option<Arc<Download>>> {
        Ok(self.remove_chapters(&[chapter_id]).await?.into_iter().next())
    }

    /// Remove several downloads; returns the ones that were queued
    pub(crate) async fn remove_chapters(&self, chapter_ids: &[ChapterId]) -> Result<Vec<Arc<Download>>> {
        let mut queue = self.downloads.write().await;

        let targets: HashSet<ChapterId> = chapter_ids.iter().copied().collect();
        let present: Vec<ChapterId> = queue
            .iter()
            .map(|d| d.chapter_id())
            .filter(|id| targets.contains(id))
            .collect();
        if present.is_empty() {
            return Ok(Vec::new());
        }

        self.db.remove_queue_entries(&present).await?;

        let mut removed = Vec::with_capacity(present.len());
        queue.retain(|d| {
            if targets.contains(&d.chapter_id()) {
                removed.push(d.clone());
                false
            } else {
                true
            }
        });

        for download in &removed {
            if !download.transition(DownloadState::Downloading, DownloadState::NotDownloaded) {
                download.transition(DownloadState::Queue, DownloadState::NotDownloaded);
            }
        }

        Ok(removed)
    }

    /// Remove everything; statuses are left as they are
    pub(crate) async fn clear(&self) -> Result<Vec<Arc<Download>>> {
        let mut queue = self.downloads.write().await;
        self.db.clear_queue_entries().await?;
        Ok(std::mem::take(&mut *queue))
    }

    /// Copy of the queue, in order
    pub async fn snapshot(&self) -> Vec<Arc<Download>> {
        self.downloads.read().await.clone()
    }

    /// Number of downloads
    pub async fn len(&self) -> usize {
        self.downloads.read().await.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.downloads.read().await.is_empty()
    }

    /// Whether a chapter is queued
    pub async fn contains(&self, chapter_id: ChapterId) -> bool {
        self.downloads
            .read()
            .await
            .iter()
            .any(|d| d.chapter_id() == chapter_id)
    }

    /// Look up a download by chapter
    pub async fn find(&self, chapter_id: ChapterId) -> Option<Arc<Download>> {
        self.downloads
            .read()
            .await
            .iter()
            .find(|d| d.chapter_id() == chapter_id)
            .cloned()
    }

    /// Count downloads matching a predicate
    pub async fn count_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Download) -> bool,
    {
        self.downloads
            .read()
            .await
            .iter()
            .filter(|d| predicate(d))
            .count()
    }

    /// Downloads waiting or running, in order
    pub async fn pending(&self) -> Vec<Arc<Download>> {
        self.downloads
            .read()
            .await
            .iter()
            .filter(|d| d.status().is_active())
            .cloned()
            .collect()
    }

    /// Whether nothing is waiting or running
    pub async fn all_finished(&self) -> bool {
        !self
            .downloads
            .read()
            .await
            .iter()
            .any(|d| d.status().is_active())
    }

    /// Counts per state
    pub async fn stats(&self) -> QueueStats {
        let queue = self.downloads.read().await;
        let mut stats = QueueStats {
            total: queue.len(),
            ..QueueStats::default()
        };
        for download in queue.iter() {
            match download.status() {
                DownloadState::Queue => stats.queued += 1,
                DownloadState::Downloading => stats.downloading += 1,
                DownloadState::Downloaded => stats.downloaded += 1,
                DownloadState::Error => stats.errored += 1,
                DownloadState::NotDownloaded => {}
            }
        }
        stats
    }
}
