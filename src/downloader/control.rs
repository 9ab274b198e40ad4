//! Pipeline control -- start, stop, pause, clear and remove.
//!
//! Every method here is a request to the coordinator task, which applies them
//! one at a time.

use crate::error::Result;
use crate::types::ChapterId;
use std::sync::atomic::Ordering;

use super::ChapterDownloader;
use super::coordinator::Command;

impl ChapterDownloader {
    /// Start the download pipeline
    ///
    /// Every queued chapter that is not yet downloaded (including failed ones)
    /// is reset to `Queue` and handed to the pipeline.
    ///
    /// # Returns
    ///
    /// `false` if the pipeline was already running or there is nothing to
    /// download.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use chapter_dl::*;
    /// # async fn example(downloader: ChapterDownloader) -> Result<()> {
    /// if !downloader.start().await? {
    ///     println!("nothing to do");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self) -> Result<bool> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Stop the download pipeline
    ///
    /// In-flight chapters are abandoned at their next await point and marked
    /// `Error`, so the next [`start`](Self::start) retries them. Pages already
    /// staged are reused by that retry.
    ///
    /// With a `reason` the notifier shows it as a warning; otherwise it
    /// reports "paused" (after [`pause`](Self::pause) with work left) or
    /// "complete".
    pub async fn stop(&self, reason: Option<String>) -> Result<()> {
        self.request(|reply| Command::Stop { reason, reply }).await
    }

    /// Pause the download pipeline
    ///
    /// Like [`stop`](Self::stop), but in-flight chapters go back to `Queue`.
    /// Resume with [`start`](Self::start).
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Stop the pipeline and empty the queue and its persisted copy
    ///
    /// # Arguments
    ///
    /// * `is_notification` - also reset chapters still waiting in the queue to
    ///   `NotDownloaded` (the user dismissed the queue); chapters that were in
    ///   flight are always reset
    pub async fn clear_queue(&self, is_notification: bool) -> Result<()> {
        self.request(|reply| Command::Clear {
            is_notification,
            reply,
        })
        .await?
    }

    /// Remove specific chapters from the queue
    ///
    /// A chapter being downloaded is interrupted; the pipeline restarts with
    /// the remaining queue, or stops when nothing is left.
    ///
    /// # Returns
    ///
    /// The number of chapters that were queued and are now removed.
    pub async fn remove_chapters(&self, chapter_ids: &[ChapterId]) -> Result<usize> {
        if chapter_ids.is_empty() {
            return Ok(0);
        }
        self.request(|reply| Command::Remove {
            chapter_ids: chapter_ids.to_vec(),
            reply,
        })
        .await?
    }

    /// Whether the pipeline is running
    pub fn is_running(&self) -> bool {
        self.handle.flags.running.load(Ordering::SeqCst)
    }

    /// Whether the pipeline was paused (and not started or stopped since)
    pub fn is_paused(&self) -> bool {
        self.handle.flags.paused.load(Ordering::SeqCst)
    }
}
