//! Download task context -- shared pipeline state and per-chapter paths.

use crate::cache::DownloadCache;
use crate::events::EventBus;
use crate::config::Config;
use crate::error::Error;
use crate::image_cache::ImageCache;
use crate::model::Download;
use crate::notifier::Notifier;
use crate::provider::DownloadProvider;
use crate::types::{DownloadState, Event};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State every chapter task needs, shared by the dispatcher and the downloader
pub(crate) struct PipelineContext {
    pub(crate) config: Arc<Config>,
    pub(crate) provider: DownloadProvider,
    pub(crate) cache: DownloadCache,
    pub(crate) image_cache: Option<ImageCache>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) events: EventBus,
}

impl PipelineContext {
    pub(crate) fn emit_event(&self, event: Event) {
        self.events.publish(event);
    }
}

/// One chapter's run through the pipeline
#[derive(Clone)]
pub(crate) struct ChapterTask {
    pub(crate) ctx: Arc<PipelineContext>,
    pub(crate) download: Arc<Download>,
    /// Cancelled when the pipeline is stopped or paused
    pub(crate) cancel: CancellationToken,
}

/// Where a chapter is staged and where it ends up
#[derive(Clone, Debug)]
pub(crate) struct ChapterPaths {
    pub(crate) manga_dir: PathBuf,
    pub(crate) dir_name: String,
    pub(crate) tmp_dir: PathBuf,
}

impl ChapterTask {
    /// Move the chapter to `Error` and tell the user
    ///
    /// A download a controller already moved on (paused, removed) is left alone.
    pub(crate) fn mark_failed(&self, error: &Error) {
        let download = &self.download;
        let failed = download.transition(DownloadState::Downloading, DownloadState::Error)
            || download.transition(DownloadState::Queue, DownloadState::Error);
        if !failed {
            tracing::debug!(
                chapter_id = download.chapter_id().0,
                status = ?download.status(),
                error = %error,
                "Chapter failed after its state changed, ignoring"
            );
            return;
        }

        tracing::error!(
            chapter_id = download.chapter_id().0,
            manga = %download.manga.title,
            chapter = %download.chapter.name,
            error = %error,
            "Chapter download failed"
        );
        self.notify_error(&error.to_string());
    }

    /// Report a failure scoped to this chapter without changing its state
    pub(crate) fn notify_error(&self, message: &str) {
        let download = &self.download;
        self.ctx.notifier.on_error(
            message,
            Some(download.chapter_id()),
            Some(&download.chapter.name),
            Some(&download.manga.title),
        );
    }
}
