//! Top-level chapter task lifecycle.
//!
//! Phases: workspace preflight, page fetching (abandoned as soon as the
//! pipeline is cancelled), then completion check and materialization, which
//! always run to the end once started.

use crate::error::{Error, Result};
use crate::types::{DownloadState, PageState};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

use super::context::{ChapterPaths, ChapterTask};
use super::finalization::finalize_chapter;
use super::pages::{download_pages, resolve_page_list};
use super::preflight::{prepare_workspace, purge_partial_files};

/// Run one chapter through the pipeline
///
/// Never fails: every outcome is recorded on the download and reported through
/// the notifier. A panic inside the task marks the chapter as failed.
pub(crate) async fn run_download_task(task: ChapterTask) {
    let outcome = AssertUnwindSafe(run_chapter(&task)).catch_unwind().await;

    if let Err(panic) = outcome {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        task.mark_failed(&Error::Other(format!("chapter task panicked: {message}")));
    }
}

async fn run_chapter(task: &ChapterTask) {
    let download = &task.download;
    tracing::info!(
        chapter_id = download.chapter_id().0,
        source = download.source_id().0,
        manga = %download.manga.title,
        chapter = %download.chapter.name,
        "Starting chapter download"
    );

    // Phase 1: directories and free space
    let paths = match prepare_workspace(task).await {
        Ok(paths) => paths,
        Err(e) => {
            task.mark_failed(&e);
            return;
        }
    };

    // Phase 2: page list and images
    let fetched = tokio::select! {
        biased;
        _ = task.cancel.cancelled() => None,
        result = fetch_pages(task, &paths) => Some(result),
    };

    match fetched {
        None => {
            tracing::debug!(chapter_id = download.chapter_id().0, "Chapter interrupted");
            return;
        }
        Some(Err(e)) => {
            task.mark_failed(&e);
            return;
        }
        Some(Ok(false)) => return,
        Some(Ok(true)) => {}
    }

    if task.cancel.is_cancelled() {
        tracing::debug!(
            chapter_id = download.chapter_id().0,
            "Chapter interrupted before materialization"
        );
        return;
    }

    // Phase 3: completion check and materialization
    finalize_chapter(task, &paths).await;
}

/// Returns false when a controller moved the download on before it started
async fn fetch_pages(task: &ChapterTask, paths: &ChapterPaths) -> Result<bool> {
    let download = &task.download;

    purge_partial_files(&paths.tmp_dir).await?;
    let pages = resolve_page_list(task).await?;

    for page in &pages {
        page.set_status(PageState::Queue);
    }
    download.reset_downloaded_pages();

    if !download.transition(DownloadState::Queue, DownloadState::Downloading) {
        tracing::debug!(
            chapter_id = download.chapter_id().0,
            status = ?download.status(),
            "Download no longer queued, skipping"
        );
        return Ok(false);
    }

    download_pages(task, paths, &pages).await;

    tracing::debug!(
        chapter_id = download.chapter_id().0,
        ready = download.downloaded_pages(),
        total = pages.len(),
        "Page fetching finished"
    );
    Ok(true)
}
