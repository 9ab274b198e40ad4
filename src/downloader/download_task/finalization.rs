//! Completion check, materialization and final status.

use crate::archive::write_cbz;
use crate::error::{DownloadError, Error, Result};
use crate::types::{DownloadState, Event};
use crate::utils::{create_nomedia_file, is_primary_page_file};
use std::path::{Path, PathBuf};

use super::context::{ChapterPaths, ChapterTask};

/// Check the staged chapter, materialize it and register it in the cache
///
/// The chapter ends up `Downloaded` or `Error`; nothing in here is
/// interrupted by a pipeline stop.
pub(super) async fn finalize_chapter(task: &ChapterTask, paths: &ChapterPaths) {
    let download = &task.download;

    match complete_chapter(task, paths).await {
        Ok(path) => {
            if download.transition(DownloadState::Downloading, DownloadState::Downloaded) {
                tracing::info!(
                    chapter_id = download.chapter_id().0,
                    manga = %download.manga.title,
                    chapter = %download.chapter.name,
                    path = %path.display(),
                    "Chapter downloaded"
                );
                task.ctx.emit_event(Event::Downloaded {
                    chapter_id: download.chapter_id(),
                    path,
                });
            } else {
                tracing::warn!(
                    chapter_id = download.chapter_id().0,
                    status = ?download.status(),
                    "Chapter materialized after its state changed"
                );
            }
        }
        Err(e) => task.mark_failed(&e),
    }
}

async fn complete_chapter(task: &ChapterTask, paths: &ChapterPaths) -> Result<PathBuf> {
    verify_complete(task, &paths.tmp_dir).await?;

    let save_as_cbz = task.ctx.config.download.save_as_cbz;
    let (tmp_dir, manga_dir, dir_name) = (
        paths.tmp_dir.clone(),
        paths.manga_dir.clone(),
        paths.dir_name.clone(),
    );
    let path = tokio::task::spawn_blocking(move || {
        materialize(&tmp_dir, &manga_dir, &dir_name, save_as_cbz)
    })
    .await
    .map_err(|e| Error::Other(format!("materialization task failed: {e}")))??;

    let download = &task.download;
    task.ctx
        .cache
        .add_chapter(
            download.source_id(),
            download.manga.id,
            download.chapter_id(),
            &path,
        )
        .await?;

    Ok(path)
}

/// All three counts must agree: page list size, ready pages, primary files on disk
async fn verify_complete(task: &ChapterTask, tmp_dir: &Path) -> Result<()> {
    let download = &task.download;
    let expected = download.pages().map(<[_]>::len);
    let ready = download.downloaded_pages();
    let on_disk = count_primary_files(tmp_dir).await?;

    match expected {
        Some(expected) if expected > 0 && ready == expected && on_disk == expected => Ok(()),
        expected => Err(DownloadError::Incomplete {
            chapter: download.chapter_id(),
            expected: expected.unwrap_or(0),
            ready,
            on_disk,
        }
        .into()),
    }
}

/// Number of primary page images in a staging directory
///
/// Markers, partial files and non-first split fragments do not count.
pub(super) async fn count_primary_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if is_primary_page_file(&entry.file_name().to_string_lossy()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Move a verified staging directory to its final form; returns the final path
///
/// The `.nomedia` marker is written first so it travels with the directory or
/// becomes an archive entry. Blocking.
fn materialize(tmp_dir: &Path, manga_dir: &Path, dir_name: &str, save_as_cbz: bool) -> Result<PathBuf> {
    create_nomedia_file(tmp_dir)?;

    if save_as_cbz {
        return Ok(write_cbz(tmp_dir, manga_dir, dir_name)?.path);
    }

    let dest = manga_dir.join(dir_name);
    std::fs::rename(tmp_dir, &dest).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to move '{}' to '{}': {}",
                tmp_dir.display(),
                dest.display(),
                e
            ),
        ))
    })?;
    Ok(dest)
}
