//! Checks run before any byte of a chapter is fetched.

use crate::error::{Error, Result};
use crate::provider::DownloadProvider;
use crate::utils::{TMP_FILE_EXTENSION, get_available_space};
use std::path::Path;

use super::context::{ChapterPaths, ChapterTask};

/// Resolve the chapter's directories, check free space and create the staging directory
pub(super) async fn prepare_workspace(task: &ChapterTask) -> Result<ChapterPaths> {
    let download = &task.download;
    let source_dir =
        DownloadProvider::source_dir_name(download.source.name(), download.source.lang());
    let manga_dir = task.ctx.provider.manga_dir(&source_dir, &download.manga);

    tokio::fs::create_dir_all(&manga_dir).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create manga directory '{}': {}",
                manga_dir.display(),
                e
            ),
        ))
    })?;

    check_disk_space(&manga_dir, task.ctx.config.download.min_free_space)?;

    let dir_name = DownloadProvider::chapter_dir_name(&download.chapter);
    let tmp_dir = manga_dir.join(DownloadProvider::tmp_dir_name(&dir_name));
    tokio::fs::create_dir_all(&tmp_dir).await?;

    Ok(ChapterPaths {
        manga_dir,
        dir_name,
        tmp_dir,
    })
}

/// Refuse to start when the destination volume is nearly full
///
/// A volume whose free space cannot be determined is not held against the
/// chapter.
pub(super) fn check_disk_space(dir: &Path, required: u64) -> Result<()> {
    match get_available_space(dir) {
        Ok(available) if available < required => {
            Err(Error::InsufficientSpace { required, available })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(
                dir = %dir.display(),
                error = %e,
                "Could not determine free space, continuing"
            );
            Ok(())
        }
    }
}

/// Delete partial `.tmp` files left behind by an interrupted attempt
pub(super) async fn purge_partial_files(tmp_dir: &Path) -> Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(tmp_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == TMP_FILE_EXTENSION)
            && entry.file_type().await?.is_file()
        {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!(dir = %tmp_dir.display(), removed, "Removed partial page files");
    }
    Ok(removed)
}
