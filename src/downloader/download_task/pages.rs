//! Page list resolution and per-page image acquisition.
//!
//! Each page is looked up in order: a file already staged by an earlier
//! attempt, the reader's image cache, then the network. Page failures are
//! recorded on the page and reported; they never abort sibling pages.

use crate::error::{DownloadError, Error, Result};
use crate::imaging::{SNIFF_LEN, SplitOutcome, extension_for, read_leading_bytes, split_tall_image};
use crate::model::Page;
use crate::retry::with_retry;
use crate::source::ImageResponse;
use crate::types::PageState;
use crate::utils::{SPLIT_SEPARATOR, TMP_FILE_EXTENSION, page_file_stem};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::context::{ChapterPaths, ChapterTask};

/// Page list of the chapter, fetched and re-indexed on first use
///
/// The indices a source reports are ignored; pages are numbered 0..N-1 in the
/// order they were returned.
pub(super) async fn resolve_page_list(task: &ChapterTask) -> Result<Vec<Arc<Page>>> {
    let download = &task.download;
    if let Some(pages) = download.pages() {
        return Ok(pages.to_vec());
    }

    let remote = download.source.fetch_page_list(&download.chapter).await?;
    if remote.is_empty() {
        return Err(DownloadError::EmptyPageList {
            chapter: download.chapter_id(),
        }
        .into());
    }

    let pages = remote
        .into_iter()
        .enumerate()
        .map(|(index, page)| Arc::new(Page::new(index, page.url, page.image_url)))
        .collect();

    let pages = download.set_pages(pages).to_vec();
    tracing::debug!(
        chapter_id = download.chapter_id().0,
        pages = pages.len(),
        "Fetched page list"
    );
    Ok(pages)
}

/// Fetch every page, at most `max_concurrent_pages` at a time
pub(super) async fn download_pages(task: &ChapterTask, paths: &ChapterPaths, pages: &[Arc<Page>]) {
    let page_count = pages.len();
    let concurrency = task.ctx.config.download.max_concurrent_pages.max(1);

    futures::stream::iter(pages.iter().cloned())
        .map(|page| async move {
            download_page(task, paths, &page, page_count).await;
        })
        .buffer_unordered(concurrency)
        .for_each(|()| async move {
            task.ctx.notifier.on_progress(&task.download);
        })
        .await;
}

/// Acquire one page and record the outcome on it
async fn download_page(task: &ChapterTask, paths: &ChapterPaths, page: &Page, page_count: usize) {
    match acquire_page(task, paths, page, page_count).await {
        Ok(file) => {
            page.set_file(Some(file)).await;
            page.set_progress(100);
            page.set_status(PageState::Ready);
            task.download.increment_downloaded_pages();
        }
        Err(e) => {
            page.set_progress(0);
            page.set_status(PageState::Error);
            tracing::warn!(
                chapter_id = task.download.chapter_id().0,
                page = page.index(),
                error = %e,
                "Page download failed"
            );
            task.notify_error(&format!("Page {}: {}", page.index() + 1, e));
        }
    }
}

async fn acquire_page(
    task: &ChapterTask,
    paths: &ChapterPaths,
    page: &Page,
    page_count: usize,
) -> Result<PathBuf> {
    let image_url = resolve_image_url(task, page).await?;
    let stem = page_file_stem(page.index(), page_count);

    // A partial file from an aborted attempt is never reused
    let partial = paths.tmp_dir.join(format!("{stem}.{TMP_FILE_EXTENSION}"));
    if tokio::fs::try_exists(&partial).await? {
        tokio::fs::remove_file(&partial).await?;
    }

    let file = if let Some(staged) = find_staged_page(&paths.tmp_dir, &stem).await? {
        tracing::trace!(page = page.index(), file = %staged.display(), "Reusing staged page");
        staged
    } else if let Some(cache) = &task.ctx.image_cache
        && cache.is_image_in_cache(&image_url).await
    {
        let file = copy_from_image_cache(task, &image_url, &paths.tmp_dir, &stem).await?;
        if let Err(e) = cache.remove_image(&image_url).await {
            tracing::warn!(
                page = page.index(),
                url = %image_url,
                error = %e,
                "Failed to evict cached image"
            );
        }
        file
    } else {
        page.set_status(PageState::DownloadImage);
        page.set_progress(0);
        with_retry(&task.ctx.config.retry, || {
            fetch_image_to_file(task, page, &image_url, &paths.tmp_dir, &stem)
        })
        .await?
    };

    if !task.ctx.config.download.split_tall_images {
        return Ok(file);
    }

    match split_page(task, &file, &stem).await {
        Ok(Some(first)) => Ok(first),
        Ok(None) => Ok(file),
        Err(e) => {
            // The unsplit page is still a valid page
            tracing::warn!(file = %file.display(), error = %e, "Failed to split tall image");
            task.notify_error(&format!("Failed to split page {}: {}", page.index() + 1, e));
            Ok(file)
        }
    }
}

/// Image URL of a page, asking the source when the page list did not carry one
async fn resolve_image_url(task: &ChapterTask, page: &Page) -> Result<String> {
    if let Some(url) = page.image_url().await {
        return Ok(url);
    }

    page.set_status(PageState::LoadPage);
    let resolved = with_retry(&task.ctx.config.retry, || async move {
        task.download
            .source
            .fetch_image_url(page.url())
            .await
            .map_err(Error::from)
    })
    .await?;

    match resolved.filter(|url| !url.is_empty()) {
        Some(url) => {
            page.set_image_url(url.clone()).await;
            Ok(url)
        }
        None => Err(DownloadError::MissingImageUrl {
            index: page.index(),
        }
        .into()),
    }
}

/// A finished file for `stem` left in the workspace by an earlier attempt
///
/// Matches `<stem>.<ext>` and the first split fragment `<stem>__001.jpg`.
pub(super) async fn find_staged_page(tmp_dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let plain = format!("{stem}.");
    let fragment = format!("{stem}{SPLIT_SEPARATOR}001");
    let partial = format!(".{TMP_FILE_EXTENSION}");

    let mut entries = tokio::fs::read_dir(tmp_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(&partial) {
            continue;
        }
        if (name.starts_with(&plain) || name.starts_with(&fragment))
            && entry.file_type().await?.is_file()
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Copy a cached image into the workspace under its sniffed extension
async fn copy_from_image_cache(
    task: &ChapterTask,
    image_url: &str,
    tmp_dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    let Some(cache) = &task.ctx.image_cache else {
        return Err(Error::Other("image cache is not configured".to_string()));
    };

    let tmp_path = tmp_dir.join(format!("{stem}.{TMP_FILE_EXTENSION}"));
    tokio::fs::copy(cache.image_path(image_url), &tmp_path).await?;

    let sniff_path = tmp_path.clone();
    let leading = tokio::task::spawn_blocking(move || read_leading_bytes(&sniff_path))
        .await
        .map_err(|e| Error::Other(format!("sniff task failed: {e}")))??;

    let dest = tmp_dir.join(format!("{stem}.{}", extension_for(None, image_url, &leading)));
    tokio::fs::rename(&tmp_path, &dest).await?;
    tracing::debug!(file = %dest.display(), "Copied page from image cache");
    Ok(dest)
}

/// One network attempt: stream the image into `<stem>.tmp`, then rename it
///
/// The partial file is removed when the attempt fails.
async fn fetch_image_to_file(
    task: &ChapterTask,
    page: &Page,
    image_url: &str,
    tmp_dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    let tmp_path = tmp_dir.join(format!("{stem}.{TMP_FILE_EXTENSION}"));

    let (content_type, leading) = match stream_image(task, page, image_url, &tmp_path).await {
        Ok(written) => written,
        Err(e) => {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(e);
        }
    };

    let extension = extension_for(content_type.as_deref(), image_url, &leading);
    let dest = tmp_dir.join(format!("{stem}.{extension}"));
    tokio::fs::rename(&tmp_path, &dest).await?;
    Ok(dest)
}

/// Write the response body to `path`; returns the content type and leading bytes
async fn stream_image(
    task: &ChapterTask,
    page: &Page,
    image_url: &str,
    path: &Path,
) -> Result<(Option<String>, Vec<u8>)> {
    let ImageResponse {
        content_type,
        content_length,
        mut body,
    } = task.download.source.fetch_image(image_url).await?;

    let mut file = tokio::fs::File::create(path).await?;
    let mut leading = Vec::with_capacity(SNIFF_LEN);
    let mut received: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if leading.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - leading.len()).min(chunk.len());
            leading.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;

        if let Some(total) = content_length.filter(|t| *t > 0) {
            let percent = (received.saturating_mul(100) / total).min(100) as u8;
            if percent != page.progress() {
                page.set_progress(percent);
                task.ctx.notifier.on_page_progress(&task.download, page);
            }
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok((content_type, leading))
}

/// Split a tall page; returns the first fragment when the page was split
async fn split_page(task: &ChapterTask, file: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let config = &task.ctx.config.download;
    let (file, stem) = (file.to_path_buf(), stem.to_string());
    let (ratio, split_height) = (config.tall_image_ratio, config.split_height);

    let outcome =
        tokio::task::spawn_blocking(move || split_tall_image(&file, &stem, ratio, split_height))
            .await
            .map_err(|e| Error::Other(format!("split task failed: {e}")))??;

    Ok(match outcome {
        SplitOutcome::Split(fragments) => fragments.into_iter().next(),
        SplitOutcome::AlreadySplit | SplitOutcome::NotTall => None,
    })
}
