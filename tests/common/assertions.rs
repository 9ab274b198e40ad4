//! Waiting helpers and filesystem assertions

use chapter_dl::{ChapterDownloader, Event, EventReceiver};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Wait until the queue is empty and the pipeline stopped
///
/// Returns false on timeout.
pub async fn wait_for_idle(downloader: &ChapterDownloader, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if downloader.queue().all_finished().await && !downloader.is_running() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Wait until at least `count` chapters are registered as downloaded
pub async fn wait_for_downloaded(
    events: &mut EventReceiver,
    count: usize,
    timeout: Duration,
) -> usize {
    let mut seen = 0;
    let _ = tokio::time::timeout(timeout, async {
        while seen < count {
            match events.recv().await {
                Some(Event::Downloaded { .. }) => seen += 1,
                Some(_) => {}
                None => break,
            }
        }
    })
    .await;
    seen
}

/// Drain every event currently buffered
pub fn drain_events(events: &mut EventReceiver) -> Vec<Event> {
    std::iter::from_fn(|| events.try_recv()).collect()
}

/// Every regular file under `root`, relative to it, sorted
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Staging directories (`*_tmp`) left anywhere under `root`
pub fn staging_dirs(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with("_tmp"))
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

/// Page images (anything but `.nomedia`) directly inside `dir`
pub fn page_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", dir.display(), e))
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name != ".nomedia")
        .collect();
    names.sort();
    names
}
