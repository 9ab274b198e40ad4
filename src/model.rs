//! Live download state: [`Download`] (one chapter job) and [`Page`] (one image).
//!
//! Everything here is readable from any task without caller-side locking.
//! Status is stored in atomics, the page list is set once, and progress is
//! published through a `watch` channel so observers only ever see the latest
//! value.

use crate::source::Source;
use crate::types::{Chapter, ChapterId, DownloadProgress, DownloadState, Manga, PageState, SourceId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, watch};

/// One image of a chapter
pub struct Page {
    index: usize,
    url: String,
    image_url: Mutex<Option<String>>,
    file: Mutex<Option<PathBuf>>,
    progress: AtomicU8,
    status: AtomicU8,
}

impl Page {
    /// Create a page; `index` is the pipeline-assigned ordinal
    pub fn new(index: usize, url: impl Into<String>, image_url: Option<String>) -> Self {
        Self {
            index,
            url: url.into(),
            image_url: Mutex::new(image_url.filter(|u| !u.is_empty())),
            file: Mutex::new(None),
            progress: AtomicU8::new(0),
            status: AtomicU8::new(PageState::Queue.to_u8()),
        }
    }

    /// Ordinal within the chapter (0..N-1)
    pub fn index(&self) -> usize {
        self.index
    }

    /// Source-provided page locator
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Remote image locator, once known
    pub async fn image_url(&self) -> Option<String> {
        self.image_url.lock().await.clone()
    }

    pub(crate) async fn set_image_url(&self, url: String) {
        *self.image_url.lock().await = Some(url);
    }

    /// Staged or final local file, once fetched
    pub async fn file(&self) -> Option<PathBuf> {
        self.file.lock().await.clone()
    }

    pub(crate) async fn set_file(&self, path: Option<PathBuf>) {
        *self.file.lock().await = path;
    }

    /// Byte progress of the image fetch (0-100)
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub(crate) fn set_progress(&self, percent: u8) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }

    /// Current page state
    pub fn status(&self) -> PageState {
        PageState::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: PageState) {
        self.status.store(status.to_u8(), Ordering::Release);
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("url", &self.url)
            .field("status", &self.status())
            .field("progress", &self.progress())
            .finish()
    }
}

/// One chapter's download job
pub struct Download {
    /// Source the chapter is fetched from
    pub source: Arc<dyn Source>,
    /// Owning manga
    pub manga: Manga,
    /// Chapter being downloaded
    pub chapter: Chapter,
    status: AtomicI32,
    pages: OnceLock<Vec<Arc<Page>>>,
    downloaded_pages: AtomicUsize,
    progress_tx: watch::Sender<DownloadProgress>,
}

impl Download {
    /// Create a download in the `NotDownloaded` state
    pub fn new(source: Arc<dyn Source>, manga: Manga, chapter: Chapter) -> Self {
        let (progress_tx, _) = watch::channel(DownloadProgress::default());
        Self {
            source,
            manga,
            chapter,
            status: AtomicI32::new(DownloadState::NotDownloaded.to_i32()),
            pages: OnceLock::new(),
            downloaded_pages: AtomicUsize::new(0),
            progress_tx,
        }
    }

    /// Chapter id; the queue is unique by it
    pub fn chapter_id(&self) -> ChapterId {
        self.chapter.id
    }

    /// Source id
    pub fn source_id(&self) -> SourceId {
        self.source.id()
    }

    /// Current state
    pub fn status(&self) -> DownloadState {
        DownloadState::from_i32(self.status.load(Ordering::Acquire))
    }

    /// Unconditional transition; only the coordinator uses it
    pub(crate) fn set_status(&self, status: DownloadState) {
        self.status.store(status.to_i32(), Ordering::Release);
        self.publish();
    }

    /// Move from `from` to `to` if the download is still in `from`
    ///
    /// Returns false when another actor changed the state first. Workers only
    /// ever use this, so a download a controller already moved on is left alone.
    pub(crate) fn transition(&self, from: DownloadState, to: DownloadState) -> bool {
        let changed = self
            .status
            .compare_exchange(from.to_i32(), to.to_i32(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            self.publish();
        }
        changed
    }

    /// Reset to `to` unless the chapter already finished
    pub(crate) fn reset_unless_downloaded(&self, to: DownloadState) -> bool {
        let downloaded = DownloadState::Downloaded.to_i32();
        let target = to.to_i32();
        let changed = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != downloaded && current != target).then_some(target)
            })
            .is_ok();
        if changed {
            self.publish();
        }
        changed
    }

    /// Page list, once fetched from the source
    pub fn pages(&self) -> Option<&[Arc<Page>]> {
        self.pages.get().map(Vec::as_slice)
    }

    /// Store the page list; a list set by an earlier attempt is kept
    pub(crate) fn set_pages(&self, pages: Vec<Arc<Page>>) -> &[Arc<Page>] {
        self.pages.get_or_init(|| pages)
    }

    /// Number of pages that reached [`PageState::Ready`] in the current attempt
    pub fn downloaded_pages(&self) -> usize {
        self.downloaded_pages.load(Ordering::Acquire)
    }

    pub(crate) fn reset_downloaded_pages(&self) {
        self.downloaded_pages.store(0, Ordering::Release);
        self.publish();
    }

    pub(crate) fn increment_downloaded_pages(&self) -> usize {
        let count = self.downloaded_pages.fetch_add(1, Ordering::AcqRel) + 1;
        self.publish();
        count
    }

    /// Page list size, 0 while unknown
    pub fn total_pages(&self) -> usize {
        self.pages().map_or(0, <[_]>::len)
    }

    /// Latest progress snapshot
    pub fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            state: self.status(),
            downloaded_pages: self.downloaded_pages(),
            total_pages: self.total_pages(),
        }
    }

    /// Observe progress; intermediate values are coalesced
    pub fn subscribe_progress(&self) -> watch::Receiver<DownloadProgress> {
        self.progress_tx.subscribe()
    }

    fn publish(&self) {
        // send_replace never fails, even without receivers
        self.progress_tx.send_replace(self.progress());
    }
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("source", &self.source.id())
            .field("manga", &self.manga.id)
            .field("chapter", &self.chapter.id)
            .field("status", &self.status())
            .field("downloaded_pages", &self.downloaded_pages())
            .field("total_pages", &self.total_pages())
            .finish()
    }
}
