//! Shared test helpers for creating ChapterDownloader instances in tests.

use crate::config::Config;
use crate::downloader::ChapterDownloader;
use crate::error::SourceError;
use crate::model::{Download, Page};
use crate::notifier::Notifier;
use crate::provider::DownloadProvider;
use crate::source::test_support::StaticSource;
use crate::source::{ImageResponse, RemotePage, Source, SourceRegistry};
use crate::types::{Chapter, ChapterId, Manga, MangaId, SourceId};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Configuration rooted in `dir` with fast retries and no free-space floor
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.min_free_space = 0;
    config.persistence.database_path = dir.join("test.db");
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config
}

/// Helper to create a test ChapterDownloader reporting into a [`RecordingNotifier`].
/// The tempdir must be kept alive by the caller.
pub(crate) async fn create_test_downloader(
    dir: &Path,
    sources: SourceRegistry,
) -> (ChapterDownloader, Arc<RecordingNotifier>) {
    create_test_downloader_with(test_config(dir), sources).await
}

pub(crate) async fn create_test_downloader_with(
    config: Config,
    sources: SourceRegistry,
) -> (ChapterDownloader, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let downloader = ChapterDownloader::with_notifier(config, sources, notifier.clone())
        .await
        .unwrap();
    (downloader, notifier)
}

pub(crate) fn manga(source: i64) -> Manga {
    Manga {
        id: MangaId(source * 100),
        source: SourceId(source),
        title: format!("Manga {source}"),
    }
}

pub(crate) fn chapter(manga: &Manga, id: i64, source_order: i64) -> Chapter {
    Chapter {
        id: ChapterId(id),
        manga_id: manga.id,
        name: format!("Ch. {id}"),
        scanlator: None,
        url: format!("/chapters/{id}"),
        source_order,
    }
}

/// Smallest byte string the image sniffer recognizes as PNG
pub(crate) fn png_bytes() -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(&[0u8; 24]);
    data
}

/// Pages whose image URLs are `https://img.test/<i>.png`
pub(crate) fn remote_pages(count: usize) -> Vec<RemotePage> {
    (0..count)
        .map(|i| RemotePage {
            index: i + 10,
            url: format!("https://img.test/page/{i}"),
            image_url: Some(format!("https://img.test/{i}.png")),
        })
        .collect()
}

/// StaticSource serving every page of [`remote_pages`]
pub(crate) fn serving_source(id: i64, pages: usize) -> StaticSource {
    (0..pages).fold(
        StaticSource::new(id, remote_pages(pages)),
        |source, i| source.with_image(&format!("https://img.test/{i}.png"), Some("image/png"), png_bytes()),
    )
}

pub(crate) fn download(source: Arc<dyn Source>, chapter_id: i64) -> Arc<Download> {
    let manga = manga(source.id().0);
    let chapter = chapter(&manga, chapter_id, chapter_id);
    Arc::new(Download::new(source, manga, chapter))
}

/// Final directory of a chapter under `config`'s download root
pub(crate) fn chapter_dir(config: &Config, source: &dyn Source, manga: &Manga, chapter: &Chapter) -> PathBuf {
    let source_dir = DownloadProvider::source_dir_name(source.name(), source.lang());
    DownloadProvider::new(config.download.download_dir.clone())
        .manga_dir(&source_dir, manga)
        .join(DownloadProvider::chapter_dir_name(chapter))
}

/// Poll `condition` every 10ms for up to 5 seconds
pub(crate) async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait until the queue is empty and the pipeline has stopped
pub(crate) async fn wait_for_idle(downloader: &ChapterDownloader) -> bool {
    wait_until(|| async move { downloader.queue().is_empty().await && !downloader.is_running() })
        .await
}

/// Wait until `source` has started at least `count` image fetches
pub(crate) async fn wait_for_fetches(source: &GatedSource, count: usize) -> bool {
    wait_until(|| async move { source.fetches() >= count }).await
}

/// Notifier that records every call
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    progress: AtomicUsize,
    paused: AtomicUsize,
    completed: AtomicUsize,
    dismissed: AtomicUsize,
}

impl RecordingNotifier {
    pub(crate) fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub(crate) fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub(crate) fn progress_calls(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub(crate) fn paused_calls(&self) -> usize {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn completed_calls(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn dismissed_calls(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn on_progress(&self, _download: &Download) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_progress(&self, _download: &Download, _page: &Page) {}

    fn on_error(
        &self,
        error: &str,
        _chapter_id: Option<ChapterId>,
        _chapter_name: Option<&str>,
        _manga_title: Option<&str>,
    ) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn on_warning(&self, reason: &str, _timeout: Option<Duration>) {
        self.warnings.lock().unwrap().push(reason.to_string());
    }

    fn on_paused(&self) {
        self.paused.fetch_add(1, Ordering::SeqCst);
    }

    fn on_complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn dismiss_progress(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Source whose image fetches block until the gate is opened
pub(crate) struct GatedSource {
    id: SourceId,
    pages: usize,
    gate: watch::Sender<bool>,
    fetches: AtomicUsize,
}

impl GatedSource {
    pub(crate) fn new(id: i64, pages: usize) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId(id),
            pages,
            gate: watch::channel(false).0,
            fetches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Image fetches started so far
    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Source for GatedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        "Gated"
    }

    async fn fetch_page_list(&self, chapter: &Chapter) -> Result<Vec<RemotePage>, SourceError> {
        Ok((0..self.pages)
            .map(|i| RemotePage {
                index: i,
                url: format!("https://gated.test/{}/{i}", chapter.id),
                image_url: Some(format!("https://gated.test/{}/{i}.png", chapter.id)),
            })
            .collect())
    }

    async fn fetch_image(&self, _image_url: &str) -> Result<ImageResponse, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(SourceError::Other("gate dropped".to_string()));
        }
        Ok(ImageResponse::from_bytes(Some("image/png"), png_bytes()))
    }
}
