//! In-memory source that records how it is being called

use super::fixtures::png_image;
use async_trait::async_trait;
use bytes::Bytes;
use chapter_dl::{Chapter, ImageResponse, RemotePage, Source, SourceError, SourceId};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared record of image fetches across every [`MockSource`]
#[derive(Default)]
pub struct FetchTracker {
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    in_flight_by_source: HashMap<i64, usize>,
    in_flight_by_chapter: HashMap<String, usize>,
    max_sources: usize,
    max_pages_per_chapter: usize,
    fetches: HashMap<String, usize>,
}

impl FetchTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(self: &Arc<Self>, source: i64, chapter: &str, url: &str) -> FetchGuard {
        let mut state = self.state.lock().unwrap();
        *state.in_flight_by_source.entry(source).or_default() += 1;
        let sources = state.in_flight_by_source.values().filter(|n| **n > 0).count();
        state.max_sources = state.max_sources.max(sources);

        let pages = {
            let count = state.in_flight_by_chapter.entry(chapter.to_string()).or_default();
            *count += 1;
            *count
        };
        state.max_pages_per_chapter = state.max_pages_per_chapter.max(pages);
        *state.fetches.entry(url.to_string()).or_default() += 1;

        FetchGuard {
            tracker: self.clone(),
            source,
            chapter: chapter.to_string(),
        }
    }

    /// Most sources that had an image fetch in flight at the same time
    pub fn max_concurrent_sources(&self) -> usize {
        self.state.lock().unwrap().max_sources
    }

    /// Most image fetches of one chapter in flight at the same time
    pub fn max_concurrent_pages(&self) -> usize {
        self.state.lock().unwrap().max_pages_per_chapter
    }

    /// How often `url` was requested
    pub fn fetch_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetches
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.state.lock().unwrap().fetches.values().sum()
    }
}

struct FetchGuard {
    tracker: Arc<FetchTracker>,
    source: i64,
    chapter: String,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        let mut state = self.tracker.state.lock().unwrap();
        if let Some(count) = state.in_flight_by_source.get_mut(&self.source) {
            *count -= 1;
        }
        if let Some(count) = state.in_flight_by_chapter.get_mut(&self.chapter) {
            *count -= 1;
        }
    }
}

/// Serves `pages` PNG pages per chapter at `mock://<source>/<chapter>/<page>.png`
pub struct MockSource {
    id: SourceId,
    name: String,
    pages: usize,
    delay: Duration,
    unmetered: bool,
    chunk_size: Option<usize>,
    failing_pages: HashSet<usize>,
    failure_status: u16,
    failing: AtomicBool,
    tracker: Arc<FetchTracker>,
}

impl MockSource {
    pub fn new(id: i64, tracker: Arc<FetchTracker>) -> Self {
        Self {
            id: SourceId(id),
            name: format!("Mock {id}"),
            pages: 4,
            delay: Duration::from_millis(10),
            unmetered: false,
            chunk_size: None,
            failing_pages: HashSet::new(),
            failure_status: 404,
            failing: AtomicBool::new(true),
            tracker,
        }
    }

    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unmetered(mut self) -> Self {
        self.unmetered = true;
        self
    }

    /// Stream image bodies `size` bytes at a time
    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Page `index` answers 404 until [`heal`](Self::heal) is called
    pub fn failing_page(mut self, index: usize) -> Self {
        self.failing_pages.insert(index);
        self
    }

    /// Page `index` answers `status` until [`heal`](Self::heal) is called
    pub fn failing_page_with(mut self, index: usize, status: u16) -> Self {
        self.failing_pages.insert(index);
        self.failure_status = status;
        self
    }

    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn image_url(&self, chapter: &Chapter, page: usize) -> String {
        format!("mock://{}/{}/{page}.png", self.id.0, chapter.id.0)
    }

    /// Bytes served for page `page`
    pub fn image_bytes(page: usize) -> Vec<u8> {
        png_image((page * 37 % 256) as u8)
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn lang(&self) -> &str {
        "en"
    }

    fn is_unmetered(&self) -> bool {
        self.unmetered
    }

    async fn fetch_page_list(&self, chapter: &Chapter) -> Result<Vec<RemotePage>, SourceError> {
        Ok((0..self.pages)
            .map(|page| RemotePage {
                index: page + 1,
                url: format!("{}/{page}", chapter.url),
                image_url: Some(self.image_url(chapter, page)),
            })
            .collect())
    }

    async fn fetch_image(&self, image_url: &str) -> Result<ImageResponse, SourceError> {
        let path = image_url.trim_start_matches("mock://");
        let (chapter, page) = path
            .rsplit_once('/')
            .ok_or_else(|| SourceError::Parse(format!("bad mock URL {image_url}")))?;
        let page: usize = page
            .trim_end_matches(".png")
            .parse()
            .map_err(|_| SourceError::Parse(format!("bad page in {image_url}")))?;

        let _guard = self.tracker.enter(self.id.0, chapter, image_url);
        tokio::time::sleep(self.delay).await;

        if self.failing.load(Ordering::SeqCst) && self.failing_pages.contains(&page) {
            return Err(SourceError::Http {
                status: self.failure_status,
                url: image_url.to_string(),
            });
        }
        let data = Self::image_bytes(page);
        let Some(size) = self.chunk_size else {
            return Ok(ImageResponse::from_bytes(Some("image/png"), data));
        };
        let chunks: Vec<Result<Bytes, SourceError>> = data
            .chunks(size)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(ImageResponse {
            content_type: Some("image/png".to_string()),
            content_length: Some(data.len() as u64),
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}
