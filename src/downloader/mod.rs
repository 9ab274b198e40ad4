//! Core downloader implementation split into focused submodules.
//!
//! The `ChapterDownloader` struct and its methods are organized by domain:
//! - [`enqueue`] - Queueing chapters and the queue size warning
//! - [`control`] - Pipeline control (start/stop/pause/clear/remove)
//! - [`lifecycle`] - Startup restore and shutdown coordination
//! - [`coordinator`] - The single task that owns queue mutations
//! - [`pipeline`] - Per-source dispatch of chapter tasks
//! - [`download_task`] - One chapter from preflight to materialization

mod control;
mod coordinator;
mod download_task;
mod enqueue;
mod lifecycle;
mod pipeline;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::cache::DownloadCache;
use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventReceiver};
use crate::image_cache::ImageCache;
use crate::notifier::{BroadcastNotifier, Notifier};
use crate::provider::DownloadProvider;
use crate::queue::DownloadQueue;
use crate::source::SourceRegistry;
use crate::types::ChapterId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use coordinator::{Command, Coordinator};
use download_task::PipelineContext;

/// Capacity of the command channel to the coordinator
const COMMAND_CAPACITY: usize = 64;

/// Pipeline flags readable without asking the coordinator
#[derive(Debug, Default)]
pub(crate) struct PipelineFlags {
    pub(crate) running: AtomicBool,
    pub(crate) paused: AtomicBool,
}

/// Channel to the coordinator and its task
#[derive(Clone)]
pub(crate) struct CoordinatorHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) flags: Arc<PipelineFlags>,
    /// Set to false during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    pub(crate) task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChapterDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to inspect the queue store and cache index
    pub db: Arc<Database>,
    /// Event fan-out (multiple subscribers supported)
    pub(crate) events: EventBus,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Registered content sources
    pub(crate) sources: Arc<SourceRegistry>,
    /// State shared with every chapter task
    pub(crate) pipeline: Arc<PipelineContext>,
    /// Live download queue (mutated only by the coordinator)
    pub(crate) queue: Arc<DownloadQueue>,
    /// Coordinator channel and pipeline flags
    pub(crate) handle: CoordinatorHandle,
    /// Whether the previous session ended without a clean shutdown
    unclean_shutdown: bool,
}

impl ChapterDownloader {
    /// Create a new ChapterDownloader instance
    ///
    /// This initializes all core components:
    /// - Creates the download directory
    /// - Opens/creates the SQLite database and runs migrations
    /// - Loads the download cache index
    /// - Sets up the [`EventBus`] and a [`BroadcastNotifier`]
    /// - Spawns the coordinator task
    /// - Restores the queue persisted by the previous session
    ///
    /// The pipeline is not started; call [`start`](Self::start) to resume
    /// restored downloads.
    pub async fn new(config: Config, sources: SourceRegistry) -> Result<Self> {
        let events = EventBus::new();
        let notifier = Arc::new(BroadcastNotifier::new(events.clone()));
        Self::build(config, sources, events, notifier).await
    }

    /// Like [`new`](Self::new), reporting through a custom [`Notifier`]
    ///
    /// Lifecycle events (`Queued`, `Downloaded`, `Started`, ...) are still
    /// published on [`subscribe`](Self::subscribe).
    pub async fn with_notifier(
        config: Config,
        sources: SourceRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        Self::build(config, sources, EventBus::new(), notifier).await
    }

    async fn build(
        config: Config,
        sources: SourceRegistry,
        events: EventBus,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        // Ensure the download directory exists
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        // Initialize database
        let db = Database::new(&config.persistence.database_path).await?;

        let unclean_shutdown = db.was_unclean_shutdown().await?;
        if unclean_shutdown {
            tracing::warn!("Previous session did not shut down cleanly");
        }

        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;
        let db = Arc::new(db);

        let cache = DownloadCache::load(db.clone()).await?;
        let image_cache = match &config.image_cache_dir {
            Some(dir) => Some(ImageCache::new(dir.clone()).await?),
            None => None,
        };

        let config = Arc::new(config);
        let pipeline = Arc::new(PipelineContext {
            config: config.clone(),
            provider: DownloadProvider::new(config.download.download_dir.clone()),
            cache,
            image_cache,
            notifier,
            events: events.clone(),
        });
        let queue = Arc::new(DownloadQueue::new(db.clone()));

        let flags = Arc::new(PipelineFlags::default());
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let coordinator = Coordinator::new(pipeline.clone(), queue.clone(), flags.clone());
        let task = tokio::spawn(coordinator.run(command_rx));

        tracing::info!(
            sources = sources.len(),
            download_dir = %config.download.download_dir.display(),
            save_as_cbz = config.download.save_as_cbz,
            "Chapter downloader initialized"
        );

        let downloader = Self {
            db,
            events,
            config,
            sources: Arc::new(sources),
            pipeline,
            queue,
            handle: CoordinatorHandle {
                commands,
                flags,
                accepting_new: Arc::new(AtomicBool::new(true)),
                task: Arc::new(Mutex::new(Some(task))),
            },
            unclean_shutdown,
        };

        // Restore the queue from the previous session
        downloader.restore_queue().await?;

        Ok(downloader)
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Lifecycle events are queued for as long as the subscriber lives; progress
    /// ticks are coalesced so a slow subscriber only sees the latest one per
    /// chapter and page.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use chapter_dl::{ChapterDownloader, Config, SourceRegistry};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = ChapterDownloader::new(Config::default(), SourceRegistry::new()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Some(event) = events.recv().await {
    ///             println!("{event:?}");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The live download queue (read-only)
    pub fn queue(&self) -> &DownloadQueue {
        &self.queue
    }

    /// The download cache index
    pub fn cache(&self) -> &DownloadCache {
        &self.pipeline.cache
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a chapter is registered as downloaded
    pub async fn is_chapter_downloaded(&self, chapter_id: ChapterId) -> bool {
        self.pipeline.cache.is_chapter_downloaded(chapter_id).await
    }

    /// Whether the previous session ended without [`shutdown`](Self::shutdown)
    pub fn was_unclean_shutdown(&self) -> bool {
        self.unclean_shutdown
    }

    /// Send a command to the coordinator and wait for its reply
    pub(crate) async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.handle
            .commands
            .send(command(reply))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        response.await.map_err(|_| Error::ShuttingDown)
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.handle.accepting_new.load(Ordering::SeqCst)
    }
}
