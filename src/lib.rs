//! # chapter-dl
//!
//! Embeddable chapter download pipeline for manga and comic readers.
//!
//! ## Design Philosophy
//!
//! chapter-dl is designed to be:
//! - **Durable** - The queue survives restarts; finished chapters are never fetched twice
//! - **Polite** - At most 5 sources and 2 pages per chapter are fetched at once
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! Chapters end up either as a directory of images or as a stored CBZ archive
//! under `<download_dir>/<source>/<manga>/<chapter>`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chapter_dl::{ChapterDownloader, Chapter, ChapterId, Config, HttpSource, Manga, MangaId, SourceId, SourceRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = HttpSource::new(SourceId(1), "Example", "en", "https://example.com/api/")?;
//!     let sources = SourceRegistry::new().with(Arc::new(source));
//!
//!     let downloader = ChapterDownloader::new(Config::default(), sources).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let manga = Manga { id: MangaId(1), source: SourceId(1), title: "Example".into() };
//!     let chapter = Chapter {
//!         id: ChapterId(10),
//!         manga_id: MangaId(1),
//!         name: "Chapter 1".into(),
//!         scanlator: None,
//!         url: "chapters/10".into(),
//!         source_order: 1,
//!     };
//!     downloader.queue_chapters(&manga, vec![chapter], true).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// CBZ archive writing and verification
pub mod archive;
/// Index of chapters already on disk
pub mod cache;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Event fan-out to subscribers
pub mod events;
/// Reader-side image cache
pub mod image_cache;
/// Image type detection and tall-image splitting
pub mod imaging;
/// Live download state
pub mod model;
/// User-facing notification sink
pub mod notifier;
/// Download directory naming
pub mod provider;
/// The download queue
pub mod queue;
/// Retry logic with exponential backoff
pub mod retry;
/// Content sources
pub mod source;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

pub use archive::{ArchiveEntry, ArchiveManifest};
pub use cache::DownloadCache;
pub use config::{Config, DownloadConfig, PersistenceConfig, QueueWarningConfig, RetryConfig};
pub use db::Database;
pub use downloader::ChapterDownloader;
pub use error::{DatabaseError, DownloadError, Error, Result, SourceError};
pub use events::{EventBus, EventReceiver};
pub use image_cache::ImageCache;
pub use model::{Download, Page};
pub use notifier::{BroadcastNotifier, Notifier};
pub use provider::DownloadProvider;
pub use queue::DownloadQueue;
pub use source::{HttpSource, ImageResponse, RemotePage, Source, SourceRegistry};
pub use types::{
    Chapter, ChapterId, DownloadProgress, DownloadState, Event, Manga, MangaId, PageState,
    QueueStats, SourceId,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use chapter_dl::{ChapterDownloader, Config, SourceRegistry, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ChapterDownloader::new(Config::default(), SourceRegistry::new()).await?;
///     downloader.start().await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: ChapterDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
