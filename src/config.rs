//! Configuration types for chapter-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Download behavior configuration (directories, concurrency caps, output format)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory for downloaded chapters (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Minimum free space on the destination volume before a chapter may start
    /// (default: 200 MiB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Write finished chapters as stored CBZ archives instead of directories
    #[serde(default)]
    pub save_as_cbz: bool,

    /// Maximum number of sources downloading at the same time (default: 5)
    ///
    /// Chapters of one source are always downloaded one after another; this caps
    /// how many sources run side by side.
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,

    /// Maximum number of pages of one chapter fetched at the same time (default: 2)
    #[serde(default = "default_max_concurrent_pages")]
    pub max_concurrent_pages: usize,

    /// Split pages taller than `tall_image_ratio` into several images
    #[serde(default)]
    pub split_tall_images: bool,

    /// Height/width ratio above which a page counts as tall (default: 3.0)
    #[serde(default = "default_tall_image_ratio")]
    pub tall_image_ratio: f32,

    /// Height in pixels of each split fragment (default: 3000)
    #[serde(default = "default_split_height")]
    pub split_height: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            min_free_space: default_min_free_space(),
            save_as_cbz: false,
            max_concurrent_sources: default_max_concurrent_sources(),
            max_concurrent_pages: default_max_concurrent_pages(),
            split_tall_images: false,
            tall_image_ratio: default_tall_image_ratio(),
            split_height: default_split_height(),
        }
    }
}

/// Retry configuration for transient image fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 8 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path for the queue store and download cache (default: "./chapter-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Thresholds for the "too many chapters queued" warning
///
/// Only metered sources count; see [`Source::is_unmetered`](crate::source::Source::is_unmetered).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueWarningConfig {
    /// Warn when more downloads than this are queued (default: 30)
    #[serde(default = "default_max_queued_downloads")]
    pub max_queued_downloads: usize,

    /// Warn when more chapters than this are queued from one source (default: 15)
    #[serde(default = "default_max_chapters_per_source")]
    pub max_chapters_per_source: usize,

    /// How long the warning stays visible (default: 30 seconds)
    #[serde(default = "default_warning_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,
}

impl Default for QueueWarningConfig {
    fn default() -> Self {
        Self {
            max_queued_downloads: default_max_queued_downloads(),
            max_chapters_per_source: default_max_chapters_per_source(),
            timeout: default_warning_timeout(),
        }
    }
}

/// Main configuration for [`ChapterDownloader`](crate::ChapterDownloader)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry policy for image fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Queue size warning thresholds
    #[serde(default)]
    pub queue_warnings: QueueWarningConfig,

    /// Reader image cache to reuse before hitting the network (None = disabled)
    #[serde(default)]
    pub image_cache_dir: Option<PathBuf>,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Check that the configuration can drive a pipeline
    pub fn validate(&self) -> Result<()> {
        if self.download.max_concurrent_sources == 0 {
            return Err(Error::config(
                "max_concurrent_sources",
                "at least one source must be allowed to download",
            ));
        }
        if self.download.max_concurrent_pages == 0 {
            return Err(Error::config(
                "max_concurrent_pages",
                "at least one page must be allowed to download",
            ));
        }
        let ratio = self.download.tall_image_ratio;
        if ratio.is_nan() || ratio <= 0.0 {
            return Err(Error::config(
                "tall_image_ratio",
                format!("must be positive, got {}", ratio),
            ));
        }
        if self.download.split_height == 0 {
            return Err(Error::config("split_height", "must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./chapter-dl.db")
}

fn default_min_free_space() -> u64 {
    200 * 1024 * 1024
}

fn default_max_concurrent_sources() -> usize {
    5
}

fn default_max_concurrent_pages() -> usize {
    2
}

fn default_tall_image_ratio() -> f32 {
    3.0
}

fn default_split_height() -> u32 {
    3000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_queued_downloads() -> usize {
    30
}

fn default_max_chapters_per_source() -> usize {
    15
}

fn default_warning_timeout() -> Duration {
    Duration::from_secs(30)
}

// Durations are stored as milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
