//! Test configuration helpers

use chapter_dl::{ChapterDownloader, Config, SourceRegistry};
use std::path::Path;
use std::time::Duration;

/// Configuration rooted in `dir`: fast retries, no free-space floor
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.join("downloads");
    config.download.min_free_space = 0;
    config.persistence.database_path = dir.join("chapter-dl.db");
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config
}

/// Create a downloader for `config`, panicking on failure
pub async fn create_downloader(config: Config, sources: SourceRegistry) -> ChapterDownloader {
    ChapterDownloader::new(config, sources)
        .await
        .expect("Failed to create downloader")
}
