use crate::config::QueueWarningConfig;
use crate::downloader::enqueue::queue_size_warning;
use crate::downloader::test_helpers::{
    GatedSource, chapter, chapter_dir, create_test_downloader, create_test_downloader_with,
    download, manga, test_config,
};
use crate::error::Error;
use crate::source::SourceRegistry;
use crate::source::test_support::StaticSource;
use crate::types::{ChapterId, Event};
use std::sync::Arc;
use tempfile::tempdir;

fn thresholds(total: usize, per_source: usize) -> QueueWarningConfig {
    QueueWarningConfig {
        max_queued_downloads: total,
        max_chapters_per_source: per_source,
        ..QueueWarningConfig::default()
    }
}

// --- queue_size_warning() tests ---

#[test]
fn test_warning_when_total_exceeds_limit() {
    let downloads: Vec<_> = (1..=4)
        .map(|i| download(Arc::new(StaticSource::new(i, Vec::new())), i))
        .collect();

    assert!(queue_size_warning(&downloads, &thresholds(4, 10)).is_none());
    let warning = queue_size_warning(&downloads, &thresholds(3, 10)).unwrap();
    assert!(warning.starts_with("4 chapters queued"), "{warning}");
}

#[test]
fn test_warning_when_one_source_exceeds_limit() {
    let source = Arc::new(StaticSource::new(1, Vec::new()));
    let downloads: Vec<_> = (1..=3).map(|i| download(source.clone(), i)).collect();

    assert!(queue_size_warning(&downloads, &thresholds(10, 3)).is_none());
    let warning = queue_size_warning(&downloads, &thresholds(10, 2)).unwrap();
    assert!(warning.contains("from one source"), "{warning}");
}

#[test]
fn test_unmetered_sources_never_warn() {
    let local = Arc::new(StaticSource::new(1, Vec::new()).unmetered());
    let remote = Arc::new(StaticSource::new(2, Vec::new()));
    let mut downloads: Vec<_> = (1..=20).map(|i| download(local.clone(), i)).collect();
    downloads.push(download(remote, 21));

    assert!(queue_size_warning(&downloads, &thresholds(1, 1)).is_none());
}

// --- queue_chapters() tests ---

#[tokio::test]
async fn test_queue_chapters_orders_newest_first() {
    let temp_dir = tempdir().unwrap();
    let (downloader, _notifier) = create_test_downloader(
        temp_dir.path(),
        SourceRegistry::new().with(GatedSource::new(1, 1)),
    )
    .await;
    let m = manga(1);

    let mut events = downloader.subscribe();
    let added = downloader
        .queue_chapters(
            &m,
            vec![chapter(&m, 1, 1), chapter(&m, 3, 3), chapter(&m, 2, 2)],
            false,
        )
        .await
        .unwrap();
    assert_eq!(added, 3);

    let order: Vec<ChapterId> = downloader
        .queue()
        .snapshot()
        .await
        .iter()
        .map(|d| d.chapter_id())
        .collect();
    assert_eq!(order, vec![ChapterId(3), ChapterId(2), ChapterId(1)]);

    let mut queued = Vec::new();
    while let Some(event) = events.try_recv() {
        if let Event::Queued { chapter_id, .. } = event {
            queued.push(chapter_id);
        }
    }
    assert_eq!(queued, order);
}

#[tokio::test]
async fn test_queue_chapters_skips_queued_and_downloaded() {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path());
    let source = GatedSource::new(1, 1);
    let m = manga(1);

    // Chapter 1 is already on disk from an earlier session
    let existing = chapter_dir(&config, &*source, &m, &chapter(&m, 1, 1));
    std::fs::create_dir_all(&existing).unwrap();

    let (downloader, _notifier) =
        create_test_downloader_with(config, SourceRegistry::new().with(source)).await;

    let added = downloader
        .queue_chapters(&m, vec![chapter(&m, 1, 1), chapter(&m, 2, 2)], false)
        .await
        .unwrap();
    assert_eq!(added, 1);

    let again = downloader
        .queue_chapters(&m, vec![chapter(&m, 2, 2)], false)
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(downloader.queue().len().await, 1);
    assert_eq!(downloader.db.restore_queue_entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_queue_chapters_rejects_unknown_source() {
    let temp_dir = tempdir().unwrap();
    let (downloader, _notifier) = create_test_downloader(temp_dir.path(), SourceRegistry::new()).await;
    let m = manga(7);

    let result = downloader.queue_chapters(&m, vec![chapter(&m, 1, 1)], true).await;

    assert!(matches!(result, Err(Error::UnknownSource(7))));
    assert!(downloader.queue().is_empty().await);
}

#[tokio::test]
async fn test_queue_chapters_with_no_chapters_is_a_no_op() {
    let temp_dir = tempdir().unwrap();
    let (downloader, _notifier) = create_test_downloader(temp_dir.path(), SourceRegistry::new()).await;

    // Even an unknown source is fine when there is nothing to queue
    let added = downloader.queue_chapters(&manga(9), Vec::new(), true).await.unwrap();
    assert_eq!(added, 0);
    assert!(!downloader.is_running());
}

#[tokio::test]
async fn test_auto_start_warns_about_large_metered_batch() {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.queue_warnings.max_queued_downloads = 2;
    let source = GatedSource::new(1, 1);
    let (downloader, notifier) =
        create_test_downloader_with(config, SourceRegistry::new().with(source.clone())).await;
    let m = manga(1);

    downloader
        .queue_chapters(
            &m,
            vec![chapter(&m, 1, 1), chapter(&m, 2, 2), chapter(&m, 3, 3)],
            true,
        )
        .await
        .unwrap();

    assert!(downloader.is_running());
    let warnings = notifier.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("3 chapters queued"), "{warnings:?}");

    // A queue that was not empty does not warn again
    downloader
        .queue_chapters(&m, vec![chapter(&m, 4, 4)], true)
        .await
        .unwrap();
    assert_eq!(notifier.warnings().len(), 1);
    source.open();
}

#[tokio::test]
async fn test_queue_chapters_after_shutdown_fails() {
    let temp_dir = tempdir().unwrap();
    let (downloader, _notifier) = create_test_downloader(
        temp_dir.path(),
        SourceRegistry::new().with(GatedSource::new(1, 1)),
    )
    .await;
    let m = manga(1);

    downloader.shutdown().await.unwrap();
    let result = downloader.queue_chapters(&m, vec![chapter(&m, 1, 1)], false).await;

    assert!(matches!(result, Err(Error::ShuttingDown)));
}
