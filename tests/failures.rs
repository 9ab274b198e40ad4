//! Page failures: siblings finish, the chapter fails, a retry resumes.

mod common;

use chapter_dl::{DownloadState, Event, PageState, SourceRegistry};
use common::{
    FetchTracker, MockSource, chapter, chapter_dir, create_downloader, drain_events, manga,
    page_files, test_config, wait_for_idle,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_failed_page_fails_chapter_but_not_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let tracker = FetchTracker::new();
    let broken = Arc::new(MockSource::new(1, tracker.clone()).pages(4).failing_page(2));
    let healthy = Arc::new(MockSource::new(2, tracker.clone()).pages(4));
    let registry = SourceRegistry::new()
        .with(broken.clone())
        .with(healthy.clone());
    let downloader = create_downloader(config.clone(), registry).await;
    let mut events = downloader.subscribe();

    let (m1, m2) = (manga(1), manga(2));
    let failing = chapter(&m1, 1);
    let fine = chapter(&m2, 1);
    downloader
        .queue_chapters(&m1, vec![failing.clone()], true)
        .await
        .unwrap();
    downloader
        .queue_chapters(&m2, vec![fine.clone()], true)
        .await
        .unwrap();

    assert!(wait_for_idle(&downloader, Duration::from_secs(20)).await);

    // The healthy source is unaffected
    assert!(downloader.is_chapter_downloaded(fine.id).await);

    // The broken chapter stays queued as failed, with its good pages staged
    let download = downloader.queue().find(failing.id).await.unwrap();
    assert_eq!(download.status(), DownloadState::Error);
    assert_eq!(download.downloaded_pages(), 3);
    assert!(!downloader.is_chapter_downloaded(failing.id).await);

    let final_dir = chapter_dir(&config, &*broken, &m1, &failing);
    assert!(!final_dir.exists());
    let staging = final_dir.with_file_name(format!(
        "{}_tmp",
        final_dir.file_name().unwrap().to_string_lossy()
    ));
    assert_eq!(page_files(&staging), vec!["000.png", "001.png", "003.png"]);

    // 404 is not retried
    assert_eq!(tracker.fetch_count(&broken.image_url(&failing, 2)), 1);

    let failures: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            Event::Failed {
                chapter_id, error, ..
            } => Some((chapter_id, error)),
            _ => None,
        })
        .collect();
    assert!(
        failures
            .iter()
            .any(|(id, error)| *id == Some(failing.id) && error.starts_with("Page 3:")),
        "{failures:?}"
    );
    assert!(
        failures
            .iter()
            .any(|(id, error)| *id == Some(failing.id) && error.contains("incomplete")),
        "{failures:?}"
    );
}

#[tokio::test]
async fn test_page_that_exhausts_retries_fails_chapter_but_not_siblings() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let tracker = FetchTracker::new();
    let source = Arc::new(
        MockSource::new(1, tracker.clone())
            .pages(4)
            .failing_page_with(1, 503),
    );
    let downloader =
        create_downloader(config.clone(), SourceRegistry::new().with(source.clone())).await;

    let m = manga(1);
    let c = chapter(&m, 1);
    downloader
        .queue_chapters(&m, vec![c.clone()], true)
        .await
        .unwrap();
    assert!(wait_for_idle(&downloader, Duration::from_secs(20)).await);

    // One attempt plus three retries
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(tracker.fetch_count(&source.image_url(&c, 1)), 4);
    for sibling in [0, 2, 3] {
        assert_eq!(tracker.fetch_count(&source.image_url(&c, sibling)), 1);
    }

    let download = downloader.queue().find(c.id).await.unwrap();
    assert_eq!(download.status(), DownloadState::Error);
    let states: Vec<PageState> = download
        .pages()
        .unwrap()
        .iter()
        .map(|page| page.status())
        .collect();
    assert_eq!(
        states,
        vec![
            PageState::Ready,
            PageState::Error,
            PageState::Ready,
            PageState::Ready
        ]
    );
    assert!(!downloader.is_chapter_downloaded(c.id).await);
    assert!(!chapter_dir(&config, &*source, &m, &c).exists());
}

#[tokio::test]
async fn test_retry_fetches_only_missing_pages() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let tracker = FetchTracker::new();
    let source = Arc::new(MockSource::new(1, tracker.clone()).pages(3).failing_page(0));
    let downloader =
        create_downloader(config.clone(), SourceRegistry::new().with(source.clone())).await;

    let m = manga(1);
    let c = chapter(&m, 1);
    downloader
        .queue_chapters(&m, vec![c.clone()], true)
        .await
        .unwrap();
    assert!(wait_for_idle(&downloader, Duration::from_secs(20)).await);
    assert_eq!(
        downloader.queue().find(c.id).await.unwrap().status(),
        DownloadState::Error
    );

    source.heal();
    assert!(downloader.start().await.unwrap(), "failed chapters are retried");
    assert!(wait_for_idle(&downloader, Duration::from_secs(20)).await);

    assert!(downloader.is_chapter_downloaded(c.id).await);
    assert!(downloader.queue().is_empty().await);
    assert_eq!(tracker.fetch_count(&source.image_url(&c, 0)), 2);
    assert_eq!(tracker.fetch_count(&source.image_url(&c, 1)), 1);
    assert_eq!(tracker.fetch_count(&source.image_url(&c, 2)), 1);
    assert_eq!(
        page_files(&chapter_dir(&config, &*source, &m, &c)),
        vec!["000.png", "001.png", "002.png"]
    );
}
