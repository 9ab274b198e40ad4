//! User-facing notification sink.
//!
//! The pipeline reports progress, errors and warnings through a [`Notifier`]
//! and never waits on it. [`BroadcastNotifier`] turns the calls into
//! [`Event`]s on the downloader's [`EventBus`].

use crate::events::EventBus;
use crate::model::{Download, Page};
use crate::types::{ChapterId, Event};
use std::time::Duration;

/// Fire-and-forget presentation of download state
///
/// Methods are called from pipeline tasks and must not block.
pub trait Notifier: Send + Sync {
    /// A chapter's page count changed
    fn on_progress(&self, download: &Download);

    /// A page's byte progress changed
    fn on_page_progress(&self, download: &Download, page: &Page);

    /// A chapter or page failed
    fn on_error(
        &self,
        error: &str,
        chapter_id: Option<ChapterId>,
        chapter_name: Option<&str>,
        manga_title: Option<&str>,
    );

    /// Something the user should know about that is not a failure
    fn on_warning(&self, reason: &str, timeout: Option<Duration>);

    /// The pipeline stopped with work left in the queue
    fn on_paused(&self);

    /// The pipeline stopped with nothing left to do
    fn on_complete(&self);

    /// Remove any visible progress (queue cleared)
    fn dismiss_progress(&self);
}

/// [`Notifier`] that publishes [`Event`]s and logs through `tracing`
#[derive(Clone)]
pub struct BroadcastNotifier {
    events: EventBus,
}

impl BroadcastNotifier {
    /// Publish on `events`
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    fn emit(&self, event: Event) {
        self.events.publish(event);
    }
}

impl Notifier for BroadcastNotifier {
    fn on_progress(&self, download: &Download) {
        self.emit(Event::Progress {
            chapter_id: download.chapter_id(),
            downloaded_pages: download.downloaded_pages(),
            total_pages: download.total_pages(),
        });
    }

    fn on_page_progress(&self, download: &Download, page: &Page) {
        self.emit(Event::PageProgress {
            chapter_id: download.chapter_id(),
            page: page.index(),
            percent: page.progress(),
        });
    }

    fn on_error(
        &self,
        error: &str,
        chapter_id: Option<ChapterId>,
        chapter_name: Option<&str>,
        manga_title: Option<&str>,
    ) {
        tracing::warn!(
            chapter_id = chapter_id.map(|id| id.0),
            chapter = chapter_name,
            manga = manga_title,
            error,
            "Download error"
        );
        self.emit(Event::Failed {
            chapter_id,
            error: error.to_string(),
            chapter_name: chapter_name.map(str::to_string),
            manga_title: manga_title.map(str::to_string),
        });
    }

    fn on_warning(&self, reason: &str, timeout: Option<Duration>) {
        tracing::warn!(reason, "Download warning");
        self.emit(Event::Warning {
            message: reason.to_string(),
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
        });
    }

    fn on_paused(&self) {
        tracing::info!("Downloads paused");
        self.emit(Event::Paused);
    }

    fn on_complete(&self) {
        tracing::info!("Downloads complete");
        self.emit(Event::Completed);
    }

    fn dismiss_progress(&self) {
        tracing::debug!("Progress dismissed");
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_and_warnings_become_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let notifier = BroadcastNotifier::new(bus);

        notifier.on_error("boom", Some(ChapterId(3)), Some("Ch. 3"), Some("Title"));
        notifier.on_warning("too many", Some(Duration::from_secs(30)));
        notifier.on_complete();

        match rx.try_recv().unwrap() {
            Event::Failed {
                chapter_id,
                error,
                chapter_name,
                manga_title,
            } => {
                assert_eq!(chapter_id, Some(ChapterId(3)));
                assert_eq!(error, "boom");
                assert_eq!(chapter_name.as_deref(), Some("Ch. 3"));
                assert_eq!(manga_title.as_deref(), Some("Title"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            Event::Warning {
                timeout_ms: Some(30_000),
                ..
            }
        ));
        assert!(matches!(rx.try_recv().unwrap(), Event::Completed));
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        drop(bus.subscribe());
        let notifier = BroadcastNotifier::new(bus);
        notifier.on_paused();
        notifier.dismiss_progress();
    }
}
