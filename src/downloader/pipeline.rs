//! The running pipeline: turns relayed batches into chapter tasks.
//!
//! Downloads are grouped by source. Each source is an ordered sub-stream that
//! runs one chapter at a time in enqueue order, and at most
//! `max_concurrent_sources` sources hold a slot at once. A source keeps its
//! slot while it has queued chapters; when it runs dry the slot goes to the
//! source that has waited longest.

use crate::model::Download;
use crate::queue::DownloadQueue;
use crate::types::{ChapterId, DownloadState, SourceId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::download_task::{ChapterTask, PipelineContext, run_download_task};

/// What the pipeline reports back to the coordinator
#[derive(Debug)]
pub(crate) enum PipelineMessage {
    /// A chapter task ended, whatever its outcome
    ChapterFinished(Arc<Download>),
    /// The pipeline itself broke and must be stopped
    Failed(String),
}

pub(crate) struct Dispatcher {
    ctx: Arc<PipelineContext>,
    queue: Arc<DownloadQueue>,
    relay: broadcast::Receiver<Vec<Arc<Download>>>,
    messages: mpsc::UnboundedSender<PipelineMessage>,
    cancel: CancellationToken,
    max_sources: usize,
    /// Chapters waiting per source, in enqueue order
    pending: HashMap<SourceId, VecDeque<Arc<Download>>>,
    /// Sources with pending chapters but no slot, oldest first
    waiting: VecDeque<SourceId>,
    /// Sources holding a slot; each has exactly one chapter in flight
    active: HashSet<SourceId>,
    /// Chapters pending or in flight, to ignore duplicates from a resync
    known: HashSet<ChapterId>,
    tasks: JoinSet<(SourceId, Arc<Download>)>,
}

impl Dispatcher {
    pub(crate) fn new(
        ctx: Arc<PipelineContext>,
        queue: Arc<DownloadQueue>,
        relay: broadcast::Receiver<Vec<Arc<Download>>>,
        messages: mpsc::UnboundedSender<PipelineMessage>,
        cancel: CancellationToken,
    ) -> Self {
        let max_sources = ctx.config.download.max_concurrent_sources.max(1);
        Self {
            ctx,
            queue,
            relay,
            messages,
            cancel,
            max_sources,
            pending: HashMap::new(),
            waiting: VecDeque::new(),
            active: HashSet::new(),
            known: HashSet::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Dispatch until cancelled, then wait for every chapter task to return
    pub(crate) async fn run(mut self) {
        tracing::debug!(max_sources = self.max_sources, "Download pipeline running");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok((source, download)) => self.chapter_finished(source, download),
                        Err(e) => {
                            tracing::error!(error = %e, "Chapter task aborted");
                            self.fail(format!("chapter task aborted: {e}"));
                            break;
                        }
                    }
                }

                received = self.relay.recv() => match received {
                    Ok(batch) => self.enqueue(batch),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Download relay lagged, resynchronising from queue");
                        self.resync().await;
                    }
                    Err(RecvError::Closed) => {
                        self.fail("download relay closed".to_string());
                        break;
                    }
                },
            }
        }

        self.drain().await;
        tracing::debug!("Download pipeline stopped");
    }

    fn enqueue(&mut self, batch: Vec<Arc<Download>>) {
        for download in batch {
            if !self.known.insert(download.chapter_id()) {
                continue;
            }
            let source = download.source_id();
            self.pending.entry(source).or_default().push_back(download);
            if !self.active.contains(&source) && !self.waiting.contains(&source) {
                self.waiting.push_back(source);
            }
        }
        self.fill_slots();
    }

    async fn resync(&mut self) {
        let queued = self
            .queue
            .pending()
            .await
            .into_iter()
            .filter(|d| d.status() == DownloadState::Queue)
            .collect();
        self.enqueue(queued);
    }

    fn fill_slots(&mut self) {
        while self.active.len() < self.max_sources {
            let Some(source) = self.waiting.pop_front() else {
                break;
            };
            if self.spawn_next(source) {
                self.active.insert(source);
            }
        }
    }

    /// Start the next queued chapter of `source`; false when it has none
    ///
    /// Chapters that left `Queue` while waiting (removed, cleared) are dropped.
    fn spawn_next(&mut self, source: SourceId) -> bool {
        let Some(chapters) = self.pending.get_mut(&source) else {
            return false;
        };

        while let Some(download) = chapters.pop_front() {
            if download.status() != DownloadState::Queue {
                self.known.remove(&download.chapter_id());
                continue;
            }

            tracing::debug!(
                source = source.0,
                chapter_id = download.chapter_id().0,
                "Dispatching chapter"
            );
            let task = ChapterTask {
                ctx: self.ctx.clone(),
                download: download.clone(),
                cancel: self.cancel.clone(),
            };
            self.tasks.spawn(async move {
                run_download_task(task).await;
                (source, download)
            });
            return true;
        }

        self.pending.remove(&source);
        false
    }

    fn chapter_finished(&mut self, source: SourceId, download: Arc<Download>) {
        self.known.remove(&download.chapter_id());
        // The coordinator may already be gone during shutdown
        self.messages
            .send(PipelineMessage::ChapterFinished(download))
            .ok();

        if self.cancel.is_cancelled() {
            return;
        }
        if !self.spawn_next(source) {
            self.active.remove(&source);
            self.fill_slots();
        }
    }

    fn fail(&self, reason: String) {
        self.messages.send(PipelineMessage::Failed(reason)).ok();
    }

    async fn drain(&mut self) {
        if !self.tasks.is_empty() {
            tracing::debug!(in_flight = self.tasks.len(), "Waiting for chapter tasks to return");
        }
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, download)) => {
                    self.messages
                        .send(PipelineMessage::ChapterFinished(download))
                        .ok();
                }
                Err(e) => tracing::error!(error = %e, "Chapter task aborted"),
            }
        }
        self.active.clear();
    }
}
