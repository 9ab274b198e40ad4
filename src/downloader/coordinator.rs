//! The coordinator task.
//!
//! Single writer of the download queue: every mutation, whether it comes from
//! a public method or from a finished chapter task, is executed here one at a
//! time. It also owns the running pipeline and is the only place that starts,
//! stops or pauses it.

use crate::error::Result;
use crate::model::Download;
use crate::queue::DownloadQueue;
use crate::types::{ChapterId, DownloadState, Event};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::PipelineFlags;
use super::download_task::PipelineContext;
use super::enqueue::queue_size_warning;
use super::pipeline::{Dispatcher, PipelineMessage};

/// Capacity of the relay of queued batches
const RELAY_CAPACITY: usize = 64;

/// Requests from [`ChapterDownloader`](super::ChapterDownloader) handles
pub(crate) enum Command {
    Enqueue {
        downloads: Vec<Arc<Download>>,
        auto_start: bool,
        reply: oneshot::Sender<Result<Vec<Arc<Download>>>>,
    },
    Start {
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reason: Option<String>,
        reply: oneshot::Sender<()>,
    },
    Pause {
        reply: oneshot::Sender<()>,
    },
    Clear {
        is_notification: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        chapter_ids: Vec<ChapterId>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct RunningPipeline {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct Coordinator {
    ctx: Arc<PipelineContext>,
    queue: Arc<DownloadQueue>,
    flags: Arc<PipelineFlags>,
    relay: broadcast::Sender<Vec<Arc<Download>>>,
    messages_tx: mpsc::UnboundedSender<PipelineMessage>,
    messages_rx: mpsc::UnboundedReceiver<PipelineMessage>,
    running: Option<RunningPipeline>,
}

impl Coordinator {
    pub(crate) fn new(
        ctx: Arc<PipelineContext>,
        queue: Arc<DownloadQueue>,
        flags: Arc<PipelineFlags>,
    ) -> Self {
        let (relay, _) = broadcast::channel(RELAY_CAPACITY);
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        Self {
            ctx,
            queue,
            flags,
            relay,
            messages_tx,
            messages_rx,
            running: None,
        }
    }

    /// Process commands and pipeline messages until shutdown
    ///
    /// When every handle is dropped the pipeline is paused and the task ends.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.halt(DownloadState::Queue).await;
                        reply.send(()).ok();
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.halt(DownloadState::Queue).await;
                        break;
                    }
                },
                Some(message) = self.messages_rx.recv() => self.handle_message(message).await,
            }
        }

        // Completions that raced the shutdown still get reconciled
        while let Ok(message) = self.messages_rx.try_recv() {
            if let PipelineMessage::ChapterFinished(download) = message {
                self.reconcile(&download).await;
            }
        }
        tracing::debug!("Coordinator stopped");
    }

    async fn handle(&mut self, command: Command) {
        // A dropped reply receiver means the caller stopped waiting
        match command {
            Command::Enqueue {
                downloads,
                auto_start,
                reply,
            } => {
                reply.send(self.enqueue(downloads, auto_start).await).ok();
            }
            Command::Start { reply } => {
                reply.send(self.start().await).ok();
            }
            Command::Stop { reason, reply } => {
                self.stop(reason).await;
                reply.send(()).ok();
            }
            Command::Pause { reply } => {
                self.pause().await;
                reply.send(()).ok();
            }
            Command::Clear {
                is_notification,
                reply,
            } => {
                reply.send(self.clear(is_notification).await).ok();
            }
            Command::Remove { chapter_ids, reply } => {
                reply.send(self.remove(chapter_ids).await).ok();
            }
            Command::Shutdown { reply } => {
                reply.send(()).ok();
            }
        }
    }

    async fn handle_message(&mut self, message: PipelineMessage) {
        match message {
            PipelineMessage::ChapterFinished(download) => {
                self.reconcile(&download).await;
                if self.running.is_some() && self.queue.all_finished().await {
                    tracing::info!("No downloads left, stopping pipeline");
                    self.stop(None).await;
                }
            }
            PipelineMessage::Failed(reason) => {
                tracing::error!(reason = %reason, "Download pipeline failed");
                self.ctx.notifier.on_error(&reason, None, None, None);
                self.stop(Some(reason)).await;
            }
        }
    }

    /// Drop a downloaded chapter from the queue
    async fn reconcile(&self, download: &Download) {
        if download.status() != DownloadState::Downloaded {
            return;
        }
        if let Err(e) = self.queue.remove(download.chapter_id()).await {
            tracing::error!(
                chapter_id = download.chapter_id().0,
                error = %e,
                "Failed to remove downloaded chapter from queue"
            );
        }
    }

    async fn enqueue(
        &mut self,
        downloads: Vec<Arc<Download>>,
        auto_start: bool,
    ) -> Result<Vec<Arc<Download>>> {
        let was_empty = self.queue.is_empty().await;
        let added = self.queue.add_all(downloads).await?;
        if added.is_empty() {
            return Ok(added);
        }

        for download in &added {
            self.ctx.emit_event(Event::Queued {
                chapter_id: download.chapter_id(),
                name: download.chapter.name.clone(),
            });
        }
        tracing::info!(added = added.len(), "Chapters queued");

        if self.running.is_some() {
            self.relay.send(added.clone()).ok();
        }

        if auto_start && was_empty {
            let queued = self.queue.snapshot().await;
            if let Some(warning) = queue_size_warning(&queued, &self.ctx.config.queue_warnings) {
                self.ctx
                    .notifier
                    .on_warning(&warning, Some(self.ctx.config.queue_warnings.timeout));
            }
            self.start().await;
        }

        Ok(added)
    }

    async fn start(&mut self) -> bool {
        if self.running.is_some() {
            return false;
        }

        let pending: Vec<Arc<Download>> = self
            .queue
            .snapshot()
            .await
            .into_iter()
            .filter(|d| d.status() != DownloadState::Downloaded)
            .collect();
        if pending.is_empty() {
            return false;
        }

        self.flags.paused.store(false, Ordering::SeqCst);
        for download in &pending {
            download.reset_unless_downloaded(DownloadState::Queue);
        }

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            self.ctx.clone(),
            self.queue.clone(),
            self.relay.subscribe(),
            self.messages_tx.clone(),
            cancel.clone(),
        );
        let crash_tx = self.messages_tx.clone();
        let handle = tokio::spawn(async move {
            if AssertUnwindSafe(dispatcher.run())
                .catch_unwind()
                .await
                .is_err()
            {
                crash_tx
                    .send(PipelineMessage::Failed(
                        "download pipeline panicked".to_string(),
                    ))
                    .ok();
            }
        });

        let count = pending.len();
        // The dispatcher subscribed above, so the first batch cannot be missed
        self.relay.send(pending).ok();
        self.running = Some(RunningPipeline { cancel, handle });
        self.flags.running.store(true, Ordering::SeqCst);

        tracing::info!(pending = count, "Download pipeline started");
        self.ctx.emit_event(Event::Started);
        true
    }

    /// Cancel the pipeline, wait for it to drain and demote in-flight chapters
    ///
    /// Returns whether a pipeline was running.
    async fn halt(&mut self, demote_to: DownloadState) -> bool {
        let was_running = match self.running.take() {
            Some(pipeline) => {
                pipeline.cancel.cancel();
                if let Err(e) = pipeline.handle.await {
                    tracing::error!(error = %e, "Download pipeline task failed");
                }
                self.flags.running.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        };

        for download in self.queue.snapshot().await {
            download.transition(DownloadState::Downloading, demote_to);
        }
        was_running
    }

    async fn stop(&mut self, reason: Option<String>) {
        if self.halt(DownloadState::Error).await {
            tracing::info!(reason = reason.as_deref(), "Download pipeline stopped");
            self.ctx.emit_event(Event::Stopped);
        }

        if let Some(reason) = reason {
            self.ctx.notifier.on_warning(&reason, None);
            return;
        }

        if self.flags.paused.load(Ordering::SeqCst) && !self.queue.is_empty().await {
            self.ctx.notifier.on_paused();
        } else {
            self.ctx.notifier.on_complete();
        }
        self.flags.paused.store(false, Ordering::SeqCst);
    }

    async fn pause(&mut self) {
        self.halt(DownloadState::Queue).await;
        self.flags.paused.store(true, Ordering::SeqCst);
        tracing::info!("Download pipeline paused");
        self.ctx.notifier.on_paused();
    }

    async fn clear(&mut self, is_notification: bool) -> Result<()> {
        self.halt(DownloadState::NotDownloaded).await;

        if is_notification {
            for download in self.queue.snapshot().await {
                download.transition(DownloadState::Queue, DownloadState::NotDownloaded);
            }
        }

        let cleared = self.queue.clear().await?;
        self.flags.paused.store(false, Ordering::SeqCst);
        self.ctx.notifier.dismiss_progress();

        tracing::info!(cleared = cleared.len(), "Download queue cleared");
        self.ctx.emit_event(Event::QueueCleared);
        Ok(())
    }

    /// Remove chapters; a running pipeline is restarted if one of them is in flight
    async fn remove(&mut self, chapter_ids: Vec<ChapterId>) -> Result<usize> {
        let mut in_flight = false;
        if self.running.is_some() {
            for id in &chapter_ids {
                if let Some(download) = self.queue.find(*id).await
                    && download.status() == DownloadState::Downloading
                {
                    in_flight = true;
                    break;
                }
            }
        }

        if in_flight {
            self.halt(DownloadState::Queue).await;
        }

        let removed = self.queue.remove_chapters(&chapter_ids).await?;
        for download in &removed {
            self.ctx.emit_event(Event::Removed {
                chapter_id: download.chapter_id(),
            });
        }

        if in_flight {
            if self.queue.is_empty().await {
                self.ctx.emit_event(Event::Stopped);
                self.stop(None).await;
            } else {
                self.start().await;
            }
        } else if self.running.is_some() && self.queue.all_finished().await {
            self.stop(None).await;
        }

        Ok(removed.len())
    }
}
