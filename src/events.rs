//! Event delivery to subscribers.
//!
//! Every subscriber owns an unbounded queue, so lifecycle events (`Queued`,
//! `Downloaded`, `Failed`, `Completed`, ...) reach a slow reader eventually
//! instead of being overwritten. Progress ticks take a separate path: a
//! subscriber holds at most one pending [`Event::Progress`] per chapter and one
//! [`Event::PageProgress`] per page, always the latest. Events come out in the
//! order they were published, a replaced tick taking the position of its
//! replacement.

use crate::types::{ChapterId, Event};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Notify, mpsc};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Holders never panic mid-update; a poisoned lock still has consistent data
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ProgressKey {
    Chapter(ChapterId),
    Page(ChapterId, usize),
}

impl ProgressKey {
    fn of(event: &Event) -> Option<Self> {
        match event {
            Event::Progress { chapter_id, .. } => Some(Self::Chapter(*chapter_id)),
            Event::PageProgress {
                chapter_id, page, ..
            } => Some(Self::Page(*chapter_id, *page)),
            _ => None,
        }
    }

    fn chapter(self) -> ChapterId {
        match self {
            Self::Chapter(id) | Self::Page(id, _) => id,
        }
    }
}

/// Latest unread progress tick per key, tagged with its publish sequence
type PendingTicks = HashMap<ProgressKey, (u64, Event)>;

fn pop_earliest(ticks: &mut PendingTicks) -> Option<(u64, Event)> {
    let key = ticks
        .iter()
        .min_by_key(|(_, (seq, _))| *seq)
        .map(|(key, _)| *key)?;
    ticks.remove(&key)
}

struct Subscriber {
    events: mpsc::UnboundedSender<(u64, Event)>,
    ticks: Arc<Mutex<PendingTicks>>,
    wake: Arc<Notify>,
}

#[derive(Default)]
struct BusState {
    next_seq: u64,
    subscribers: Vec<Subscriber>,
}

/// Fan-out of [`Event`]s to any number of [`EventReceiver`]s
///
/// Cloning shares the subscriber list. Receivers see the stream end once every
/// clone is dropped.
#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    /// Bus without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> EventReceiver {
        let (events_tx, events) = mpsc::unbounded_channel();
        let ticks = Arc::new(Mutex::new(PendingTicks::new()));
        let wake = Arc::new(Notify::new());
        lock(&self.state).subscribers.push(Subscriber {
            events: events_tx,
            ticks: ticks.clone(),
            wake: wake.clone(),
        });
        EventReceiver {
            events,
            ticks,
            wake,
            next: None,
        }
    }

    /// Deliver `event` to every live subscriber
    ///
    /// Dropped receivers are forgotten. Publishing never blocks.
    pub fn publish(&self, event: Event) {
        let mut state = lock(&self.state);
        state.next_seq += 1;
        let seq = state.next_seq;
        let tick = ProgressKey::of(&event);

        state.subscribers.retain(|subscriber| match tick {
            Some(key) => {
                if subscriber.events.is_closed() {
                    return false;
                }
                lock(&subscriber.ticks).insert(key, (seq, event.clone()));
                subscriber.wake.notify_one();
                true
            }
            None => {
                settle_ticks(&mut lock(&subscriber.ticks), &event);
                subscriber.events.send((seq, event.clone())).is_ok()
            }
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut state = lock(&self.state);
        state.subscribers.retain(|s| !s.events.is_closed());
        state.subscribers.len()
    }
}

/// Drop ticks that a lifecycle event made meaningless
fn settle_ticks(ticks: &mut PendingTicks, event: &Event) {
    match event {
        Event::Downloaded { chapter_id, .. } | Event::Removed { chapter_id } => {
            ticks.retain(|key, _| key.chapter() != *chapter_id);
        }
        Event::QueueCleared => ticks.clear(),
        _ => {}
    }
}

/// One subscriber's view of the event stream
pub struct EventReceiver {
    events: mpsc::UnboundedReceiver<(u64, Event)>,
    ticks: Arc<Mutex<PendingTicks>>,
    wake: Arc<Notify>,
    /// Lifecycle event taken off the queue but not yet returned
    next: Option<(u64, Event)>,
}

impl EventReceiver {
    /// Wait for the next event
    ///
    /// Returns `None` once the downloader is gone and everything was read.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }

            let received = tokio::select! {
                received = self.events.recv() => Some(received),
                _ = self.wake.notified() => None,
            };
            match received {
                Some(Some(item)) => self.next = Some(item),
                Some(None) => return self.take_earliest(),
                None => {}
            }
        }
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.next.is_none() {
            self.next = self.events.try_recv().ok();
        }
        self.take_earliest()
    }

    fn take_earliest(&mut self) -> Option<Event> {
        let mut ticks = lock(&self.ticks);
        let tick_first = match (&self.next, ticks.values().map(|(seq, _)| *seq).min()) {
            (Some((next_seq, _)), Some(tick_seq)) => tick_seq < *next_seq,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if tick_first {
            pop_earliest(&mut ticks).map(|(_, event)| event)
        } else {
            self.next.take().map(|(_, event)| event)
        }
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver")
            .field("pending_ticks", &lock(&self.ticks).len())
            .finish_non_exhaustive()
    }
}
