//! Per-session progress channels.
//!
//! Each batch owns one [`ProgressChannel`]: producers publish without
//! blocking, and at most one [`ProgressSubscription`] drains it at a time.
//! A subscription waits a bounded time for the next event and yields a
//! synthetic [`ProgressEvent::Keepalive`] when nothing arrives, so a slow
//! batch never looks like a dead connection.
//!
//! Once the consumer has received `BatchCompleted` the channel is removed
//! from the [`ProgressRegistry`]; later subscribers get `SessionNotFound`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::Stream;
use tokio::sync::{RwLock, mpsc};

use crate::error::{Error, Result};
use crate::types::{OutcomeClass, ProgressEvent, SessionId};

/// Item counters maintained from the events flowing through a channel
#[derive(Debug, Default)]
pub struct ProgressCounters {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
}

impl ProgressCounters {
    /// Items that have an outcome so far
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Items that produced a record so far
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    fn record(&self, event: &ProgressEvent) {
        if let ProgressEvent::ItemDone { outcome_class, .. } = event {
            self.processed.fetch_add(1, Ordering::SeqCst);
            if *outcome_class == OutcomeClass::Completed {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[derive(Debug, Default)]
struct PublishState {
    /// Set when BatchCompleted has been published; nothing may follow it
    terminal_at: Option<Instant>,
}

/// Ordered, append-only event stream of one session
pub struct ProgressChannel {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<ProgressEvent>,
    /// Parked receiver; taken by the active subscription and put back when it is dropped early
    rx: StdMutex<Option<mpsc::UnboundedReceiver<ProgressEvent>>>,
    publish_state: StdMutex<PublishState>,
    counters: Arc<ProgressCounters>,
}

impl ProgressChannel {
    fn new(session_id: SessionId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            session_id,
            tx,
            rx: StdMutex::new(Some(rx)),
            publish_state: StdMutex::new(PublishState::default()),
            counters: Arc::new(ProgressCounters::default()),
        }
    }

    /// Session this channel belongs to
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Counters derived from published ItemDone events
    pub fn counters(&self) -> Arc<ProgressCounters> {
        Arc::clone(&self.counters)
    }

    /// Whether BatchCompleted has been published
    pub fn is_terminated(&self) -> bool {
        self.terminal_at().is_some()
    }

    fn terminal_at(&self) -> Option<Instant> {
        match self.publish_state.lock() {
            Ok(state) => state.terminal_at,
            Err(poisoned) => poisoned.into_inner().terminal_at,
        }
    }

    /// Append an event without blocking
    ///
    /// Returns `false` if the event was rejected: anything published after
    /// `BatchCompleted` (including a second `BatchCompleted`) is dropped.
    pub fn publish(&self, event: ProgressEvent) -> bool {
        let mut state = match self.publish_state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        if state.terminal_at.is_some() {
            tracing::warn!(
                session_id = %self.session_id,
                event = event.name(),
                "Rejected event published after BatchCompleted"
            );
            return false;
        }

        if event.is_terminal() {
            state.terminal_at = Some(Instant::now());
        }
        self.counters.record(&event);

        // The channel owns a sender and a (possibly parked) receiver, so send
        // only fails if the receiver was dropped with its subscription gone
        self.tx.send(event).is_ok()
    }

    fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<ProgressEvent>> {
        match self.rx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn park_receiver(&self, rx: mpsc::UnboundedReceiver<ProgressEvent>) {
        match self.rx.lock() {
            Ok(mut slot) => *slot = Some(rx),
            Err(poisoned) => *poisoned.into_inner() = Some(rx),
        }
    }
}

/// Process-wide map from session id to its progress channel
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    channels: Arc<RwLock<HashMap<SessionId, Arc<ProgressChannel>>>>,
}

impl ProgressRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register the channel for a new session
    ///
    /// Session ids are freshly generated, so an existing entry is never replaced.
    pub async fn register(&self, session_id: SessionId) -> Result<Arc<ProgressChannel>> {
        let mut channels = self.channels.write().await;
        if channels.contains_key(&session_id) {
            return Err(Error::Other(format!(
                "progress channel for session {session_id} already exists"
            )));
        }
        let channel = Arc::new(ProgressChannel::new(session_id));
        channels.insert(session_id, Arc::clone(&channel));
        Ok(channel)
    }

    /// Attach the single consumer of a session's progress stream
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`] if no channel exists for the id
    /// - [`Error::StreamBusy`] if another subscription currently holds the stream
    pub async fn subscribe(
        &self,
        session_id: SessionId,
        wait_timeout: Duration,
    ) -> Result<ProgressSubscription> {
        let channel = {
            let channels = self.channels.read().await;
            channels
                .get(&session_id)
                .cloned()
                .ok_or(Error::SessionNotFound(session_id))?
        };

        let rx = channel
            .take_receiver()
            .ok_or(Error::StreamBusy(session_id))?;

        Ok(ProgressSubscription {
            channel,
            rx: Some(rx),
            wait_timeout,
            finished: false,
            registry: self.clone(),
        })
    }

    /// Whether a channel exists for the session
    pub async fn contains(&self, session_id: SessionId) -> bool {
        self.channels.read().await.contains_key(&session_id)
    }

    /// Drop a session's channel
    pub async fn remove(&self, session_id: SessionId) -> bool {
        self.channels.write().await.remove(&session_id).is_some()
    }

    /// Number of registered channels
    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Whether no channels are registered
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict channels whose batch finished more than `ttl` ago but whose
    /// terminal event was never consumed
    ///
    /// Returns the evicted session ids.
    pub async fn evict_abandoned(&self, ttl: Duration) -> Vec<SessionId> {
        let mut channels = self.channels.write().await;
        let expired: Vec<SessionId> = channels
            .iter()
            .filter(|(_, channel)| {
                channel
                    .terminal_at()
                    .is_some_and(|at| at.elapsed() >= ttl)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            channels.remove(id);
        }
        expired
    }
}

/// The active consumer of one session's progress stream
///
/// Dropping a subscription before it has seen `BatchCompleted` hands the
/// stream back to the channel, so the observer can reconnect and resume
/// from the first undelivered event.
pub struct ProgressSubscription {
    channel: Arc<ProgressChannel>,
    rx: Option<mpsc::UnboundedReceiver<ProgressEvent>>,
    wait_timeout: Duration,
    finished: bool,
    registry: ProgressRegistry,
}

impl ProgressSubscription {
    /// Session being observed
    pub fn session_id(&self) -> SessionId {
        self.channel.session_id()
    }

    /// Whether the terminal event has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next event
    ///
    /// Returns `Some(Keepalive)` if nothing arrived within the wait timeout,
    /// and `None` once `BatchCompleted` has been delivered.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        let rx = self.rx.as_mut()?;

        match tokio::time::timeout(self.wait_timeout, rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.finish();
                }
                Some(event)
            }
            Ok(None) => {
                // Unreachable while the channel holds its sender
                self.finished = true;
                None
            }
            Err(_) => {
                tracing::debug!(session_id = %self.session_id(), "No progress within wait timeout, sending keepalive");
                Some(ProgressEvent::Keepalive)
            }
        }
    }

    /// Close the stream after the terminal event. Must not await: the event
    /// is already out of the receiver and is only delivered on return.
    fn finish(&mut self) {
        self.finished = true;
        self.rx = None;
        let session_id = self.session_id();
        match self.registry.channels.try_write() {
            Ok(mut channels) => {
                channels.remove(&session_id);
            }
            Err(_) => {
                let registry = self.registry.clone();
                tokio::spawn(async move {
                    registry.remove(session_id).await;
                });
            }
        }
        tracing::debug!(session_id = %session_id, "Progress stream delivered BatchCompleted, channel closed");
    }

    /// Turn the subscription into a stream that ends after `BatchCompleted`
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next_event()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.channel.park_receiver(rx);
        }
    }
}
