//! Batch submission and the background run of each batch.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::pool::WorkerPool;
use crate::progress::{ProgressChannel, ProgressCounters};
use crate::types::{
    BatchRequest, BatchState, BatchStatus, ItemOutcome, ProgressEvent, Session, SessionId,
};

use super::BatchOrchestrator;

/// State machine and live counters of one batch
pub(crate) struct BatchTracker {
    total: usize,
    submitted_at: DateTime<Utc>,
    phase: StdMutex<Phase>,
    counters: Arc<ProgressCounters>,
}

struct Phase {
    state: BatchState,
    completed_at: Option<DateTime<Utc>>,
}

impl BatchTracker {
    fn new(total: usize, counters: Arc<ProgressCounters>) -> Self {
        Self {
            total,
            submitted_at: Utc::now(),
            phase: StdMutex::new(Phase {
                state: BatchState::Created,
                completed_at: None,
            }),
            counters,
        }
    }

    fn with_phase<T>(&self, f: impl FnOnce(&mut Phase) -> T) -> T {
        match self.phase.lock() {
            Ok(mut phase) => f(&mut phase),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub(crate) fn state(&self) -> BatchState {
        self.with_phase(|phase| phase.state)
    }

    /// Move to `next`, refusing anything but `Created -> Running -> Completed`
    fn advance(&self, session_id: SessionId, next: BatchState, at: DateTime<Utc>) -> bool {
        self.with_phase(|phase| {
            if !phase.state.can_transition_to(next) {
                tracing::warn!(
                    session_id = %session_id,
                    from = ?phase.state,
                    to = ?next,
                    "Rejected illegal batch state transition"
                );
                return false;
            }
            phase.state = next;
            if next == BatchState::Completed {
                phase.completed_at = Some(at);
            }
            true
        })
    }

    fn snapshot(&self, session_id: SessionId) -> BatchStatus {
        let (state, completed_at) = self.with_phase(|phase| (phase.state, phase.completed_at));
        BatchStatus {
            session_id,
            state,
            total: self.total,
            processed: self.counters.processed(),
            succeeded: self.counters.succeeded(),
            submitted_at: self.submitted_at,
            completed_at,
        }
    }
}

/// Summary carried by BatchCompleted
pub(crate) fn completion_message(succeeded: usize, total: usize) -> String {
    format!("Successfully processed {succeeded} out of {total} ZIP codes")
}

impl BatchOrchestrator {
    /// Submit a batch and return its session id immediately
    ///
    /// Every key is run unchanged as its own item, so duplicates and blank
    /// entries each produce an outcome. The batch runs in the background and
    /// no provider call happens on the calling path.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the credential is blank or every key is
    ///   blank; no session is created
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has been called
    pub async fn submit(&self, credential: &str, keys: &[String]) -> Result<SessionId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let credential = credential.trim();
        if credential.is_empty() {
            return Err(Error::validation("api_key", "API key is required"));
        }

        if keys.iter().all(|key| key.trim().is_empty()) {
            return Err(Error::validation(
                "zip_codes",
                "At least one ZIP code is required",
            ));
        }

        let keys = keys.to_vec();
        let session_id = SessionId::new();
        let channel = self.progress.register(session_id).await?;
        let tracker = Arc::new(BatchTracker::new(keys.len(), channel.counters()));
        self.batches
            .write()
            .await
            .insert(session_id, Arc::clone(&tracker));

        tracing::info!(session_id = %session_id, total = keys.len(), "Batch submitted");

        let orchestrator = self.clone();
        let credential = credential.to_string();
        tokio::spawn(async move {
            orchestrator
                .run_batch(session_id, credential, keys, channel, tracker)
                .await;
        });

        Ok(session_id)
    }

    /// [`submit`](Self::submit) for a deserialized request body
    pub async fn submit_request(&self, request: &BatchRequest) -> Result<SessionId> {
        self.submit(&request.api_key, &request.zip_codes).await
    }

    /// Current state and counters of a batch
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for unknown or evicted sessions.
    pub async fn status(&self, session_id: SessionId) -> Result<BatchStatus> {
        let batches = self.batches.read().await;
        batches
            .get(&session_id)
            .map(|tracker| tracker.snapshot(session_id))
            .ok_or(Error::SessionNotFound(session_id))
    }

    /// Number of batches that have not completed yet
    pub async fn active_batches(&self) -> usize {
        self.batches
            .read()
            .await
            .values()
            .filter(|tracker| tracker.state() != BatchState::Completed)
            .count()
    }

    async fn run_batch(
        &self,
        session_id: SessionId,
        credential: String,
        keys: Vec<String>,
        channel: Arc<ProgressChannel>,
        tracker: Arc<BatchTracker>,
    ) {
        let total = keys.len();
        tracker.advance(session_id, BatchState::Running, Utc::now());
        channel.publish(ProgressEvent::Started { total });

        let pool = WorkerPool::from_config(Arc::clone(&self.provider), &self.config.fetch);
        let items = pool.run(&credential, &keys, &channel).await;

        let results: Vec<_> = items
            .into_iter()
            .filter_map(|item| match item.outcome {
                ItemOutcome::Success(record) => Some(record),
                ItemOutcome::Failure(_) => None,
            })
            .collect();
        let succeeded = results.len();
        let completed_at = Utc::now();

        // Results must be readable by the time an observer sees BatchCompleted
        if let Err(e) = self
            .store
            .commit(Session {
                id: session_id,
                results,
                completed_at,
            })
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to commit session results");
        }
        tracker.advance(session_id, BatchState::Completed, completed_at);

        channel.publish(ProgressEvent::BatchCompleted {
            succeeded,
            total,
            message: completion_message(succeeded, total),
        });

        tracing::info!(
            session_id = %session_id,
            succeeded,
            failed = total - succeeded,
            total,
            "Batch completed"
        );
    }
}
