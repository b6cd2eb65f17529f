//! Worker pool: runs one provider call per input key under a concurrency cap.
//!
//! All keys are spawned up front; a semaphore admits at most
//! `max_concurrent` calls at a time. Outcomes are reported in completion
//! order. Each call is isolated: a failure, timeout, or panic becomes a
//! [`ItemOutcome::Failure`] and the remaining keys keep going, so the pool
//! always yields exactly one outcome per key.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::progress::ProgressChannel;
use crate::provider::DataProvider;
use crate::types::{ItemOutcome, ProgressEvent};

/// Outcome of one input key, tagged with its submission position
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedItem {
    /// Zero-based position of the key in the submitted sequence
    pub position: usize,
    /// The input key
    pub key: String,
    /// What the provider call produced
    pub outcome: ItemOutcome,
}

/// Bounded-parallel executor of provider calls
#[derive(Clone)]
pub struct WorkerPool {
    provider: Arc<dyn DataProvider>,
    max_concurrent: usize,
    call_timeout: Duration,
    item_delay: Duration,
}

impl WorkerPool {
    /// Create a pool with explicit limits
    ///
    /// A `max_concurrent` of zero is treated as one.
    pub fn new(
        provider: Arc<dyn DataProvider>,
        max_concurrent: usize,
        call_timeout: Duration,
        item_delay: Duration,
    ) -> Self {
        Self {
            provider,
            max_concurrent: max_concurrent.max(1),
            call_timeout,
            item_delay,
        }
    }

    /// Create a pool from the fetch section of the configuration
    pub fn from_config(provider: Arc<dyn DataProvider>, config: &FetchConfig) -> Self {
        Self::new(
            provider,
            config.max_concurrent_requests,
            config.request_timeout,
            config.item_delay(),
        )
    }

    /// Concurrency cap of this pool
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run every key to an outcome, publishing item events as outcomes arrive
    ///
    /// For each outcome an `ItemError` (failures only) and then an `ItemDone`
    /// event are published before the reporting delay. Returns the outcomes
    /// in completion order.
    pub async fn run(
        &self,
        credential: &str,
        keys: &[String],
        progress: &ProgressChannel,
    ) -> Vec<CompletedItem> {
        let total = keys.len();
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let credential: Arc<str> = Arc::from(credential);
        let mut workers = JoinSet::new();

        for (position, key) in keys.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let provider = Arc::clone(&self.provider);
            let credential = Arc::clone(&credential);
            let key = key.clone();
            let call_timeout = self.call_timeout;

            workers.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        call_provider(provider.as_ref(), &key, &credential, call_timeout).await
                    }
                    Err(_) => {
                        ItemOutcome::Failure(FetchError::unexpected(&key, "worker pool closed"))
                    }
                };
                CompletedItem {
                    position,
                    key,
                    outcome,
                }
            });
        }

        let mut reported = vec![false; total];
        let mut completed = Vec::with_capacity(total);

        while let Some(joined) = workers.join_next().await {
            let item = match joined {
                Ok(item) => item,
                Err(e) => {
                    tracing::error!(session_id = %progress.session_id(), error = %e, "Worker task aborted");
                    continue;
                }
            };
            reported[item.position] = true;
            self.report(progress, completed.len() + 1, total, &item);
            completed.push(item);

            if !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }
        }

        // A worker that died without reporting still owes its key an outcome
        for (position, key) in keys.iter().enumerate() {
            if reported[position] {
                continue;
            }
            let item = CompletedItem {
                position,
                key: key.clone(),
                outcome: ItemOutcome::Failure(FetchError::unexpected(key, "worker task aborted")),
            };
            self.report(progress, completed.len() + 1, total, &item);
            completed.push(item);
        }

        completed
    }

    fn report(&self, progress: &ProgressChannel, index: usize, total: usize, item: &CompletedItem) {
        match &item.outcome {
            ItemOutcome::Success(_) => {
                tracing::debug!(
                    session_id = %progress.session_id(),
                    key = %item.key,
                    index,
                    total,
                    "Item completed"
                );
            }
            ItemOutcome::Failure(failure) => {
                tracing::warn!(
                    session_id = %progress.session_id(),
                    key = %item.key,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "Item failed"
                );
                progress.publish(ProgressEvent::ItemError {
                    key: item.key.clone(),
                    message: failure.message.clone(),
                });
            }
        }

        progress.publish(ProgressEvent::ItemDone {
            index,
            total,
            key: item.key.clone(),
            outcome_class: item.outcome.class(),
        });
    }
}

/// One isolated provider call: timeouts and panics become failures
async fn call_provider(
    provider: &dyn DataProvider,
    key: &str,
    credential: &str,
    call_timeout: Duration,
) -> ItemOutcome {
    let call = AssertUnwindSafe(provider.fetch(key, credential)).catch_unwind();

    match tokio::time::timeout(call_timeout, call).await {
        Ok(Ok(result)) => result.into(),
        Ok(Err(panic)) => {
            let detail = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("provider panicked");
            ItemOutcome::Failure(FetchError::unexpected(key, detail))
        }
        Err(_) => ItemOutcome::Failure(FetchError::timeout(key)),
    }
}
