//! Shutdown coordination and session retention.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::types::{BatchState, SessionId};

use super::BatchOrchestrator;

/// Upper bound on how long shutdown waits for running batches
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl BatchOrchestrator {
    /// Gracefully shut down the orchestrator
    ///
    /// New submissions are rejected with `ShuttingDown` from here on. Running
    /// batches are not cancelled; shutdown waits up to 30 seconds for them to
    /// complete, then stops background services.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new batches");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_batches()).await {
            Ok(()) => tracing::info!("All running batches completed"),
            Err(_) => tracing::warn!(
                active = self.active_batches().await,
                "Timeout waiting for batches to complete, proceeding with shutdown"
            ),
        }

        self.shutdown_token.cancel();
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether new batches are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_active_batches(&self) {
        loop {
            let active = self.active_batches().await;
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for running batches to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Start the periodic retention sweep
    ///
    /// Returns an already-finished handle when retention is disabled. The
    /// task stops when [`shutdown`](Self::shutdown) completes.
    pub fn start_retention_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let retention = self.config.retention.clone();
        if !retention.enabled {
            tracing::info!("Session retention disabled, skipping sweeper");
            return tokio::spawn(async {});
        }

        let orchestrator = self.clone();
        let token = self.shutdown_token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(retention.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::debug!("Retention sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        orchestrator.sweep_expired(retention.session_ttl).await;
                    }
                }
            }
        });

        tracing::info!(
            ttl_secs = retention.session_ttl.as_secs(),
            interval_secs = retention.sweep_interval.as_secs(),
            "Retention sweeper started"
        );
        handle
    }

    /// Evict everything idle for at least `ttl`
    ///
    /// Removes stored sessions not read for `ttl`, progress channels whose
    /// terminal event went unconsumed for `ttl`, and the status of completed
    /// batches that have neither left. Running batches are never touched.
    /// Returns the ids of the batches forgotten entirely.
    pub async fn sweep_expired(&self, ttl: Duration) -> Vec<SessionId> {
        let evicted_sessions = self.store.evict_idle(ttl).await;
        let abandoned_channels = self.progress.evict_abandoned(ttl).await;

        let completed: Vec<SessionId> = self
            .batches
            .read()
            .await
            .iter()
            .filter(|(_, tracker)| tracker.state() == BatchState::Completed)
            .map(|(id, _)| *id)
            .collect();

        let mut forgotten = Vec::new();
        for id in completed {
            if !self.store.contains(id).await && !self.progress.contains(id).await {
                forgotten.push(id);
            }
        }
        if !forgotten.is_empty() {
            let mut batches = self.batches.write().await;
            for id in &forgotten {
                batches.remove(id);
            }
        }

        if !evicted_sessions.is_empty() || !abandoned_channels.is_empty() {
            tracing::info!(
                sessions = evicted_sessions.len(),
                channels = abandoned_channels.len(),
                batches = forgotten.len(),
                "Evicted expired sessions"
            );
        }
        forgotten
    }
}
