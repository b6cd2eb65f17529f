//! Batch orchestration split into focused submodules.
//!
//! The `BatchOrchestrator` struct and its methods are organized by concern:
//! - [`batch`] - Submission, background batch runs, and status tracking
//! - [`lifecycle`] - Graceful shutdown and the retention sweeper
//!
//! Read-side operations (progress stream, preview, export, health) live in
//! this file since they only delegate to the registry and store.

mod batch;
mod lifecycle;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::export::{self, CsvExport};
use crate::progress::{ProgressRegistry, ProgressSubscription};
use crate::provider::{DataProvider, OpenWeatherProvider};
use crate::store::SessionStore;
use crate::types::{HealthStatus, ResultPreview, Session, SessionId};

pub(crate) use batch::BatchTracker;

/// Entry point of the library (cloneable - all fields are Arc-wrapped)
///
/// Accepts batch submissions, runs each batch in the background, and serves
/// the progress stream and committed results of every session.
#[derive(Clone)]
pub struct BatchOrchestrator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Capability used for every item lookup
    pub(crate) provider: Arc<dyn DataProvider>,
    /// Progress channels of sessions whose terminal event was not consumed yet
    pub(crate) progress: ProgressRegistry,
    /// Committed result sets of completed batches
    pub(crate) store: SessionStore,
    /// State machine and counters of every known batch
    pub(crate) batches: Arc<RwLock<HashMap<SessionId, Arc<BatchTracker>>>>,
    /// Cleared during shutdown; new submissions are rejected afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled during shutdown to stop background services
    pub(crate) shutdown_token: CancellationToken,
}

impl BatchOrchestrator {
    /// Create an orchestrator backed by the OpenWeatherMap provider
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = OpenWeatherProvider::new(&config.fetch)?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    /// Create an orchestrator that fetches through the given provider
    pub fn with_provider(config: Config, provider: Arc<dyn DataProvider>) -> Self {
        tracing::debug!(
            provider = provider.name(),
            max_concurrent = config.fetch.max_concurrent_requests,
            "Creating batch orchestrator"
        );

        Self {
            config: Arc::new(config),
            provider,
            progress: ProgressRegistry::new(),
            store: SessionStore::new(),
            batches: Arc::new(RwLock::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attach to the live progress stream of a session
    ///
    /// The subscription yields `Keepalive` whenever no event arrives within
    /// the configured keepalive interval and ends after `BatchCompleted`.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionNotFound`](crate::Error::SessionNotFound) for unknown ids and for
    ///   sessions whose terminal event was already delivered
    /// - [`Error::StreamBusy`](crate::Error::StreamBusy) if another consumer holds the stream
    pub async fn stream_progress(&self, session_id: SessionId) -> Result<ProgressSubscription> {
        self.progress
            .subscribe(session_id, self.config.progress.keepalive_interval)
            .await
    }

    /// Full result set of a completed session (possibly empty)
    pub async fn get_results(&self, session_id: SessionId) -> Result<Arc<Session>> {
        self.store.get(session_id).await
    }

    /// First five records of a completed session plus its total
    pub async fn preview(&self, session_id: SessionId) -> Result<ResultPreview> {
        self.store.preview(session_id).await
    }

    /// Full ordered result set of a completed session with at least one record
    pub async fn export(&self, session_id: SessionId) -> Result<Arc<Session>> {
        self.store.export(session_id).await
    }

    /// Export rendered as a CSV attachment
    pub async fn export_csv(&self, session_id: SessionId) -> Result<CsvExport> {
        let session = self.store.export(session_id).await?;
        Ok(CsvExport {
            filename: export::download_filename(Utc::now()),
            content: export::to_csv(&session.results),
        })
    }

    /// Liveness probe
    pub fn health(&self) -> HealthStatus {
        HealthStatus::healthy()
    }
}
