//! # weather-batch
//!
//! Bounded-parallel batch weather lookups with live progress streaming and
//! session-scoped results.
//!
//! A caller submits a credential and a list of ZIP codes and immediately
//! gets a [`SessionId`] back. The batch then runs in the background: at most
//! five provider calls are in flight at once, every key produces exactly one
//! outcome, and a failing key never stops the others. Progress is published
//! on a per-session stream that ends with a single `BatchCompleted` event.
//! Once the batch has completed, its successful records can be previewed or
//! exported as CSV until the session expires.
//!
//! ## Quick Start
//!
//! ```no_run
//! use weather_batch::{BatchOrchestrator, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = BatchOrchestrator::new(Config::default())?;
//!
//!     let zips = vec!["10001".to_string(), "94105".to_string()];
//!     let session_id = orchestrator.submit("my-api-key", &zips).await?;
//!
//!     // Follow the batch until it completes
//!     let mut progress = orchestrator.stream_progress(session_id).await?;
//!     while let Some(event) = progress.next_event().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     let preview = orchestrator.preview(session_id).await?;
//!     println!("{} records", preview.total_results);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// CSV export
pub mod export;
/// Batch orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Bounded-parallel worker pool
pub mod pool;
/// Per-session progress channels
pub mod progress;
/// Data providers
pub mod provider;
/// Committed session results
pub mod store;
/// Core types and events
pub mod types;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, FailureKind, FetchError, Result, ToHttpStatus};
pub use orchestrator::BatchOrchestrator;
pub use progress::ProgressSubscription;
pub use provider::{DataProvider, OpenWeatherProvider};
pub use types::{
    BatchRequest, BatchState, BatchStatus, HealthStatus, ItemOutcome, OutcomeClass,
    ProgressEvent, ResultPreview, Session, SessionId, WeatherRecord,
};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use weather_batch::{BatchOrchestrator, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = BatchOrchestrator::new(Config::default())?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: BatchOrchestrator) -> Result<()> {
    wait_for_signal().await;
    orchestrator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
