//! Application state for the API server

use crate::{BatchOrchestrator, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The orchestrator serving every batch and session
    pub orchestrator: Arc<BatchOrchestrator>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(orchestrator: Arc<BatchOrchestrator>, config: Arc<Config>) -> Self {
        Self {
            orchestrator,
            config,
        }
    }
}
