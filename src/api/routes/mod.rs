//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`batches`] — Batch submission and the live progress stream
//! - [`results`] — Preview, CSV download, and batch status
//! - [`system`] — Health and OpenAPI

use crate::error::{Error, Result};
use crate::types::SessionId;
use serde::{Deserialize, Serialize};

mod batches;
mod results;
mod system;

// Re-export all handlers so `routes::function_name` works from the router
pub use batches::*;
pub use results::*;
pub use system::*;

/// Response body of `POST /fetch-weather`
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct SubmitResponse {
    /// Handle for the progress stream and the results of the batch
    pub session_id: SessionId,
}

/// Parse a session id taken from the request path
pub(crate) fn parse_session_id(raw: &str) -> Result<SessionId> {
    raw.parse()
        .map_err(|_| Error::validation("session_id", format!("invalid session id '{raw}'")))
}
