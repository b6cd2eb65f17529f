//! Error types for weather-batch
//!
//! Two families of errors live here:
//! - [`Error`]: request-level failures (validation, unknown session, no data,
//!   shutdown, configuration). These are surfaced to the caller.
//! - [`FetchError`]: item-level failures produced by a [`DataProvider`](crate::provider::DataProvider)
//!   call. These never abort a batch; they become part of the batch outcome.
//!
//! HTTP status mapping for the API layer is provided by [`ToHttpStatus`].

use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for weather-batch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for weather-batch
#[derive(Debug, Error)]
pub enum Error {
    /// Request shape was rejected before any work was started
    #[error("validation error: {message}")]
    Validation {
        /// Human-readable description of what is wrong
        message: String,
        /// The request field that failed validation (e.g., "api_key")
        field: Option<String>,
    },

    /// Session is unknown, evicted, or has not completed yet
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session completed but produced no successful records
    #[error("no data available for session {0}")]
    NoData(SessionId),

    /// The progress stream of a session is already being consumed
    #[error("progress stream for session {0} is already being consumed")]
    StreamBusy(SessionId),

    /// A result set was already committed for this session
    #[error("results for session {0} were already committed")]
    AlreadyCommitted(SessionId),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_requests")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error outside of an individual item fetch
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] tied to a request field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Classification of a failed provider call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Credential rejected by the provider (HTTP 401)
    RateLimitedOrAuth,
    /// Key is unknown to the provider (HTTP 404)
    NotFound,
    /// Any other non-success HTTP status
    Api {
        /// The HTTP status code returned by the provider
        status: u16,
    },
    /// The call did not finish within the per-call timeout
    Timeout,
    /// Transport-level failure (connect, reset, DNS, ...)
    Network,
    /// Anything else, including malformed payloads and panics in the provider
    Unexpected,
}

/// Item-level failure produced by a single provider call
///
/// Failures are values, not control flow: the worker pool records them as
/// outcomes and keeps going.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize, ToSchema)]
#[error("{message} (key {key})")]
pub struct FetchError {
    /// Classified cause
    pub kind: FailureKind,
    /// Human-readable message, suitable for display
    pub message: String,
    /// Input key the failure belongs to
    pub key: String,
}

impl FetchError {
    /// Create a failure with an explicit kind and message
    pub fn new(kind: FailureKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            key: key.into(),
        }
    }

    /// Build a failure from a non-success HTTP status
    pub fn from_status(key: impl Into<String>, status: u16) -> Self {
        let (kind, message) = match status {
            401 => (FailureKind::RateLimitedOrAuth, "Invalid API key".to_string()),
            404 => (FailureKind::NotFound, "ZIP code not found".to_string()),
            other => (FailureKind::Api { status: other }, format!("API Error {other}")),
        };
        Self::new(kind, key, message)
    }

    /// Request exceeded the per-call timeout
    pub fn timeout(key: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, key, "Request timeout")
    }

    /// Transport-level failure
    pub fn network(key: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::new(FailureKind::Network, key, format!("Network error: {detail}"))
    }

    /// Catch-all failure
    pub fn unexpected(key: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::new(
            FailureKind::Unexpected,
            key,
            format!("Unexpected error: {detail}"),
        )
    }
}

/// API error response format
///
/// Returned by API endpoints when a request fails.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "session_not_found",
///     "message": "session not found: 6f1c...",
///     "details": {
///       "session_id": "6f1c..."
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "session_not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::Config { .. } => 400,

            Error::SessionNotFound(_) => 404,
            Error::NoData(_) => 404,

            Error::StreamBusy(_) => 409,
            Error::AlreadyCommitted(_) => 409,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::SessionNotFound(_) => "session_not_found",
            Error::NoData(_) => "no_data",
            Error::StreamBusy(_) => "stream_busy",
            Error::AlreadyCommitted(_) => "already_committed",
            Error::ShuttingDown => "shutting_down",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::SessionNotFound(id)
            | Error::NoData(id)
            | Error::StreamBusy(id)
            | Error::AlreadyCommitted(id) => Some(serde_json::json!({ "session_id": id })),
            _ => None,
        };

        match details {
            Some(details) => ApiError::with_details(code, message, details),
            None => ApiError::new(code, message),
        }
    }
}
