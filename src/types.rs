//! Core types for weather-batch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::FetchError;

/// Opaque, globally unique handle for one submitted batch
///
/// The same id correlates the running batch, its progress stream, and the
/// result set committed once it completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// One batch submission: a credential and the ordered keys to look up
///
/// Duplicated keys are processed independently.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Provider credential (opaque)
    #[serde(default)]
    pub api_key: String,
    /// Input keys (ZIP codes), processed independently
    #[serde(default)]
    pub zip_codes: Vec<String>,
}

/// Current-weather observation for one input key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeatherRecord {
    /// Input key the record was fetched for
    pub zip_code: String,
    /// Location name reported by the provider
    pub city: String,
    /// Observation time (UTC, RFC 3339)
    pub date_time_utc: String,
    /// Temperature in Fahrenheit
    pub temp_f: f64,
    /// Temperature in Celsius
    pub temp_c: f64,
    /// Feels-like temperature in Fahrenheit
    pub feels_like_f: f64,
    /// Feels-like temperature in Celsius
    pub feels_like_c: f64,
    /// Relative humidity in percent
    pub humidity: i64,
    /// Atmospheric pressure in hPa
    pub pressure_hpa: i64,
    /// Wind speed in meters per second
    pub wind_speed_mps: f64,
    /// Wind direction in degrees
    pub wind_direction_deg: i64,
    /// Cloud cover in percent
    pub cloud_cover_percent: i64,
    /// Sunrise (UTC, RFC 3339)
    pub sunrise_utc: String,
    /// Sunset (UTC, RFC 3339)
    pub sunset_utc: String,
    /// Short textual description ("light rain")
    pub weather_description: String,
}

/// Per-key result of a provider call
#[derive(Clone, Debug, PartialEq)]
pub enum ItemOutcome {
    /// The provider returned a record
    Success(WeatherRecord),
    /// The provider call failed; the batch keeps going
    Failure(FetchError),
}

impl ItemOutcome {
    /// Whether this outcome carries a record
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }

    /// Progress classification for this outcome
    pub fn class(&self) -> OutcomeClass {
        match self {
            ItemOutcome::Success(_) => OutcomeClass::Completed,
            ItemOutcome::Failure(_) => OutcomeClass::Error,
        }
    }
}

impl From<std::result::Result<WeatherRecord, FetchError>> for ItemOutcome {
    fn from(result: std::result::Result<WeatherRecord, FetchError>) -> Self {
        match result {
            Ok(record) => ItemOutcome::Success(record),
            Err(failure) => ItemOutcome::Failure(failure),
        }
    }
}

/// Outcome classification carried by [`ProgressEvent::ItemDone`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeClass {
    /// The item produced a record
    Completed,
    /// The item failed
    Error,
}

/// Event published on a session's progress channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Batch started processing
    Started {
        /// Number of input keys
        total: usize,
    },

    /// One item has an outcome
    ItemDone {
        /// 1-based count of items finished so far (completion order)
        index: usize,
        /// Number of input keys
        total: usize,
        /// Input key of the finished item
        key: String,
        /// Whether the item produced a record
        outcome_class: OutcomeClass,
    },

    /// One item failed (always followed by its ItemDone)
    ItemError {
        /// Input key of the failed item
        key: String,
        /// Failure message
        message: String,
    },

    /// Terminal event, published exactly once per session
    BatchCompleted {
        /// Number of items that produced a record
        succeeded: usize,
        /// Number of input keys
        total: usize,
        /// Human-readable summary
        message: String,
    },

    /// Synthetic liveness signal when no event arrived within the wait timeout
    Keepalive,
}

impl ProgressEvent {
    /// Whether this is the terminal event of a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::BatchCompleted { .. })
    }

    /// Event name, as used for the SSE `event:` field
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Started { .. } => "started",
            ProgressEvent::ItemDone { .. } => "item_done",
            ProgressEvent::ItemError { .. } => "item_error",
            ProgressEvent::BatchCompleted { .. } => "batch_completed",
            ProgressEvent::Keepalive => "keepalive",
        }
    }
}

/// Per-session batch state machine: `Created -> Running -> Completed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// Session allocated, pool not started yet
    Created,
    /// Worker pool is running
    Running,
    /// All items have an outcome and results are committed
    Completed,
}

impl BatchState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: BatchState) -> bool {
        matches!(
            (self, next),
            (BatchState::Created, BatchState::Running)
                | (BatchState::Running, BatchState::Completed)
        )
    }
}

/// Snapshot of a batch for status queries
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchStatus {
    /// Session id
    pub session_id: SessionId,
    /// Current state
    pub state: BatchState,
    /// Number of input keys
    pub total: usize,
    /// Items finished so far
    pub processed: usize,
    /// Items that produced a record so far
    pub succeeded: usize,
    /// When the batch was submitted
    pub submitted_at: DateTime<Utc>,
    /// When the batch completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Committed, immutable result set of a completed batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    /// Session id
    pub id: SessionId,
    /// Successful records in completion order
    pub results: Vec<WeatherRecord>,
    /// Completion timestamp
    pub completed_at: DateTime<Utc>,
}

/// First few records of a session plus its total size
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ResultPreview {
    /// Up to the first five records
    pub data: Vec<WeatherRecord>,
    /// Number of records in the session
    pub total_results: usize,
    /// Number of records in `data`
    pub preview_count: usize,
}

/// Liveness probe response
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    /// Always "healthy" while the process serves requests
    pub status: String,
    /// Time of the probe
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    /// A healthy status stamped with the current time
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
        }
    }
}
