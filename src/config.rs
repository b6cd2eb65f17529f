//! Configuration types for weather-batch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use utoipa::ToSchema;

/// Worker pool and provider settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchConfig {
    /// Maximum provider calls in flight per batch (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Per-call timeout in seconds (default: 10)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Pause after each reported outcome, in milliseconds (default: 100)
    ///
    /// Throttles the reporting side only; calls already admitted by the
    /// concurrency cap keep running during the pause.
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Current-weather endpoint of the provider
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,

    /// Country code appended to every ZIP lookup (default: "US")
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Unit system requested from the provider (default: "metric")
    #[serde(default = "default_units")]
    pub units: String,
}

impl FetchConfig {
    /// Reporting delay as a [`Duration`]
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            request_timeout: default_request_timeout(),
            item_delay_ms: default_item_delay_ms(),
            provider_base_url: default_provider_base_url(),
            country_code: default_country_code(),
            units: default_units(),
        }
    }
}

/// Progress stream settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProgressConfig {
    /// How long a consumer waits for the next event before a keepalive is
    /// substituted, in seconds (default: 30)
    #[serde(default = "default_keepalive_interval", with = "duration_serde")]
    pub keepalive_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

/// Session retention settings
///
/// Completed sessions are evicted once they have not been read for
/// `session_ttl`. Progress channels whose batch completed more than
/// `session_ttl` ago without anyone consuming the terminal event are
/// evicted as well.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Run the periodic sweeper (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Idle time after which a session is evicted, in seconds (default: 3600)
    #[serde(default = "default_session_ttl", with = "duration_serde")]
    pub session_ttl: Duration,

    /// Sweep period, in seconds (default: 60)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_ttl: default_session_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5328)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for [`BatchOrchestrator`](crate::BatchOrchestrator)
///
/// Every field has a default, so `{}` is a valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Worker pool and provider settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Progress stream settings
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Session retention settings
    #[serde(default)]
    pub retention: RetentionConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pool or progress stream cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrent_requests == 0 {
            return Err(Error::Config {
                message: "max_concurrent_requests must be at least 1".to_string(),
                key: Some("max_concurrent_requests".to_string()),
            });
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request_timeout must be greater than zero".to_string(),
                key: Some("request_timeout".to_string()),
            });
        }
        if self.progress.keepalive_interval.is_zero() {
            return Err(Error::Config {
                message: "keepalive_interval must be greater than zero".to_string(),
                key: Some("keepalive_interval".to_string()),
            });
        }
        if self.retention.enabled && self.retention.sweep_interval.is_zero() {
            return Err(Error::Config {
                message: "sweep_interval must be greater than zero when retention is enabled"
                    .to_string(),
                key: Some("sweep_interval".to_string()),
            });
        }
        if self.fetch.provider_base_url.trim().is_empty() {
            return Err(Error::Config {
                message: "provider_base_url must not be empty".to_string(),
                key: Some("provider_base_url".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_item_delay_ms() -> u64 {
    100
}

fn default_provider_base_url() -> String {
    "http://api.openweathermap.org/data/2.5/weather".to_string()
}

fn default_country_code() -> String {
    "US".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5328))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
