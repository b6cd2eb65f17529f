//! Shared test helpers: record fixtures and an instrumented in-process provider.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::FetchError;
use crate::provider::DataProvider;
use crate::types::WeatherRecord;

/// A plausible record for the given key
pub(crate) fn record(key: &str) -> WeatherRecord {
    WeatherRecord {
        zip_code: key.to_string(),
        city: format!("City {key}"),
        date_time_utc: "2024-05-01T12:00:00+00:00".to_string(),
        temp_f: 68.0,
        temp_c: 20.0,
        feels_like_f: 66.2,
        feels_like_c: 19.0,
        humidity: 50,
        pressure_hpa: 1012,
        wind_speed_mps: 3.5,
        wind_direction_deg: 180,
        cloud_cover_percent: 20,
        sunrise_utc: "2024-05-01T10:00:00+00:00".to_string(),
        sunset_utc: "2024-05-02T00:00:00+00:00".to_string(),
        weather_description: "few clouds".to_string(),
    }
}

/// Config tuned for fast tests: no reporting delay, short waits, no sweeper
pub(crate) fn fast_config() -> Config {
    let mut config = Config::default();
    config.fetch.item_delay_ms = 0;
    config.fetch.request_timeout = Duration::from_secs(2);
    config.progress.keepalive_interval = Duration::from_millis(200);
    config.retention.enabled = false;
    config
}

/// Scriptable provider that records how many calls overlap
#[derive(Default)]
pub(crate) struct FakeProvider {
    delay: Duration,
    failures: HashMap<String, FetchError>,
    panics: HashSet<String>,
    hangs: HashSet<String>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls for `key` fail with `error`
    pub(crate) fn failing(mut self, key: &str, error: FetchError) -> Self {
        self.failures.insert(key.to_string(), error);
        self
    }

    /// Calls for `key` panic
    pub(crate) fn panicking(mut self, key: &str) -> Self {
        self.panics.insert(key.to_string());
        self
    }

    /// Calls for `key` never return
    pub(crate) fn hanging(mut self, key: &str) -> Self {
        self.hangs.insert(key.to_string());
        self
    }

    /// Every call waits for one permit from `gate` before answering
    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl DataProvider for FakeProvider {
    async fn fetch(&self, key: &str, _credential: &str) -> Result<WeatherRecord, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.hangs.contains(key) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panics.contains(key) {
            panic!("provider exploded for {key}");
        }
        if let Some(error) = self.failures.get(key) {
            return Err(error.clone());
        }
        Ok(record(key))
    }

    fn name(&self) -> &str {
        "fake"
    }
}
