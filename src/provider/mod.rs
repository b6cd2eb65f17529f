//! Data providers: one input key in, one record or one classified failure out.
//!
//! The worker pool only depends on the [`DataProvider`] trait, so tests and
//! alternative backends can stand in for [`OpenWeatherProvider`].

mod openweather;

pub use openweather::OpenWeatherProvider;

use crate::error::FetchError;
use crate::types::WeatherRecord;

/// Abstraction over a single external lookup, enabling testability.
///
/// Implementations must classify every failure into a [`FetchError`] rather
/// than panic; the pool still converts a panic into an `Unexpected` failure.
#[async_trait::async_trait]
pub trait DataProvider: Send + Sync {
    /// Look up one key with the given credential
    async fn fetch(&self, key: &str, credential: &str) -> Result<WeatherRecord, FetchError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "provider"
    }
}
