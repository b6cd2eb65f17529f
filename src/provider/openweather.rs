//! OpenWeatherMap current-weather provider.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::DataProvider;
use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::types::WeatherRecord;

/// Production [`DataProvider`] backed by the OpenWeatherMap REST API.
pub struct OpenWeatherProvider {
    client: reqwest::Client,
    base_url: String,
    country_code: String,
    units: String,
}

impl OpenWeatherProvider {
    /// Build a provider whose HTTP client enforces the configured per-call timeout
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.provider_base_url.clone(),
            country_code: config.country_code.clone(),
            units: config.units.clone(),
        })
    }
}

#[async_trait::async_trait]
impl DataProvider for OpenWeatherProvider {
    async fn fetch(&self, key: &str, credential: &str) -> std::result::Result<WeatherRecord, FetchError> {
        let zip = format!("{},{}", key, self.country_code);
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("zip", zip.as_str()),
                ("appid", credential),
                ("units", self.units.as_str()),
            ])
            .send()
            .await
            .map_err(|e| classify_transport_error(key, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(key, status.as_u16()));
        }

        let payload: CurrentWeather = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(key)
            } else {
                FetchError::unexpected(key, e)
            }
        })?;

        payload.into_record(key)
    }

    fn name(&self) -> &str {
        "openweathermap"
    }
}

fn classify_transport_error(key: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(key)
    } else if error.is_connect() || error.is_request() || error.is_body() {
        FetchError::network(key, error)
    } else {
        FetchError::unexpected(key, error)
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    name: String,
    dt: i64,
    main: MainReadings,
    #[serde(default)]
    wind: Wind,
    #[serde(default)]
    clouds: Clouds,
    sys: Sun,
    weather: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    humidity: i64,
    pressure: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Wind {
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    deg: i64,
}

#[derive(Debug, Default, Deserialize)]
struct Clouds {
    #[serde(default)]
    all: i64,
}

#[derive(Debug, Deserialize)]
struct Sun {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

impl CurrentWeather {
    fn into_record(self, key: &str) -> std::result::Result<WeatherRecord, FetchError> {
        let description = self
            .weather
            .into_iter()
            .next()
            .map(|c| c.description)
            .ok_or_else(|| FetchError::unexpected(key, "response has no weather conditions"))?;

        Ok(WeatherRecord {
            zip_code: key.to_string(),
            city: self.name,
            date_time_utc: utc_rfc3339(key, self.dt)?,
            temp_f: round1(celsius_to_fahrenheit(self.main.temp)),
            temp_c: round1(self.main.temp),
            feels_like_f: round1(celsius_to_fahrenheit(self.main.feels_like)),
            feels_like_c: round1(self.main.feels_like),
            humidity: self.main.humidity,
            pressure_hpa: self.main.pressure,
            wind_speed_mps: self.wind.speed,
            wind_direction_deg: self.wind.deg,
            cloud_cover_percent: self.clouds.all,
            sunrise_utc: utc_rfc3339(key, self.sys.sunrise)?,
            sunset_utc: utc_rfc3339(key, self.sys.sunset)?,
            weather_description: description,
        })
    }
}

fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn utc_rfc3339(key: &str, unix_secs: i64) -> std::result::Result<String, FetchError> {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .map(|dt| dt.to_rfc3339())
        .ok_or_else(|| FetchError::unexpected(key, format!("timestamp {unix_secs} out of range")))
}
