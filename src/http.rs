//! Open-Meteo weather client.
//!
//! Fetches current conditions at the hiker's last position. Rate limiting
//! (429) and transport errors are retried a few times with exponential
//! backoff; any other non-success status is returned as [`TrailError::Http`]
//! and the engine degrades the report.

use std::time::Duration;

use chrono::{NaiveDateTime, TimeZone, Utc};
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::engine::{WeatherProvider, WeatherSnapshot};
use crate::error::{Result, TrailError};

pub const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 500;

/// Forecast endpoint response, reduced to the `current` block.
#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentConditions>,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    /// Local ISO time without seconds, e.g. `2026-04-01T12:15`
    time: Option<String>,
    temperature_2m: Option<f64>,
    weather_code: Option<i32>,
    wind_speed_10m: Option<f64>,
}

impl CurrentConditions {
    fn into_snapshot(self) -> Option<WeatherSnapshot> {
        let temperature_f = self.temperature_2m.filter(|t| t.is_finite())?;
        let observed_at = self
            .time
            .as_deref()
            .and_then(|t| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M").ok())
            .map(|t| Utc.from_utc_datetime(&t));
        Some(WeatherSnapshot {
            temperature_f,
            weather_code: self.weather_code,
            wind_speed_mph: self.wind_speed_10m,
            observed_at,
        })
    }
}

/// Weather provider backed by the Open-Meteo forecast API.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against another deployment (or a local mock).
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrailError::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn forecast_url(&self) -> String {
        format!("{}/v1/forecast", self.base_url)
    }

    fn backoff(retry: u32) -> Duration {
        Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))
    }

    /// Fetch current conditions at a position.
    ///
    /// `Ok(None)` means the API answered without a usable temperature.
    pub async fn fetch_current(&self, lat: f64, lon: f64) -> Result<Option<WeatherSnapshot>> {
        let query = [
            ("latitude", format!("{:.4}", lat)),
            ("longitude", format!("{:.4}", lon)),
            (
                "current",
                "temperature_2m,weather_code,wind_speed_10m".to_string(),
            ),
            ("temperature_unit", "fahrenheit".to_string()),
            ("wind_speed_unit", "mph".to_string()),
            ("timezone", "GMT".to_string()),
        ];

        let mut retries = 0;
        loop {
            let response = self.client.get(self.forecast_url()).query(&query).send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RETRIES {
                        retries += 1;
                        let backoff = Self::backoff(retries);
                        warn!("[OpenMeteo] 429, retry {} after {:?}", retries, backoff);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(TrailError::Http {
                            message: format!("forecast request failed: {}", status),
                            status_code: Some(status.as_u16()),
                        });
                    }

                    let body: ForecastResponse = resp.json().await?;
                    let snapshot = body.current.and_then(CurrentConditions::into_snapshot);
                    debug!(
                        "[OpenMeteo] ({:.3}, {:.3}): {:?}",
                        lat,
                        lon,
                        snapshot.as_ref().map(|s| s.temperature_f)
                    );
                    return Ok(snapshot);
                }
                Err(e) if retries < MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                    retries += 1;
                    let backoff = Self::backoff(retries);
                    warn!("[OpenMeteo] {}, retry {} after {:?}", e, retries, backoff);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Blocking variant for callers without an async runtime.
    pub fn fetch_current_blocking(&self, lat: f64, lon: f64) -> Result<Option<WeatherSnapshot>> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| TrailError::weather(format!("runtime error: {}", e)))?;
        rt.block_on(self.fetch_current(lat, lon))
    }
}

impl WeatherProvider for OpenMeteoClient {
    async fn current(&self, lat: f64, lon: f64) -> Result<Option<WeatherSnapshot>> {
        self.fetch_current(lat, lon).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_current_block() {
        let json = r#"{
            "latitude": 35.56,
            "longitude": -83.5,
            "current": {
                "time": "2026-04-01T12:15",
                "interval": 900,
                "temperature_2m": 54.3,
                "weather_code": 61,
                "wind_speed_10m": 7.4
            }
        }"#;
        let body: ForecastResponse = serde_json::from_str(json).unwrap();
        let snapshot = body.current.and_then(CurrentConditions::into_snapshot).unwrap();

        assert_eq!(snapshot.temperature_f, 54.3);
        assert_eq!(snapshot.weather_code, Some(61));
        assert_eq!(snapshot.wind_speed_mph, Some(7.4));
        assert_eq!(
            snapshot.observed_at,
            Some(Utc.with_ymd_and_hms(2026, 4, 1, 12, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_temperature_is_none() {
        let body: ForecastResponse =
            serde_json::from_str(r#"{"current": {"time": "2026-04-01T12:15"}}"#).unwrap();
        assert!(body.current.and_then(CurrentConditions::into_snapshot).is_none());

        let body: ForecastResponse = serde_json::from_str("{}").unwrap();
        assert!(body.current.is_none());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = OpenMeteoClient::with_base_url("http://localhost:8080/").unwrap();
        assert_eq!(client.forecast_url(), "http://localhost:8080/v1/forecast");
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(OpenMeteoClient::backoff(1), Duration::from_millis(1000));
        assert_eq!(OpenMeteoClient::backoff(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        // Port 9 (discard) on localhost refuses connections
        let client = OpenMeteoClient::with_base_url("http://127.0.0.1:9").unwrap();
        let result = client.fetch_current(35.0, -83.0).await;
        assert!(result.is_err());
    }
}
