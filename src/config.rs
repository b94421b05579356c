//! Tracker configuration.
//!
//! Start date and trail length are required; everything else has a default.
//! A configuration that fails [`TrackerConfig::validate`] is the one error
//! that fails a request outright.

use std::time::Duration;

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};

use crate::classifier::DEFAULT_OFF_TRAIL_THRESHOLD_MILES;
use crate::dedupe::DEFAULT_STATIONARY_THRESHOLD_FEET;
use crate::error::{OptionExt, Result, TrailError};
use crate::geo_utils::feet_to_miles;
use crate::stats::StatsConfig;

pub const ENV_TRAIL_START_DATE: &str = "TRAIL_START_DATE";
pub const ENV_TRAIL_TOTAL_MILES: &str = "TRAIL_TOTAL_MILES";
pub const ENV_OFF_TRAIL_THRESHOLD_MILES: &str = "OFF_TRAIL_THRESHOLD_MILES";
pub const ENV_STATIONARY_THRESHOLD_FEET: &str = "STATIONARY_THRESHOLD_FEET";
pub const ENV_STATS_CACHE_TTL_SECS: &str = "STATS_CACHE_TTL_SECS";
pub const ENV_WEATHER_CACHE_TTL_SECS: &str = "WEATHER_CACHE_TTL_SECS";

fn default_off_trail_threshold() -> f64 {
    DEFAULT_OFF_TRAIL_THRESHOLD_MILES
}

fn default_stationary_threshold() -> f64 {
    feet_to_miles(DEFAULT_STATIONARY_THRESHOLD_FEET)
}

fn default_true() -> bool {
    true
}

fn default_stats_ttl() -> u64 {
    60
}

fn default_weather_ttl() -> u64 {
    15 * 60
}

fn default_parallel_reads() -> usize {
    8
}

/// Configuration for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// First day on trail (UTC)
    pub trail_start_date: NaiveDate,
    /// Length of the whole trail in miles
    pub total_trail_miles: f64,
    /// Maximum distance from the trail for a ping to count as on-trail.
    /// Default: 0.25 miles
    #[serde(default = "default_off_trail_threshold")]
    pub off_trail_threshold_miles: f64,
    /// Radius within which consecutive pings are folded together.
    /// Default: 100 feet
    #[serde(default = "default_stationary_threshold")]
    pub stationary_threshold_miles: f64,
    /// Only on-trail pings feed the statistics. Default: true
    #[serde(default = "default_true")]
    pub on_trail_only: bool,
    /// Freshness window of the cached summary. Default: 60 seconds
    #[serde(default = "default_stats_ttl")]
    pub stats_ttl_secs: u64,
    /// Freshness window of the cached weather. Default: 15 minutes
    #[serde(default = "default_weather_ttl")]
    pub weather_ttl_secs: u64,
    /// Maximum concurrent per-day store reads. Default: 8
    #[serde(default = "default_parallel_reads")]
    pub max_parallel_reads: usize,
}

impl TrackerConfig {
    /// Create a configuration with defaults for everything optional.
    pub fn new(trail_start_date: NaiveDate, total_trail_miles: f64) -> Self {
        Self {
            trail_start_date,
            total_trail_miles,
            off_trail_threshold_miles: default_off_trail_threshold(),
            stationary_threshold_miles: default_stationary_threshold(),
            on_trail_only: true,
            stats_ttl_secs: default_stats_ttl(),
            weather_ttl_secs: default_weather_ttl(),
            max_parallel_reads: default_parallel_reads(),
        }
    }

    pub fn with_off_trail_threshold(mut self, miles: f64) -> Self {
        self.off_trail_threshold_miles = miles;
        self
    }

    pub fn with_stationary_threshold_feet(mut self, feet: f64) -> Self {
        self.stationary_threshold_miles = feet_to_miles(feet);
        self
    }

    pub fn with_on_trail_only(mut self, on_trail_only: bool) -> Self {
        self.on_trail_only = on_trail_only;
        self
    }

    pub fn with_stats_ttl(mut self, ttl: Duration) -> Self {
        self.stats_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_weather_ttl(mut self, ttl: Duration) -> Self {
        self.weather_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_max_parallel_reads(mut self, reads: usize) -> Self {
        self.max_parallel_reads = reads;
        self
    }

    /// Check every value, reporting the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !(self.total_trail_miles.is_finite() && self.total_trail_miles > 0.0) {
            return Err(TrailError::config(format!(
                "total trail miles must be positive, got {}",
                self.total_trail_miles
            )));
        }
        if !(self.off_trail_threshold_miles.is_finite() && self.off_trail_threshold_miles > 0.0) {
            return Err(TrailError::config(format!(
                "off-trail threshold must be positive, got {}",
                self.off_trail_threshold_miles
            )));
        }
        if !(self.stationary_threshold_miles.is_finite() && self.stationary_threshold_miles >= 0.0)
        {
            return Err(TrailError::config(format!(
                "stationary threshold must be non-negative, got {}",
                self.stationary_threshold_miles
            )));
        }
        if self.max_parallel_reads == 0 {
            return Err(TrailError::config("max parallel reads must be at least 1"));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| TrailError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any variable lookup; `TRAIL_START_DATE` (YYYY-MM-DD) and
    /// `TRAIL_TOTAL_MILES` are required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let start_raw = lookup(ENV_TRAIL_START_DATE).ok_or_missing_config(ENV_TRAIL_START_DATE)?;
        let start = NaiveDate::parse_from_str(start_raw.trim(), "%Y-%m-%d").map_err(|e| {
            TrailError::config(format!("{} '{}': {}", ENV_TRAIL_START_DATE, start_raw, e))
        })?;
        let total = parse_var::<f64, _>(&lookup, ENV_TRAIL_TOTAL_MILES)?
            .ok_or_missing_config(ENV_TRAIL_TOTAL_MILES)?;

        let mut config = Self::new(start, total);
        if let Some(miles) = parse_var::<f64, _>(&lookup, ENV_OFF_TRAIL_THRESHOLD_MILES)? {
            config.off_trail_threshold_miles = miles;
        }
        if let Some(feet) = parse_var::<f64, _>(&lookup, ENV_STATIONARY_THRESHOLD_FEET)? {
            config.stationary_threshold_miles = feet_to_miles(feet);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_STATS_CACHE_TTL_SECS)? {
            config.stats_ttl_secs = secs;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_WEATHER_CACHE_TTL_SECS)? {
            config.weather_ttl_secs = secs;
        }

        config.validate()?;
        info!(
            "[TrackerConfig] Loaded: start {}, {} miles, off-trail threshold {} mi",
            config.trail_start_date, config.total_trail_miles, config.off_trail_threshold_miles
        );
        Ok(config)
    }

    pub fn stats_config(&self) -> StatsConfig {
        StatsConfig::new(self.trail_start_date, self.total_trail_miles)
            .with_on_trail_only(self.on_trail_only)
    }

    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_secs)
    }

    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_secs)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TrailError::config(format!("{} '{}': {}", name, raw, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::new(start(), 2197.4);
        assert_eq!(config.off_trail_threshold_miles, 0.25);
        assert!((config.stationary_threshold_miles - 0.0189).abs() < 1e-4);
        assert!(config.on_trail_only);
        assert_eq!(config.stats_ttl(), Duration::from_secs(60));
        assert!(config.weather_ttl() > config.stats_ttl());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = TrackerConfig::new(start(), 2197.4);
        assert!(TrackerConfig::new(start(), 0.0).validate().is_err());
        assert!(TrackerConfig::new(start(), f64::NAN).validate().is_err());
        assert!(base.clone().with_off_trail_threshold(-1.0).validate().is_err());
        assert!(base.clone().with_max_parallel_reads(0).validate().is_err());
        let err = base.with_off_trail_threshold(0.0).validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_from_lookup() {
        let config = TrackerConfig::from_lookup(lookup_from(&[
            ("TRAIL_START_DATE", "2026-03-01"),
            ("TRAIL_TOTAL_MILES", "2197.4"),
            ("OFF_TRAIL_THRESHOLD_MILES", "0.5"),
            ("STATIONARY_THRESHOLD_FEET", "264"),
            ("STATS_CACHE_TTL_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.trail_start_date, start());
        assert_eq!(config.off_trail_threshold_miles, 0.5);
        assert!((config.stationary_threshold_miles - 0.05).abs() < 1e-12);
        assert_eq!(config.stats_ttl_secs, 30);
        assert_eq!(config.weather_ttl_secs, 900);
    }

    #[test]
    fn test_from_lookup_missing_required() {
        let err = TrackerConfig::from_lookup(lookup_from(&[("TRAIL_TOTAL_MILES", "2197.4")]))
            .unwrap_err();
        assert!(err.to_string().contains("TRAIL_START_DATE"));

        let err = TrackerConfig::from_lookup(lookup_from(&[("TRAIL_START_DATE", "2026-03-01")]))
            .unwrap_err();
        assert!(err.to_string().contains("TRAIL_TOTAL_MILES"));
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        let bad_date = TrackerConfig::from_lookup(lookup_from(&[
            ("TRAIL_START_DATE", "March 1st"),
            ("TRAIL_TOTAL_MILES", "2197.4"),
        ]));
        assert!(matches!(bad_date, Err(TrailError::Config { .. })));

        let bad_number = TrackerConfig::from_lookup(lookup_from(&[
            ("TRAIL_START_DATE", "2026-03-01"),
            ("TRAIL_TOTAL_MILES", "lots"),
        ]));
        assert!(matches!(bad_number, Err(TrailError::Config { .. })));
    }

    #[test]
    fn test_from_json() {
        let config = TrackerConfig::from_json(
            r#"{"trailStartDate": "2026-03-01", "totalTrailMiles": 2197.4, "onTrailOnly": false}"#,
        )
        .unwrap();
        assert!(!config.on_trail_only);
        assert_eq!(config.off_trail_threshold_miles, 0.25);
        assert!(!config.stats_config().on_trail_only);

        let missing = TrackerConfig::from_json(r#"{"totalTrailMiles": 2197.4}"#);
        assert!(matches!(missing, Err(TrailError::Config { .. })));
    }
}
