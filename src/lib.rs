//! # Trail Tracker
//!
//! Trail progress engine for a long-distance hike tracked by a satellite
//! messenger.
//!
//! This library provides:
//! - On/off-trail classification of pings against a reference polyline
//! - Trail-mile and trail-elevation snapping
//! - Stationary-ping deduplication with dwell annotations
//! - Daily and cumulative statistics (mileage, elevation records, speed, ETA)
//! - TTL memoization of computed summaries over an injected cache store
//!
//! ## Features
//!
//! - **`parallel`** - Classify points in parallel with rayon
//! - **`persistence`** - SQLite-backed cache store
//! - **`http`** - Open-Meteo weather client
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{NaiveDate, TimeZone, Utc};
//! use trail_tracker::{
//!     annotate_points, compute_stats, StatsConfig, TrailPoint, TrailReference, TrailVertex,
//! };
//!
//! let trail = TrailReference::from_vertices(vec![
//!     TrailVertex::new(0.0, 0.0, 0.0, Some(100.0)),
//!     TrailVertex::new(1.0, 0.0, 1.0, Some(200.0)),
//! ])
//! .unwrap();
//!
//! let t0 = Utc.with_ymd_and_hms(2026, 4, 1, 13, 0, 0).unwrap();
//! let pings = vec![
//!     TrailPoint::new(0.0, 0.25, t0),
//!     TrailPoint::new(0.0, 0.75, t0 + chrono::Duration::hours(3)),
//! ];
//!
//! let points = annotate_points(&pings, Some(&trail), 0.25, 100.0 / 5280.0);
//! assert!(points.iter().all(|p| p.on_trail));
//!
//! let config = StatsConfig::new(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), 1.0);
//! let summary = compute_stats(&points, &config, t0 + chrono::Duration::hours(4));
//! assert!((summary.total_miles_completed - 0.75).abs() < 1e-9);
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailError};

// Geographic utilities (haversine, segment projection)
pub mod geo_utils;

// Reference trail polyline
pub mod trail;
pub use trail::{SegmentMatch, TrailPosition, TrailReference, TrailVertex};

// R-tree over trail segments for large polylines
pub mod spatial_index;
pub use spatial_index::SegmentIndex;

// On/off-trail classification
pub mod classifier;
pub use classifier::{classify_and_snap, classify_points, ClassificationCounts};

// Trail-mile / trail-elevation snapping
pub mod snapping;
pub use snapping::snap_points;

// Stationary ping folding
pub mod dedupe;
pub use dedupe::dedupe_stationary;

// Daily and cumulative statistics
pub mod stats;
pub use stats::{
    calculate_current_day, compute_stats, DailyDistance, DailyStats, DayRecord,
    FinishProjection, LastPosition, StatsConfig, StatsSummary,
};

// TTL cache over injected stores
pub mod cache;
pub use cache::{CacheEntry, CacheStore, MemoryCacheStore, TtlCache};

// SQLite cache store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteCacheStore;

// Configuration
pub mod config;
pub use config::TrackerConfig;

// Request orchestration over store/weather collaborators
pub mod engine;
pub use engine::{
    NoWeather, PointStore, ProgressEngine, ProgressReport, WeatherProvider, WeatherSnapshot,
};

// HTTP weather client
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::OpenMeteoClient;

// Algorithm toolbox - standalone access to the pure pipeline stages
pub mod algorithms;

// ============================================================================
// Core Types
// ============================================================================

fn default_stationary_pings() -> u32 {
    1
}

/// A single location ping, with the annotations added by the pipeline.
///
/// The core payload (`lat`, `lon`, `timestamp`, `elevation_feet`,
/// `velocity_mph`) comes from the ingestion collaborator and is never changed.
/// The remaining fields are filled in by [`classify_points`],
/// [`snap_points`] and [`dedupe_stationary`], each of which returns a new
/// collection rather than mutating its input.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use trail_tracker::TrailPoint;
///
/// let t = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
/// let point = TrailPoint::new(34.6268, -84.1938, t).with_elevation(3782.0);
/// assert!(point.has_valid_coords());
/// assert_eq!(point.stationary_pings, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailPoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub elevation_feet: Option<f64>,
    #[serde(default)]
    pub velocity_mph: Option<f64>,

    /// Within the off-trail threshold of the reference polyline
    #[serde(default)]
    pub on_trail: bool,
    /// Interpolated cumulative mile at the snapped position
    #[serde(default)]
    pub trail_mile: Option<f64>,
    /// Interpolated reference elevation at the snapped position
    #[serde(default)]
    pub trail_elevation: Option<f64>,
    /// Time of the last ping folded into this one
    #[serde(default)]
    pub last_ping_time: Option<DateTime<Utc>>,
    /// Number of pings this point represents (itself included)
    #[serde(default = "default_stationary_pings")]
    pub stationary_pings: u32,
}

impl TrailPoint {
    /// Create an unannotated ping.
    pub fn new(lat: f64, lon: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            lat,
            lon,
            timestamp,
            elevation_feet: None,
            velocity_mph: None,
            on_trail: false,
            trail_mile: None,
            trail_elevation: None,
            last_ping_time: None,
            stationary_pings: 1,
        }
    }

    /// Set the device-reported elevation in feet.
    pub fn with_elevation(mut self, elevation_feet: f64) -> Self {
        self.elevation_feet = Some(elevation_feet);
        self
    }

    /// Set the device-reported velocity in mph.
    pub fn with_velocity(mut self, velocity_mph: f64) -> Self {
        self.velocity_mph = Some(velocity_mph);
        self
    }

    /// Check if the point has finite, in-range coordinates.
    pub fn has_valid_coords(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lon >= -180.0
            && self.lon <= 180.0
    }

    /// UTC calendar date of the ping; the key of its daily bucket.
    pub fn utc_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Time of the most recent ping this point stands for.
    pub fn latest_time(&self) -> DateTime<Utc> {
        self.last_ping_time.unwrap_or(self.timestamp).max(self.timestamp)
    }

    /// Clear the snapping annotations.
    pub(crate) fn clear_snap(&mut self) {
        self.trail_mile = None;
        self.trail_elevation = None;
    }
}

/// Run the full annotation pipeline: classify, snap, then fold stationary
/// pings.
///
/// This is the point array handed to the map-rendering collaborator and the
/// input expected by [`compute_stats`].
pub fn annotate_points(
    points: &[TrailPoint],
    trail: Option<&TrailReference>,
    off_trail_threshold_miles: f64,
    stationary_threshold_miles: f64,
) -> Vec<TrailPoint> {
    let snapped = classify_and_snap(points, trail, off_trail_threshold_miles);
    dedupe_stationary(&snapped, stationary_threshold_miles)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_point_validity() {
        assert!(TrailPoint::new(35.0, -83.0, t0()).has_valid_coords());
        assert!(!TrailPoint::new(f64::NAN, -83.0, t0()).has_valid_coords());
        assert!(!TrailPoint::new(35.0, f64::INFINITY, t0()).has_valid_coords());
        assert!(!TrailPoint::new(95.0, -83.0, t0()).has_valid_coords());
    }

    #[test]
    fn test_point_json_round_trip_defaults() {
        let json = r#"{"lat": 35.1, "lon": -83.2, "timestamp": "2026-04-01T12:00:00Z", "velocityMph": 2.5}"#;
        let p: TrailPoint = serde_json::from_str(json).unwrap();
        assert_eq!(p.velocity_mph, Some(2.5));
        assert!(!p.on_trail);
        assert_eq!(p.stationary_pings, 1);
        assert_eq!(p.utc_date(), NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());

        let out = serde_json::to_value(&p).unwrap();
        assert_eq!(out["onTrail"], false);
        assert!(out["trailMile"].is_null());
    }

    #[test]
    fn test_utc_date_bucket() {
        // 23:30 in New York on March 31 is already April 1 in UTC
        let t = Utc.with_ymd_and_hms(2026, 4, 1, 3, 30, 0).unwrap();
        let p = TrailPoint::new(35.0, -83.0, t);
        assert_eq!(p.utc_date(), NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
    }
}
