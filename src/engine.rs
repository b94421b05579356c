//! # Progress Engine
//!
//! Request orchestration around the pure pipeline.
//!
//! The engine is the only place that suspends: it lists and loads stored
//! pings, asks the weather provider about the latest position, and consults
//! the injected cache. Everything between loading and responding
//! ([`annotate_points`], [`compute_stats`]) is synchronous and pure.
//!
//! ## Failure policy
//!
//! - An invalid [`TrackerConfig`] is rejected by [`ProgressEngine::new`].
//! - A failed day read is skipped; a failed day listing yields no points.
//!   Either way the report is marked `degraded` and is not cached.
//! - A failed weather lookup leaves `weather` empty and marks the report
//!   `degraded`.
//! - Cache failures are recomputes, see [`TtlCache`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheStore, TtlCache, STATS_CACHE_KEY, WEATHER_CACHE_KEY};
use crate::config::TrackerConfig;
use crate::error::Result;
use crate::stats::{compute_stats, StatsSummary};
use crate::{annotate_points, TrailPoint, TrailReference};

// ============================================================================
// Collaborators
// ============================================================================

/// Source of stored pings, partitioned by UTC day.
pub trait PointStore: Send + Sync {
    /// Days for which pings are stored.
    fn list_days(&self) -> impl Future<Output = Result<Vec<NaiveDate>>> + Send;

    /// Raw pings stored for one day.
    fn load_day(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<TrailPoint>>> + Send;
}

/// Current conditions near a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSnapshot {
    pub temperature_f: f64,
    /// WMO weather interpretation code
    pub weather_code: Option<i32>,
    pub wind_speed_mph: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Weather lookup for the latest position.
pub trait WeatherProvider: Send + Sync {
    fn current(
        &self,
        lat: f64,
        lon: f64,
    ) -> impl Future<Output = Result<Option<WeatherSnapshot>>> + Send;
}

/// Provider for deployments without weather.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWeather;

impl WeatherProvider for NoWeather {
    async fn current(&self, _lat: f64, _lon: f64) -> Result<Option<WeatherSnapshot>> {
        Ok(None)
    }
}

// ============================================================================
// Report
// ============================================================================

/// Everything the response and map collaborators need for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub summary: StatsSummary,
    /// Annotated, deduplicated pings for the map
    pub points: Vec<TrailPoint>,
    pub weather: Option<WeatherSnapshot>,
    /// A collaborator failed and the report is partial
    pub degraded: bool,
    /// Summary and points were served from the cache
    pub from_cache: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedReport {
    summary: StatsSummary,
    points: Vec<TrailPoint>,
}

struct LoadedPoints {
    points: Vec<TrailPoint>,
    degraded: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Ties the store, the pipeline, the cache and the weather provider together.
pub struct ProgressEngine<P, C, W = NoWeather> {
    config: TrackerConfig,
    trail: Option<TrailReference>,
    store: P,
    cache: TtlCache<C>,
    weather: W,
    computations: AtomicU64,
}

impl<P, C, W> ProgressEngine<P, C, W>
where
    P: PointStore,
    C: CacheStore,
    W: WeatherProvider,
{
    /// Create an engine. Fails only if `config` is invalid.
    pub fn new(
        config: TrackerConfig,
        trail: Option<TrailReference>,
        store: P,
        cache: C,
        weather: W,
    ) -> Result<Self> {
        config.validate()?;
        match &trail {
            Some(t) => info!(
                "[ProgressEngine] Initialized with {} trail segments ({:.1} mi, index: {})",
                t.segment_count(),
                t.total_miles(),
                t.has_index()
            ),
            None => warn!("[ProgressEngine] Initialized without trail data, all pings count as on-trail"),
        }
        Ok(Self {
            config,
            trail,
            store,
            cache: TtlCache::new(cache),
            weather,
            computations: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn trail(&self) -> Option<&TrailReference> {
        self.trail.as_ref()
    }

    pub fn cache(&self) -> &TtlCache<C> {
        &self.cache
    }

    /// Number of times points were loaded and the summary recomputed.
    pub fn computation_count(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    /// Run the annotation pipeline with the configured thresholds.
    pub fn process(&self, points: &[TrailPoint]) -> Vec<TrailPoint> {
        annotate_points(
            points,
            self.trail.as_ref(),
            self.config.off_trail_threshold_miles,
            self.config.stationary_threshold_miles,
        )
    }

    /// Summarize already annotated points.
    pub fn summarize(&self, points: &[TrailPoint], now: DateTime<Utc>) -> StatsSummary {
        compute_stats(points, &self.config.stats_config(), now)
    }

    /// Load every stored day, at most `max_parallel_reads` at a time.
    ///
    /// Failed reads are skipped. The result is in chronological order.
    async fn load_points(&self) -> LoadedPoints {
        let days = match self.store.list_days().await {
            Ok(days) => days,
            Err(e) => {
                warn!("[ProgressEngine] Could not list stored days: {}", e);
                return LoadedPoints {
                    points: Vec::new(),
                    degraded: true,
                };
            }
        };

        let store = &self.store;
        let results: Vec<(NaiveDate, Result<Vec<TrailPoint>>)> = stream::iter(days)
            .map(|day| async move { (day, store.load_day(day).await) })
            .buffered(self.config.max_parallel_reads.max(1))
            .collect()
            .await;

        let mut degraded = false;
        let mut points = Vec::new();
        for (day, result) in results {
            match result {
                Ok(mut day_points) => points.append(&mut day_points),
                Err(e) => {
                    warn!("[ProgressEngine] Skipping {}: {}", day, e);
                    degraded = true;
                }
            }
        }
        points.sort_by_key(|p| p.timestamp);

        LoadedPoints { points, degraded }
    }

    /// Summary and points, from the cache when fresh.
    ///
    /// Returns `(report, from_cache, degraded)`.
    async fn summary_and_points(&self, now: DateTime<Utc>) -> (CachedReport, bool, bool) {
        let ttl = self.config.stats_ttl();
        if let Some(cached) = self.cache.get_fresh::<CachedReport>(STATS_CACHE_KEY, ttl, now) {
            debug!("[ProgressEngine] Serving cached summary");
            return (cached, true, false);
        }

        let loaded = self.load_points().await;
        self.computations.fetch_add(1, Ordering::Relaxed);

        let points = self.process(&loaded.points);
        let summary = self.summarize(&points, now);
        info!(
            "[ProgressEngine] Computed summary from {} pings ({} after folding): {:.1} mi",
            loaded.points.len(),
            points.len(),
            summary.total_miles_completed
        );

        let report = CachedReport { summary, points };
        if !loaded.degraded {
            self.cache.put(STATS_CACHE_KEY, &report, ttl, now);
        }
        (report, false, loaded.degraded)
    }

    /// Weather at the given position, from the cache when fresh.
    ///
    /// Returns `(weather, failed)`.
    async fn weather_at(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> (Option<WeatherSnapshot>, bool) {
        let ttl = self.config.weather_ttl();
        if let Some(cached) = self.cache.get_fresh::<WeatherSnapshot>(WEATHER_CACHE_KEY, ttl, now) {
            return (Some(cached), false);
        }

        match self.weather.current(lat, lon).await {
            Ok(Some(snapshot)) => {
                self.cache.put(WEATHER_CACHE_KEY, &snapshot, ttl, now);
                (Some(snapshot), false)
            }
            Ok(None) => (None, false),
            Err(e) => {
                warn!("[ProgressEngine] Weather lookup failed: {}", e);
                (None, true)
            }
        }
    }

    /// Build the progress report for a request at `now`.
    pub async fn report(&self, now: DateTime<Utc>) -> ProgressReport {
        let (cached, from_cache, store_degraded) = self.summary_and_points(now).await;

        let (weather, weather_failed) = match &cached.summary.last_position {
            Some(pos) => self.weather_at(pos.lat, pos.lon, now).await,
            None => (None, false),
        };

        ProgressReport {
            summary: cached.summary,
            points: cached.points,
            weather,
            degraded: store_degraded || weather_failed,
            from_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::error::TrailError;
    use crate::TrailVertex;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn at(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, d, hour, 0, 0).unwrap()
    }

    /// Store over a fixed map, with optional failing days
    #[derive(Default)]
    struct FakeStore {
        days: BTreeMap<NaiveDate, Vec<TrailPoint>>,
        failing: Vec<NaiveDate>,
        fail_listing: bool,
        loads: Arc<AtomicUsize>,
    }

    impl PointStore for FakeStore {
        async fn list_days(&self) -> Result<Vec<NaiveDate>> {
            if self.fail_listing {
                return Err(TrailError::store("listing unavailable"));
            }
            Ok(self.days.keys().copied().collect())
        }

        async fn load_day(&self, date: NaiveDate) -> Result<Vec<TrailPoint>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&date) {
                return Err(TrailError::store(format!("blob for {} unreadable", date)));
            }
            Ok(self.days.get(&date).cloned().unwrap_or_default())
        }
    }

    struct FailingWeather;

    impl WeatherProvider for FailingWeather {
        async fn current(&self, _lat: f64, _lon: f64) -> Result<Option<WeatherSnapshot>> {
            Err(TrailError::weather("upstream timeout"))
        }
    }

    struct FixedWeather(Arc<AtomicUsize>);

    impl WeatherProvider for FixedWeather {
        async fn current(&self, _lat: f64, _lon: f64) -> Result<Option<WeatherSnapshot>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Some(WeatherSnapshot {
                temperature_f: 54.0,
                weather_code: Some(3),
                wind_speed_mph: Some(6.5),
                observed_at: None,
            }))
        }
    }

    /// Ten-mile trail running due east along the equator
    fn trail() -> TrailReference {
        TrailReference::from_vertices(
            (0..=10)
                .map(|i| TrailVertex::new(i as f64 / 69.0, 0.0, i as f64, Some(1000.0 + i as f64 * 50.0)))
                .collect(),
        )
        .unwrap()
    }

    fn ping(mile: f64, t: DateTime<Utc>) -> TrailPoint {
        TrailPoint::new(0.0, mile / 69.0, t).with_velocity(2.5)
    }

    fn store() -> FakeStore {
        let mut days = BTreeMap::new();
        days.insert(day(1), vec![ping(0.0, at(1, 12)), ping(3.0, at(1, 15))]);
        days.insert(day(2), vec![ping(4.0, at(2, 12)), ping(7.5, at(2, 16))]);
        FakeStore {
            days,
            ..FakeStore::default()
        }
    }

    fn config() -> TrackerConfig {
        TrackerConfig::new(day(1), 10.0)
    }

    #[tokio::test]
    async fn test_report_computes_summary() {
        let engine = ProgressEngine::new(config(), Some(trail()), store(), MemoryCacheStore::default(), NoWeather).unwrap();
        let report = engine.report(at(2, 18)).await;

        assert!(!report.degraded);
        assert!(!report.from_cache);
        assert!(report.weather.is_none());
        assert_eq!(report.points.len(), 4);
        assert!((report.summary.total_miles_completed - 7.5).abs() < 0.01);
        assert_eq!(report.summary.current_day_on_trail, 2);
    }

    #[tokio::test]
    async fn test_second_report_within_ttl_is_cached() {
        let s = store();
        let loads = s.loads.clone();
        let engine = ProgressEngine::new(config(), Some(trail()), s, MemoryCacheStore::default(), NoWeather).unwrap();

        let first = engine.report(at(2, 18)).await;
        let loads_after_first = loads.load(Ordering::SeqCst);
        let second = engine.report(at(2, 18) + Duration::seconds(30)).await;

        assert!(second.from_cache);
        assert_eq!(second.summary, first.summary);
        assert_eq!(second.points, first.points);
        assert_eq!(loads.load(Ordering::SeqCst), loads_after_first);
        assert_eq!(engine.computation_count(), 1);

        let third = engine.report(at(2, 18) + Duration::seconds(90)).await;
        assert!(!third.from_cache);
        assert_eq!(engine.computation_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_day_is_skipped_and_not_cached() {
        let mut s = store();
        s.failing = vec![day(2)];
        let engine = ProgressEngine::new(config(), Some(trail()), s, MemoryCacheStore::default(), NoWeather).unwrap();

        let report = engine.report(at(2, 18)).await;
        assert!(report.degraded);
        assert_eq!(report.points.len(), 2);
        assert!((report.summary.total_miles_completed - 3.0).abs() < 0.01);

        engine.report(at(2, 18)).await;
        assert_eq!(engine.computation_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_listing_gives_empty_degraded_report() {
        let mut s = store();
        s.fail_listing = true;
        let engine = ProgressEngine::new(config(), Some(trail()), s, MemoryCacheStore::default(), NoWeather).unwrap();

        let report = engine.report(at(2, 18)).await;
        assert!(report.degraded);
        assert!(report.points.is_empty());
        assert_eq!(report.summary.total_miles_completed, 0.0);
        assert!(report.summary.last_position.is_none());
    }

    #[tokio::test]
    async fn test_weather_failure_degrades() {
        let engine = ProgressEngine::new(config(), Some(trail()), store(), MemoryCacheStore::default(), FailingWeather).unwrap();
        let report = engine.report(at(2, 18)).await;
        assert!(report.degraded);
        assert!(report.weather.is_none());
        assert!((report.summary.total_miles_completed - 7.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_weather_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = ProgressEngine::new(
            config(),
            Some(trail()),
            store(),
            MemoryCacheStore::default(),
            FixedWeather(calls.clone()),
        )
        .unwrap();

        let first = engine.report(at(2, 18)).await;
        let second = engine.report(at(2, 18) + Duration::minutes(5)).await;
        assert_eq!(first.weather, second.weather);
        assert_eq!(first.weather.map(|w| w.temperature_f), Some(54.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        engine.report(at(2, 18) + Duration::minutes(16)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let bad = TrackerConfig::new(day(1), -5.0);
        let result = ProgressEngine::new(bad, None, store(), MemoryCacheStore::default(), NoWeather);
        match result {
            Err(e) => assert!(e.is_fatal()),
            Ok(_) => panic!("negative trail length must be rejected"),
        }
    }

    #[tokio::test]
    async fn test_parallel_reads_bound_keeps_order() {
        let mut s = FakeStore::default();
        for d in 1..=12 {
            s.days.insert(day(d), vec![ping(d as f64 * 0.5, at(d, 12))]);
        }
        let engine = ProgressEngine::new(
            TrackerConfig::new(day(1), 10.0).with_max_parallel_reads(3),
            Some(trail()),
            s,
            MemoryCacheStore::default(),
            NoWeather,
        )
        .unwrap();

        let report = engine.report(at(12, 20)).await;
        assert_eq!(report.points.len(), 12);
        assert!(report.points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!((report.summary.total_miles_completed - 6.0).abs() < 0.01);
    }
}
