//! Integration tests for the progress engine over in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use trail_tracker::{
    CacheEntry, CacheStore, MemoryCacheStore, NoWeather, PointStore, ProgressEngine,
    TrackerConfig, TrailError, TrailPoint, TrailReference, TrailVertex, WeatherProvider,
    WeatherSnapshot,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, d, h, m, 0).unwrap()
}

/// Twenty-mile trail heading north along a meridian
fn trail() -> TrailReference {
    TrailReference::from_vertices(
        (0..=20)
            .map(|i| TrailVertex::new(-83.0, 35.0 + i as f64 / 69.0, i as f64, Some(3000.0 + i as f64 * 100.0)))
            .collect(),
    )
    .unwrap()
}

fn on_trail(mile: f64, t: DateTime<Utc>) -> TrailPoint {
    TrailPoint::new(35.0 + mile / 69.0, -83.0, t).with_velocity(2.2)
}

/// Day-partitioned store
#[derive(Default)]
struct MemoryPointStore {
    days: HashMap<NaiveDate, Vec<TrailPoint>>,
}

impl MemoryPointStore {
    fn insert(&mut self, point: TrailPoint) {
        self.days.entry(point.utc_date()).or_default().push(point);
    }
}

impl PointStore for MemoryPointStore {
    async fn list_days(&self) -> trail_tracker::Result<Vec<NaiveDate>> {
        let mut days: Vec<NaiveDate> = self.days.keys().copied().collect();
        days.sort();
        Ok(days)
    }

    async fn load_day(&self, date: NaiveDate) -> trail_tracker::Result<Vec<TrailPoint>> {
        Ok(self.days.get(&date).cloned().unwrap_or_default())
    }
}

/// Cache store that is always down
struct DownCache;

impl CacheStore for DownCache {
    fn get(&self, _key: &str, _now: DateTime<Utc>) -> trail_tracker::Result<Option<CacheEntry>> {
        Err(TrailError::cache("connection refused"))
    }

    fn put(&self, _key: &str, _entry: CacheEntry, _expiration: std::time::Duration) -> trail_tracker::Result<()> {
        Err(TrailError::cache("connection refused"))
    }
}

struct CountingWeather(AtomicUsize);

impl WeatherProvider for CountingWeather {
    async fn current(&self, lat: f64, _lon: f64) -> trail_tracker::Result<Option<WeatherSnapshot>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Some(WeatherSnapshot {
            temperature_f: 70.0 - (lat - 35.0) * 100.0,
            weather_code: Some(0),
            wind_speed_mph: None,
            observed_at: None,
        }))
    }
}

/// Three days of hiking, with a camp cluster and a town detour
fn three_day_store() -> MemoryPointStore {
    let mut store = MemoryPointStore::default();
    // Day 1: mile 0 to 6, camp jitter at the end
    for (i, mile) in [0.0, 2.0, 4.0, 6.0].iter().enumerate() {
        store.insert(on_trail(*mile, at(1, 13 + i as u32, 0)));
    }
    store.insert(TrailPoint::new(35.0 + 6.0 / 69.0 + 0.00005, -83.0, at(1, 20, 0)));
    store.insert(TrailPoint::new(35.0 + 6.0 / 69.0 - 0.00005, -83.0, at(1, 23, 0)));
    // Day 2: mile 6 to 15, one ping from town five miles east
    for (i, mile) in [7.0, 10.0, 13.0, 15.0].iter().enumerate() {
        store.insert(on_trail(*mile, at(2, 12 + 2 * i as u32, 0)));
    }
    store.insert(TrailPoint::new(35.0 + 15.0 / 69.0, -82.9, at(2, 21, 0)));
    // Day 3: zero day in town
    store.insert(TrailPoint::new(35.0 + 15.0 / 69.0, -82.9, at(3, 10, 0)));
    store
}

fn config() -> TrackerConfig {
    TrackerConfig::new(date(1), 20.0)
}

#[tokio::test]
async fn test_full_report() {
    let engine = ProgressEngine::new(config(), Some(trail()), three_day_store(), MemoryCacheStore::default(), NoWeather)
        .unwrap();
    let report = engine.report(at(3, 12, 0)).await;
    let summary = &report.summary;

    assert!(!report.degraded);
    assert!((summary.total_miles_completed - 15.0).abs() < 0.01);
    assert!((summary.miles_remaining - 5.0).abs() < 0.01);
    assert!((summary.percent_complete - 75.0).abs() < 0.1);
    assert_eq!(summary.current_day_on_trail, 3);

    // No on-trail progress today, so the latest hiking day is shown
    assert!(!summary.daily_distance.is_today);
    assert_eq!(summary.daily_distance.date, Some(date(2)));
    assert!((summary.daily_distance.miles - 8.0).abs() < 0.01);

    let longest = summary.longest_day.as_ref().unwrap();
    assert_eq!(longest.date, date(2));
    // Gain is summed per day: 600 ft on day 1, 800 ft on day 2
    assert!((summary.total_elevation_gain_feet - 1400.0).abs() < 1.0);

    // Camp jitter folded into the mile-6 ping
    let camp = report
        .points
        .iter()
        .find(|p| p.trail_mile.map_or(false, |m| (m - 6.0).abs() < 0.01))
        .unwrap();
    assert_eq!(camp.stationary_pings, 3);
    assert_eq!(camp.last_ping_time, Some(at(1, 23, 0)));

    // Town pings are off-trail but still on the map, one per UTC day
    let off: Vec<&TrailPoint> = report.points.iter().filter(|p| !p.on_trail).collect();
    assert_eq!(off.len(), 2);
    assert!(off.iter().all(|p| p.stationary_pings == 1));
    assert!(off.iter().all(|p| p.trail_mile.is_none()));

    let last = summary.last_position.as_ref().unwrap();
    assert!(!last.on_trail);
    assert_eq!(last.timestamp, at(3, 10, 0));
}

#[tokio::test]
async fn test_down_cache_still_reports() {
    let engine = ProgressEngine::new(config(), Some(trail()), three_day_store(), DownCache, NoWeather).unwrap();

    let first = engine.report(at(3, 12, 0)).await;
    let second = engine.report(at(3, 12, 0)).await;

    assert!(!first.degraded);
    assert!(!second.from_cache);
    assert_eq!(first.summary, second.summary);
    assert_eq!(engine.computation_count(), 2);
}

#[tokio::test]
async fn test_shared_cache_across_engines() {
    let cache = Arc::new(MemoryCacheStore::default());
    let now = at(3, 12, 0);

    let first = ProgressEngine::new(config(), Some(trail()), three_day_store(), cache.clone(), NoWeather).unwrap();
    let computed = first.report(now).await;

    let second = ProgressEngine::new(config(), Some(trail()), MemoryPointStore::default(), cache.clone(), NoWeather)
        .unwrap();
    let served = second.report(now + Duration::seconds(20)).await;

    assert!(served.from_cache);
    assert_eq!(served.summary, computed.summary);
    assert_eq!(second.computation_count(), 0);
}

#[tokio::test]
async fn test_weather_uses_last_position() {
    let weather = CountingWeather(AtomicUsize::new(0));
    let engine = ProgressEngine::new(config(), Some(trail()), three_day_store(), MemoryCacheStore::default(), weather)
        .unwrap();

    let report = engine.report(at(3, 12, 0)).await;
    let snapshot = report.weather.unwrap();
    let expected = 70.0 - (15.0 / 69.0) * 100.0;
    assert!((snapshot.temperature_f - expected).abs() < 1e-6);
    assert!(!report.degraded);
}

#[tokio::test]
async fn test_empty_store_gives_zero_summary() {
    let engine = ProgressEngine::new(config(), Some(trail()), MemoryPointStore::default(), MemoryCacheStore::default(), CountingWeather(AtomicUsize::new(0)))
        .unwrap();

    let report = engine.report(at(1, 12, 0)).await;
    assert!(!report.degraded);
    assert!(report.points.is_empty());
    assert!(report.weather.is_none());
    assert_eq!(report.summary.total_miles_completed, 0.0);
    assert_eq!(report.summary.current_day_on_trail, 1);
    assert!(report.summary.days_remaining.is_none());
}

#[cfg(feature = "persistence")]
#[tokio::test]
async fn test_sqlite_cache_store() {
    use trail_tracker::SqliteCacheStore;

    let engine = ProgressEngine::new(
        config(),
        Some(trail()),
        three_day_store(),
        SqliteCacheStore::in_memory().unwrap(),
        NoWeather,
    )
    .unwrap();

    let first = engine.report(at(3, 12, 0)).await;
    let second = engine.report(at(3, 12, 0) + Duration::seconds(30)).await;
    assert!(second.from_cache);
    assert_eq!(first.summary, second.summary);
    assert_eq!(engine.computation_count(), 1);
}
