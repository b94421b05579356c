//! Daily and cumulative trail statistics.
//!
//! Everything here is a pure function of the annotated point array, the
//! trail constants and an injected `now`. Identical input gives an identical
//! [`StatsSummary`], which is what makes caching the summary safe.
//!
//! ## Distance rules
//!
//! Trail miles are the primary measure. Total distance is the furthest trail
//! mile reached, and a day's distance is the spread of trail miles within it.
//! Summed haversine between pings is only a fallback for when no trail-mile
//! data exists (total) or a day has fewer than two trail-mile pings
//! (per-day). That fallback undercounts a winding trail; no correction factor
//! is applied.
//!
//! ## Example
//! ```rust
//! use chrono::{NaiveDate, TimeZone, Utc};
//! use trail_tracker::{compute_stats, StatsConfig, TrailPoint};
//!
//! let day = |h| Utc.with_ymd_and_hms(2026, 4, 3, h, 0, 0).unwrap();
//! let mut a = TrailPoint::new(35.0, -83.0, day(9));
//! let mut b = TrailPoint::new(35.05, -83.0, day(17));
//! for (p, mile) in [(&mut a, 10.0), (&mut b, 14.5)] {
//!     p.on_trail = true;
//!     p.trail_mile = Some(mile);
//! }
//!
//! let config = StatsConfig::new(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(), 100.0);
//! let summary = compute_stats(&[a, b], &config, day(20));
//! assert!((summary.daily_distance.miles - 4.5).abs() < 1e-9);
//! assert_eq!(summary.current_day_on_trail, 3);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::geo_utils::track_length_miles;
use crate::TrailPoint;

/// Velocity above which the interval before a ping counts as moving time.
pub const MOVING_SPEED_THRESHOLD_MPH: f64 = 1.0;

// ============================================================================
// Configuration
// ============================================================================

/// Trail constants the aggregator needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsConfig {
    /// First day on trail (UTC)
    pub trail_start_date: NaiveDate,
    /// Length of the whole trail in miles
    pub total_trail_miles: f64,
    /// Ignore off-trail pings (town stops, side trips)
    pub on_trail_only: bool,
}

impl StatsConfig {
    pub fn new(trail_start_date: NaiveDate, total_trail_miles: f64) -> Self {
        Self {
            trail_start_date,
            total_trail_miles,
            on_trail_only: true,
        }
    }

    pub fn with_on_trail_only(mut self, on_trail_only: bool) -> Self {
        self.on_trail_only = on_trail_only;
        self
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// Aggregates for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub point_count: usize,
    pub distance_miles: f64,
    pub min_trail_mile: Option<f64>,
    pub max_trail_mile: Option<f64>,
    pub elevation_gain_feet: f64,
    pub elevation_loss_feet: f64,
    pub first_ping: DateTime<Utc>,
    pub last_ping: DateTime<Utc>,
}

/// The day's distance shown to readers.
///
/// When today has no pings yet the most recent day with data is shown
/// instead, with its date, rather than a misleading zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDistance {
    pub miles: f64,
    /// Day the figure belongs to; `None` only when there is no data at all
    pub date: Option<NaiveDate>,
    pub is_today: bool,
}

/// A best-day record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub value: f64,
    pub date: NaiveDate,
}

/// Finish-date projection from the average daily pace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishProjection {
    pub average_daily_miles: f64,
    pub miles_remaining: f64,
    pub days_remaining: Option<u32>,
    pub estimated_finish_date: Option<NaiveDate>,
}

/// Latest known position, on- or off-trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPosition {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub on_trail: bool,
    pub trail_mile: Option<f64>,
}

/// Computed progress summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_miles_completed: f64,
    pub miles_remaining: f64,
    pub percent_complete: f64,
    pub daily_distance: DailyDistance,
    pub average_speed_mph: f64,
    pub moving_hours: f64,
    pub current_day_on_trail: u32,
    pub average_daily_miles: f64,
    pub days_remaining: Option<u32>,
    pub estimated_finish_date: Option<NaiveDate>,
    pub longest_day: Option<DayRecord>,
    pub most_elevation_gain: Option<DayRecord>,
    pub today_elevation_gain_feet: f64,
    pub today_elevation_loss_feet: f64,
    pub total_elevation_gain_feet: f64,
    pub total_elevation_loss_feet: f64,
    pub last_position: Option<LastPosition>,
    pub daily: Vec<DailyStats>,
    pub point_count: usize,
}

// ============================================================================
// Building Blocks
// ============================================================================

/// Points the aggregator works on, in chronological order.
pub fn select_points<'a>(points: &'a [TrailPoint], on_trail_only: bool) -> Vec<&'a TrailPoint> {
    let mut selected: Vec<&TrailPoint> = points
        .iter()
        .filter(|p| p.has_valid_coords() && (!on_trail_only || p.on_trail))
        .collect();
    selected.sort_by_key(|p| p.timestamp);
    selected
}

fn owned(points: &[&TrailPoint]) -> Vec<TrailPoint> {
    points.iter().map(|p| (*p).clone()).collect()
}

fn max_trail_mile(points: &[&TrailPoint]) -> Option<f64> {
    points
        .iter()
        .filter_map(|p| p.trail_mile)
        .filter(|m| m.is_finite())
        .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.max(m))))
}

fn min_trail_mile(points: &[&TrailPoint]) -> Option<f64> {
    points
        .iter()
        .filter_map(|p| p.trail_mile)
        .filter(|m| m.is_finite())
        .fold(None, |acc: Option<f64>, m| Some(acc.map_or(m, |a| a.min(m))))
}

/// Total miles: furthest trail mile reached, or summed haversine when no
/// point carries a trail mile. Points must be chronological.
pub fn total_distance_miles(points: &[&TrailPoint]) -> f64 {
    match max_trail_mile(points) {
        Some(mile) => mile.max(0.0),
        None => track_length_miles(&owned(points)),
    }
}

/// Moving time: the sum of intervals ending in a ping whose velocity exceeds
/// [`MOVING_SPEED_THRESHOLD_MPH`]. Points must be chronological.
///
/// An interval starts at the last ping folded into the earlier point, so
/// dwell time in a stationary cluster never counts as moving.
pub fn moving_time(points: &[&TrailPoint]) -> Duration {
    points
        .windows(2)
        .filter(|w| {
            w[1].velocity_mph
                .map_or(false, |v| v > MOVING_SPEED_THRESHOLD_MPH)
        })
        .map(|w| w[1].timestamp - w[0].latest_time())
        .filter(|d| *d > Duration::zero())
        .fold(Duration::zero(), |acc, d| acc + d)
}

/// Elevation gain and loss over consecutive elevation-bearing points, summed
/// independently. Points must be chronological.
///
/// One source is used for the whole slice: snapped trail elevation when at
/// least two points carry it, device elevation otherwise. Chaining the two
/// would turn the offset between the DEM and the device into fake climbs.
pub fn elevation_change(points: &[&TrailPoint]) -> (f64, f64) {
    let finite = |e: Option<f64>| e.filter(|v| v.is_finite());
    let trail: Vec<f64> = points.iter().filter_map(|p| finite(p.trail_elevation)).collect();
    let elevations = if trail.len() >= 2 {
        trail
    } else {
        points.iter().filter_map(|p| finite(p.elevation_feet)).collect()
    };

    elevations
        .windows(2)
        .fold((0.0, 0.0), |(gain, loss), w| {
            let delta = w[1] - w[0];
            if delta > 0.0 {
                (gain + delta, loss)
            } else {
                (gain, loss - delta)
            }
        })
}

/// Group chronological points into UTC-day buckets.
pub fn group_by_day<'a>(points: &[&'a TrailPoint]) -> BTreeMap<NaiveDate, Vec<&'a TrailPoint>> {
    let mut days: BTreeMap<NaiveDate, Vec<&TrailPoint>> = BTreeMap::new();
    for p in points {
        days.entry(p.utc_date()).or_default().push(*p);
    }
    days
}

fn day_stats(date: NaiveDate, points: &[&TrailPoint]) -> DailyStats {
    let min = min_trail_mile(points);
    let max = max_trail_mile(points);
    let trail_mile_points = points
        .iter()
        .filter(|p| p.trail_mile.map_or(false, |m| m.is_finite()))
        .count();

    let distance_miles = match (min, max) {
        (Some(lo), Some(hi)) if trail_mile_points >= 2 => hi - lo,
        _ => track_length_miles(&owned(points)),
    };
    let (gain, loss) = elevation_change(points);

    DailyStats {
        date,
        point_count: points.len(),
        distance_miles,
        min_trail_mile: min,
        max_trail_mile: max,
        elevation_gain_feet: gain,
        elevation_loss_feet: loss,
        first_ping: points[0].timestamp,
        last_ping: points[points.len() - 1].latest_time(),
    }
}

/// Per-day aggregates in ascending date order. Points must be chronological.
pub fn daily_stats(points: &[&TrailPoint]) -> Vec<DailyStats> {
    group_by_day(points)
        .into_iter()
        .map(|(date, day)| day_stats(date, &day))
        .collect()
}

/// Today's distance, or the most recent day's with its date.
pub fn displayed_daily_distance(days: &[DailyStats], today: NaiveDate) -> DailyDistance {
    if let Some(d) = days.iter().find(|d| d.date == today) {
        return DailyDistance {
            miles: d.distance_miles,
            date: Some(today),
            is_today: true,
        };
    }
    match days.iter().filter(|d| d.date <= today).last().or(days.last()) {
        Some(d) => DailyDistance {
            miles: d.distance_miles,
            date: Some(d.date),
            is_today: false,
        },
        None => DailyDistance {
            miles: 0.0,
            date: None,
            is_today: false,
        },
    }
}

fn best_day<F>(days: &[DailyStats], value: F) -> Option<DayRecord>
where
    F: Fn(&DailyStats) -> f64,
{
    days.iter().fold(None, |best: Option<DayRecord>, d| {
        let v = value(d);
        if v > best.as_ref().map_or(0.0, |b| b.value) {
            Some(DayRecord {
                value: v,
                date: d.date,
            })
        } else {
            best
        }
    })
}

/// Day with the most miles. Earliest date wins ties; zero-mile days never
/// set a record.
pub fn longest_day(days: &[DailyStats]) -> Option<DayRecord> {
    best_day(days, |d| d.distance_miles)
}

/// Day with the most elevation gain. Earliest date wins ties.
pub fn most_elevation_gain(days: &[DailyStats]) -> Option<DayRecord> {
    best_day(days, |d| d.elevation_gain_feet)
}

/// Day number on trail, counting the start date as day 1.
///
/// Dates before the start clamp to day 1.
///
/// ```rust
/// use chrono::NaiveDate;
/// use trail_tracker::calculate_current_day;
///
/// let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
/// assert_eq!(calculate_current_day(start, start), 1);
/// assert_eq!(calculate_current_day(start, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()), 2);
/// ```
pub fn calculate_current_day(start: NaiveDate, today: NaiveDate) -> u32 {
    let elapsed = (today - start).num_days();
    (elapsed + 1).max(1) as u32
}

/// Project the finish date from the average miles per completed day.
///
/// The current day is treated as in progress, so the average divides by
/// `current_day - 1` (at least 1). Without any progress there is no
/// projection.
pub fn project_finish(
    total_trail_miles: f64,
    total_miles: f64,
    current_day: u32,
    today: NaiveDate,
) -> FinishProjection {
    let miles_remaining = (total_trail_miles - total_miles).max(0.0);
    let completed_days = current_day.saturating_sub(1).max(1) as f64;
    let average_daily_miles = total_miles / completed_days;

    let days_remaining = if miles_remaining <= 0.0 {
        Some(0)
    } else if average_daily_miles > 0.0 && average_daily_miles.is_finite() {
        Some((miles_remaining / average_daily_miles).ceil() as u32)
    } else {
        None
    };

    FinishProjection {
        average_daily_miles,
        miles_remaining,
        days_remaining,
        estimated_finish_date: days_remaining
            .and_then(|d| today.checked_add_signed(Duration::days(d as i64))),
    }
}

// ============================================================================
// Summary
// ============================================================================

fn zero_summary(config: &StatsConfig, today: NaiveDate, point_count: usize) -> StatsSummary {
    let current_day = calculate_current_day(config.trail_start_date, today);
    StatsSummary {
        total_miles_completed: 0.0,
        miles_remaining: config.total_trail_miles.max(0.0),
        percent_complete: 0.0,
        daily_distance: DailyDistance {
            miles: 0.0,
            date: None,
            is_today: false,
        },
        average_speed_mph: 0.0,
        moving_hours: 0.0,
        current_day_on_trail: current_day,
        average_daily_miles: 0.0,
        days_remaining: None,
        estimated_finish_date: None,
        longest_day: None,
        most_elevation_gain: None,
        today_elevation_gain_feet: 0.0,
        today_elevation_loss_feet: 0.0,
        total_elevation_gain_feet: 0.0,
        total_elevation_loss_feet: 0.0,
        last_position: None,
        daily: Vec::new(),
        point_count,
    }
}

fn last_position(points: &[TrailPoint]) -> Option<LastPosition> {
    points
        .iter()
        .filter(|p| p.has_valid_coords())
        .max_by_key(|p| p.timestamp)
        .map(|p| LastPosition {
            lat: p.lat,
            lon: p.lon,
            timestamp: p.latest_time(),
            on_trail: p.on_trail,
            trail_mile: p.trail_mile,
        })
}

/// Compute the progress summary.
///
/// `points` should already be classified, snapped and deduplicated. Fewer
/// than two usable points yield a zero-valued summary; the day count and
/// last position are still filled in.
pub fn compute_stats(points: &[TrailPoint], config: &StatsConfig, now: DateTime<Utc>) -> StatsSummary {
    let today = now.date_naive();
    let selected = select_points(points, config.on_trail_only);

    if selected.len() < 2 {
        let mut summary = zero_summary(config, today, points.len());
        summary.last_position = last_position(points);
        return summary;
    }

    let total_miles = total_distance_miles(&selected);
    let moving_hours = moving_time(&selected).num_milliseconds() as f64 / 3_600_000.0;
    let average_speed_mph = if moving_hours > 0.0 {
        total_miles / moving_hours
    } else {
        0.0
    };

    let daily = daily_stats(&selected);
    let current_day = calculate_current_day(config.trail_start_date, today);
    let finish = project_finish(config.total_trail_miles, total_miles, current_day, today);
    let today_stats = daily.iter().find(|d| d.date == today);

    let percent_complete = if config.total_trail_miles > 0.0 {
        (total_miles / config.total_trail_miles * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    StatsSummary {
        total_miles_completed: total_miles,
        miles_remaining: finish.miles_remaining,
        percent_complete,
        daily_distance: displayed_daily_distance(&daily, today),
        average_speed_mph,
        moving_hours,
        current_day_on_trail: current_day,
        average_daily_miles: finish.average_daily_miles,
        days_remaining: finish.days_remaining,
        estimated_finish_date: finish.estimated_finish_date,
        longest_day: longest_day(&daily),
        most_elevation_gain: most_elevation_gain(&daily),
        today_elevation_gain_feet: today_stats.map_or(0.0, |d| d.elevation_gain_feet),
        today_elevation_loss_feet: today_stats.map_or(0.0, |d| d.elevation_loss_feet),
        total_elevation_gain_feet: daily.iter().map(|d| d.elevation_gain_feet).sum(),
        total_elevation_loss_feet: daily.iter().map(|d| d.elevation_loss_feet).sum(),
        last_position: last_position(points),
        daily,
        point_count: points.len(),
    }
}

// ============================================================================
// Tests
// ============================================================================
