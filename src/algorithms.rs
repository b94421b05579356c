//! # Algorithm Toolbox
//!
//! Direct access to the pure pipeline stages, for callers that want to run
//! one step (say, snapping a single ping or projecting a finish date)
//! without the [`ProgressEngine`](crate::ProgressEngine).
//!
//! ## Pipeline Stages
//!
//! - **Classification**: on/off-trail tagging against the reference polyline
//! - **Snapping**: trail mile and trail elevation at the nearest segment
//! - **Stationary folding**: collapse camp jitter into single points
//! - **Aggregation**: daily and cumulative statistics, records, ETA
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: great-circle distance in miles
//! - **Segment Projection**: equirectangular point-to-segment distance
//! - **Douglas-Peucker**: vertex reduction for map rendering
//!
//! # Example
//!
//! ```rust
//! use trail_tracker::algorithms::{haversine_miles, project_finish};
//! use chrono::NaiveDate;
//!
//! // Springer Mountain to Neels Gap, as the crow flies
//! let miles = haversine_miles(34.6268, -84.1938, 34.7358, -83.9180);
//! assert!(miles > 15.0 && miles < 20.0);
//!
//! let today = NaiveDate::from_ymd_opt(2026, 4, 21).unwrap();
//! let eta = project_finish(100.0, 20.0, 5, today);
//! assert_eq!(eta.days_remaining, Some(16));
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{
    SegmentMatch, StatsConfig, StatsSummary, TrailPoint, TrailPosition, TrailReference,
    TrailVertex,
};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    feet_to_miles, haversine_miles, miles_to_lat_degrees, miles_to_lon_degrees,
    project_to_segment, track_length_miles, SegmentProjection,
};

// =============================================================================
// Pipeline Stages
// =============================================================================

pub use crate::classifier::{classify_and_snap, classify_points, is_on_trail};
pub use crate::dedupe::dedupe_stationary;
pub use crate::snapping::{snap_point, snap_points};

pub use crate::stats::{
    calculate_current_day, compute_stats, daily_stats, displayed_daily_distance,
    elevation_change, longest_day, most_elevation_gain, moving_time, project_finish,
    select_points, total_distance_miles,
};

// =============================================================================
// Line Simplification
// =============================================================================

/// Douglas-Peucker simplification of a reference polyline.
///
/// Kept vertices are returned unchanged, so cumulative miles and elevations
/// stay exact. `tolerance` is in degrees. The first and last vertex are
/// always kept.
///
/// # Example
/// ```rust
/// use trail_tracker::algorithms::{simplify_vertices, TrailVertex};
///
/// let straight: Vec<TrailVertex> = (0..=10)
///     .map(|i| TrailVertex::new(i as f64 * 0.01, 35.0, i as f64 * 0.57, None))
///     .collect();
/// let simplified = simplify_vertices(&straight, 0.0001);
/// assert_eq!(simplified.len(), 2);
/// assert_eq!(simplified[1].cumulative_mile, straight[10].cumulative_mile);
/// ```
pub fn simplify_vertices(vertices: &[TrailVertex], tolerance: f64) -> Vec<TrailVertex> {
    let kept = simplify_indices(vertices.iter().map(|v| (v.lon, v.lat)), tolerance);
    kept.into_iter().map(|i| vertices[i].clone()).collect()
}

/// Douglas-Peucker simplification of an annotated ping track for display.
///
/// Pings with unusable coordinates are dropped; kept pings retain all their
/// annotations. `tolerance` is in degrees.
pub fn simplify_track(points: &[TrailPoint], tolerance: f64) -> Vec<TrailPoint> {
    let valid: Vec<&TrailPoint> = points.iter().filter(|p| p.has_valid_coords()).collect();
    let kept = simplify_indices(valid.iter().map(|p| (p.lon, p.lat)), tolerance);
    kept.into_iter().map(|i| valid[i].clone()).collect()
}

fn simplify_indices(coords: impl Iterator<Item = (f64, f64)>, tolerance: f64) -> Vec<usize> {
    use geo::{algorithm::simplify::SimplifyIdx, Coord, LineString};

    let line: LineString<f64> = coords.map(|(x, y)| Coord { x, y }).collect();
    if line.0.len() < 3 {
        return (0..line.0.len()).collect();
    }
    line.simplify_idx(&tolerance)
}

// =============================================================================
// Spatial Indexing
// =============================================================================

/// R-tree over reference segments.
pub use crate::spatial_index::SegmentIndex;

/// Re-export of rstar's RTree for custom spatial indexing needs.
pub use rstar::RTree;
