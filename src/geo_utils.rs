//! # Geographic Utilities
//!
//! Core geographic computations used by the classifier, snapper and
//! deduplicator.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_miles`] | Great-circle distance between two coordinates, in miles |
//! | [`project_to_segment`] | Projection of a point onto a segment in an equirectangular frame |
//! | [`track_length_miles`] | Summed haversine length of a ping sequence |
//! | [`miles_to_lat_degrees`] / [`miles_to_lon_degrees`] | Conservative mile-to-degree conversions |
//!
//! ## Example
//!
//! ```rust
//! use trail_tracker::geo_utils::{haversine_miles, project_to_segment};
//!
//! // One degree of latitude is roughly 69 miles
//! let d = haversine_miles(0.0, 0.0, 1.0, 0.0);
//! assert!((d - 69.09).abs() < 0.1);
//!
//! // Point halfway along a one-degree segment on the equator
//! let proj = project_to_segment((0.0, 0.5), (0.0, 0.0), (0.0, 1.0));
//! assert!((proj.t - 0.5).abs() < 1e-9);
//! assert!(proj.distance_miles < 1e-9);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Equirectangular projection
//!
//! Reference segments are short (a few hundred feet), so projecting onto them in
//! a flat frame scaled by `69.0` miles per degree of latitude and
//! `69.0 * cos(lat)` per degree of longitude is accurate enough. No geodesic
//! solver is involved.
//!
//! All coordinates are WGS84 degrees and tuples are `(lat, lon)`.

use crate::TrailPoint;

/// Earth radius used by [`haversine_miles`].
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Approximate miles per degree of latitude.
pub const MILES_PER_DEGREE: f64 = 69.0;

/// Feet in a mile.
pub const FEET_PER_MILE: f64 = 5280.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in miles between two coordinates.
///
/// Non-finite input propagates as NaN; callers that need a classification treat
/// NaN as "not within any threshold".
#[inline]
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_MILES * c
}

/// Haversine distance between two pings.
#[inline]
pub fn ping_distance_miles(a: &TrailPoint, b: &TrailPoint) -> f64 {
    haversine_miles(a.lat, a.lon, b.lat, b.lon)
}

/// Total length of a ping sequence in miles.
///
/// Pairs involving a non-finite coordinate contribute nothing. Empty and
/// single-point sequences return 0.0.
pub fn track_length_miles(points: &[TrailPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| ping_distance_miles(&w[0], &w[1]))
        .filter(|d| d.is_finite())
        .sum()
}

// =============================================================================
// Segment Projection
// =============================================================================

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Distance from the point to its projection, in miles
    pub distance_miles: f64,
    /// Position of the projection along the segment, in `[0, 1]`
    pub t: f64,
}

/// Project `p` onto the segment `a → b`.
///
/// Works in a local equirectangular frame centred on `p`'s latitude. The
/// parameter `t` is clamped to `[0, 1]` so the projection always lies on the
/// segment; a degenerate segment (`a == b`) yields `t = 0`.
///
/// # Example
///
/// ```rust
/// use trail_tracker::geo_utils::project_to_segment;
///
/// // Past the end of the segment: clamped to b
/// let proj = project_to_segment((0.0, 2.0), (0.0, 0.0), (0.0, 1.0));
/// assert_eq!(proj.t, 1.0);
/// assert!((proj.distance_miles - 69.0).abs() < 1e-6);
/// ```
pub fn project_to_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> SegmentProjection {
    let miles_per_lon = MILES_PER_DEGREE * p.0.to_radians().cos();

    // Local frame with a at the origin: x = east, y = north
    let bx = (b.1 - a.1) * miles_per_lon;
    let by = (b.0 - a.0) * MILES_PER_DEGREE;
    let px = (p.1 - a.1) * miles_per_lon;
    let py = (p.0 - a.0) * MILES_PER_DEGREE;

    let len_sq = bx * bx + by * by;
    let t = if len_sq > 0.0 {
        ((px * bx + py * by) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let dx = px - t * bx;
    let dy = py - t * by;

    SegmentProjection {
        distance_miles: (dx * dx + dy * dy).sqrt(),
        t,
    }
}

// =============================================================================
// Conversions
// =============================================================================

/// Convert miles to degrees of latitude.
#[inline]
pub fn miles_to_lat_degrees(miles: f64) -> f64 {
    miles / MILES_PER_DEGREE
}

/// Convert miles to degrees of longitude at a latitude.
///
/// Clamps the cosine so the result stays bounded near the poles; the value
/// is only used to widen search envelopes, where overestimating is harmless.
#[inline]
pub fn miles_to_lon_degrees(miles: f64, latitude: f64) -> f64 {
    let cos_lat = latitude.to_radians().cos().abs().max(0.01);
    miles / (MILES_PER_DEGREE * cos_lat)
}

/// Convert feet to miles.
#[inline]
pub fn feet_to_miles(feet: f64) -> f64 {
    feet / FEET_PER_MILE
}
