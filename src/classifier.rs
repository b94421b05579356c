//! On/off-trail classification.
//!
//! A ping is on-trail when its distance to the nearest reference segment is
//! at most the off-trail threshold. Everything downstream that works in trail
//! miles only looks at on-trail pings. Town stops and side trips stay in the
//! point array for the map but do not move the hiker along the trail.
//!
//! Rules:
//! - non-finite or out-of-range coordinates are always off-trail;
//! - without reference data every valid ping is assumed on-trail;
//! - an off-trail ping never carries a trail mile or trail elevation.

use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{TrailPoint, TrailReference};

/// Default off-trail threshold in miles.
pub const DEFAULT_OFF_TRAIL_THRESHOLD_MILES: f64 = 0.25;

/// Whether a single ping is on-trail.
pub fn is_on_trail(point: &TrailPoint, trail: Option<&TrailReference>, threshold_miles: f64) -> bool {
    if !point.has_valid_coords() {
        return false;
    }
    match trail {
        Some(trail) => trail
            .nearest_segment_within(point.lat, point.lon, threshold_miles)
            .is_some(),
        None => true,
    }
}

fn classify_one(point: &TrailPoint, trail: Option<&TrailReference>, threshold_miles: f64) -> TrailPoint {
    let mut out = point.clone();
    out.on_trail = is_on_trail(point, trail, threshold_miles);
    if !out.on_trail {
        out.clear_snap();
    }
    out
}

fn classify_and_snap_one(
    point: &TrailPoint,
    trail: Option<&TrailReference>,
    threshold_miles: f64,
) -> TrailPoint {
    let mut out = point.clone();
    out.clear_snap();
    out.on_trail = false;

    if !point.has_valid_coords() {
        return out;
    }

    match trail {
        Some(trail) => {
            if let Some(m) = trail.nearest_segment_within(point.lat, point.lon, threshold_miles) {
                let pos = trail.locate(&m);
                out.on_trail = true;
                out.trail_mile = Some(pos.trail_mile);
                out.trail_elevation = pos.trail_elevation;
            }
        }
        None => out.on_trail = true,
    }
    out
}

fn map_points<F>(points: &[TrailPoint], f: F) -> Vec<TrailPoint>
where
    F: Fn(&TrailPoint) -> TrailPoint + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        points.par_iter().map(f).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        points.iter().map(f).collect()
    }
}

/// Tag every ping on- or off-trail.
///
/// Returns a new collection; the input is left untouched. Off-trail pings
/// have their snapping annotations cleared.
pub fn classify_points(
    points: &[TrailPoint],
    trail: Option<&TrailReference>,
    threshold_miles: f64,
) -> Vec<TrailPoint> {
    let out = map_points(points, |p| classify_one(p, trail, threshold_miles));
    log_counts(&out, trail.is_some());
    out
}

/// Classify and snap in one pass.
///
/// Equivalent to [`classify_points`] followed by
/// [`snap_points`](crate::snap_points), but projects each ping once.
pub fn classify_and_snap(
    points: &[TrailPoint],
    trail: Option<&TrailReference>,
    threshold_miles: f64,
) -> Vec<TrailPoint> {
    let out = map_points(points, |p| classify_and_snap_one(p, trail, threshold_miles));
    log_counts(&out, trail.is_some());
    out
}

fn log_counts(points: &[TrailPoint], has_trail: bool) {
    let counts = ClassificationCounts::from_points(points);
    debug!(
        "[Classifier] {} points: {} on-trail, {} off-trail, {} invalid{}",
        counts.total,
        counts.on_trail,
        counts.off_trail,
        counts.invalid,
        if has_trail { "" } else { " (no trail data, assuming on-trail)" }
    );
}

/// Tally of a classified point array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationCounts {
    pub total: usize,
    pub on_trail: usize,
    pub off_trail: usize,
    /// Off-trail because the coordinates were unusable
    pub invalid: usize,
}

impl ClassificationCounts {
    pub fn from_points(points: &[TrailPoint]) -> Self {
        points.iter().fold(Self::default(), |mut acc, p| {
            acc.total += 1;
            if p.on_trail {
                acc.on_trail += 1;
            } else {
                acc.off_trail += 1;
                if !p.has_valid_coords() {
                    acc.invalid += 1;
                }
            }
            acc
        })
    }
}
