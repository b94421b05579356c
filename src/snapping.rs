//! Trail-mile and trail-elevation snapping.
//!
//! Only pings already classified on-trail are snapped. Their position is
//! interpolated along the globally nearest reference segment. Off-trail pings
//! leave with no trail mile and no trail elevation.

use crate::{TrailPoint, TrailReference};

/// Snap one ping.
pub fn snap_point(point: &TrailPoint, trail: Option<&TrailReference>) -> TrailPoint {
    let mut out = point.clone();
    out.clear_snap();

    if !point.on_trail {
        return out;
    }

    if let Some((_, pos)) = trail.and_then(|t| t.snap(point.lat, point.lon)) {
        out.trail_mile = Some(pos.trail_mile);
        out.trail_elevation = pos.trail_elevation;
    }
    out
}

/// Snap every on-trail ping, returning a new collection.
///
/// Trail miles are not forced to increase over time: a hiker who backtracks
/// or flips sections keeps the mile where they actually are.
pub fn snap_points(points: &[TrailPoint], trail: Option<&TrailReference>) -> Vec<TrailPoint> {
    points.iter().map(|p| snap_point(p, trail)).collect()
}
