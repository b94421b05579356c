//! Stationary ping folding.
//!
//! A messenger left on at camp keeps reporting slightly different positions.
//! Summing the jitter would inflate mileage, so consecutive pings within a
//! small radius of the last kept ping are folded into it. The kept ping
//! records how many pings it stands for and when the last one arrived, so
//! dwell time is preserved.
//!
//! A fold never crosses UTC midnight. The first ping of a new day at camp is
//! kept, so that day's trail-mile spread starts where the hiker woke up.

use log::debug;

use crate::geo_utils::{feet_to_miles, ping_distance_miles};
use crate::TrailPoint;

/// Pings closer than this to the last kept ping are folded into it.
pub const DEFAULT_STATIONARY_THRESHOLD_FEET: f64 = 100.0;

/// [`DEFAULT_STATIONARY_THRESHOLD_FEET`] in miles (about 0.0189).
pub fn default_stationary_threshold_miles() -> f64 {
    feet_to_miles(DEFAULT_STATIONARY_THRESHOLD_FEET)
}

/// Fold stationary clusters, returning a new chronologically sorted
/// collection.
///
/// A ping is kept when its haversine distance from the last *kept* ping
/// exceeds `threshold_miles`; otherwise the kept ping absorbs it (its
/// `stationary_pings` grows and `last_ping_time` moves forward). Pings with
/// unusable coordinates are passed through unchanged and never serve as the
/// comparison anchor. A ping on a later UTC date than its anchor is always
/// kept and becomes the new anchor.
///
/// Already-folded input folds the same way again, so running this twice is
/// harmless.
pub fn dedupe_stationary(points: &[TrailPoint], threshold_miles: f64) -> Vec<TrailPoint> {
    let mut sorted: Vec<&TrailPoint> = points.iter().collect();
    sorted.sort_by_key(|p| p.timestamp);

    let mut kept: Vec<TrailPoint> = Vec::with_capacity(sorted.len());
    let mut anchor: Option<usize> = None;

    for point in sorted {
        if let Some(i) = anchor
            .filter(|_| point.has_valid_coords())
            .filter(|&i| kept[i].utc_date() == point.utc_date())
        {
            let distance = ping_distance_miles(&kept[i], point);
            if distance <= threshold_miles {
                let target = &mut kept[i];
                target.stationary_pings += point.stationary_pings.max(1);
                target.last_ping_time = Some(target.latest_time().max(point.latest_time()));
                continue;
            }
        }

        let mut next = point.clone();
        next.last_ping_time = Some(next.latest_time());
        next.stationary_pings = next.stationary_pings.max(1);
        if next.has_valid_coords() {
            anchor = Some(kept.len());
        }
        kept.push(next);
    }

    debug!(
        "[Dedupe] {} pings folded into {} points",
        points.len(),
        kept.len()
    );
    kept
}
