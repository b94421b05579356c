//! R-tree over trail segments.
//!
//! Candidate segments are those whose envelope intersects the query point's
//! envelope widened by a search radius. The widening is conservative, so any
//! segment within the radius is always a candidate, and the nearest
//! candidate found within the radius is the global nearest.

use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::{miles_to_lat_degrees, miles_to_lon_degrees};
use crate::trail::{SegmentMatch, TrailReference, TrailVertex};

/// Initial search radius for unbounded nearest queries.
const INITIAL_RADIUS_MILES: f64 = 0.25;

/// Radius beyond which unbounded queries fall back to a full scan.
const MAX_RADIUS_MILES: f64 = 1024.0;

/// Latitude beyond which longitude widening is unreliable.
const MAX_INDEXED_LATITUDE: f64 = 85.0;

/// A trail segment with its index for R-tree queries
#[derive(Debug, Clone, Copy)]
pub struct IndexedSegment {
    pub idx: usize,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }
}

/// Spatial index of the reference polyline's segments.
#[derive(Debug, Clone)]
pub struct SegmentIndex {
    tree: RTree<IndexedSegment>,
}

impl SegmentIndex {
    /// Build the index from ordered polyline vertices.
    pub fn build(vertices: &[TrailVertex]) -> Self {
        let segments: Vec<IndexedSegment> = vertices
            .windows(2)
            .enumerate()
            .map(|(idx, w)| IndexedSegment {
                idx,
                min_lat: w[0].lat.min(w[1].lat),
                max_lat: w[0].lat.max(w[1].lat),
                min_lon: w[0].lon.min(w[1].lon),
                max_lon: w[0].lon.max(w[1].lon),
            })
            .collect();
        Self {
            tree: RTree::bulk_load(segments),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Indices of segments that may lie within `radius_miles`, ascending.
    ///
    /// Returns `None` when the query is too close to a pole for the widened
    /// envelope to be trusted.
    pub fn candidates(&self, lat: f64, lon: f64, radius_miles: f64) -> Option<Vec<usize>> {
        if lat.abs() > MAX_INDEXED_LATITUDE {
            return None;
        }
        let dlat = miles_to_lat_degrees(radius_miles);
        let dlon = miles_to_lon_degrees(radius_miles, lat);
        let query = AABB::from_corners([lon - dlon, lat - dlat], [lon + dlon, lat + dlat]);

        let mut found: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|s| s.idx)
            .collect();
        found.sort_unstable();
        Some(found)
    }

    /// Nearest segment within `radius_miles`, if any.
    ///
    /// Falls back to a full scan of `trail` when the index cannot answer.
    pub fn nearest_within(
        &self,
        trail: &TrailReference,
        lat: f64,
        lon: f64,
        radius_miles: f64,
    ) -> Option<SegmentMatch> {
        match self.candidates(lat, lon, radius_miles) {
            Some(candidates) => trail
                .nearest_among(lat, lon, candidates)
                .filter(|m| m.distance_miles <= radius_miles),
            None => trail
                .nearest_segment_brute_force(lat, lon)
                .filter(|m| m.distance_miles <= radius_miles),
        }
    }

    /// Global nearest segment, found by widening the search radius.
    ///
    /// Returns `None` if nothing lies within [`MAX_RADIUS_MILES`]; the caller
    /// then scans the whole polyline.
    pub fn nearest(&self, trail: &TrailReference, lat: f64, lon: f64) -> Option<SegmentMatch> {
        let mut radius = INITIAL_RADIUS_MILES;
        while radius <= MAX_RADIUS_MILES {
            if let Some(found) = self.nearest_within(trail, lat, lon, radius) {
                return Some(found);
            }
            radius *= 4.0;
        }
        None
    }
}
