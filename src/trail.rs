//! Reference trail polyline with cumulative mile markers.
//!
//! The polyline is loaded once and never changes. Nearest-segment search is a
//! brute-force scan for ordinary polylines. Polylines with at least
//! [`INDEX_MIN_SEGMENTS`] segments also get a [`SegmentIndex`], which gives the
//! same answers with far fewer projections.

use geo::{BoundingRect, Coord, LineString, Rect};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TrailError};
use crate::geo_utils::{miles_to_lat_degrees, miles_to_lon_degrees, project_to_segment};
use crate::spatial_index::SegmentIndex;

/// Segment count from which a spatial index is built automatically.
pub const INDEX_MIN_SEGMENTS: usize = 2048;

/// A vertex of the reference polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailVertex {
    pub lon: f64,
    pub lat: f64,
    pub cumulative_mile: f64,
    #[serde(default)]
    pub elevation_feet: Option<f64>,
}

impl TrailVertex {
    pub fn new(lon: f64, lat: f64, cumulative_mile: f64, elevation_feet: Option<f64>) -> Self {
        Self {
            lon,
            lat,
            cumulative_mile,
            elevation_feet,
        }
    }
}

/// Vertex as stored in trail data files: either an object or a compact
/// `[lon, lat, mile, elevation?]` array.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVertex {
    Compact(Vec<Option<f64>>),
    Full(TrailVertex),
}

impl RawVertex {
    fn into_vertex(self, idx: usize) -> Result<TrailVertex> {
        match self {
            RawVertex::Full(v) => Ok(v),
            RawVertex::Compact(values) => {
                let field = |i: usize, name: &str| -> Result<f64> {
                    values.get(i).copied().flatten().ok_or_else(|| {
                        TrailError::invalid_trail(format!("vertex {} is missing {}", idx, name))
                    })
                };
                Ok(TrailVertex {
                    lon: field(0, "longitude")?,
                    lat: field(1, "latitude")?,
                    cumulative_mile: field(2, "cumulative mile")?,
                    elevation_feet: values.get(3).copied().flatten(),
                })
            }
        }
    }
}

/// Nearest segment to a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentMatch {
    /// Index of the segment's first vertex
    pub segment_index: usize,
    /// Distance from the query point to the segment, in miles
    pub distance_miles: f64,
    /// Position of the projection along the segment, in `[0, 1]`
    pub t: f64,
}

/// Interpolated position along the trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailPosition {
    pub trail_mile: f64,
    pub trail_elevation: Option<f64>,
}

/// Static reference polyline.
#[derive(Debug, Clone)]
pub struct TrailReference {
    vertices: Vec<TrailVertex>,
    line: LineString<f64>,
    bounds: Rect<f64>,
    index: Option<SegmentIndex>,
}

impl TrailReference {
    /// Build a reference polyline from ordered vertices.
    ///
    /// Requires at least two vertices, finite coordinates, and cumulative
    /// miles that never decrease.
    pub fn from_vertices(vertices: Vec<TrailVertex>) -> Result<Self> {
        if vertices.len() < 2 {
            return Err(TrailError::invalid_trail(format!(
                "{} vertices, minimum 2 required",
                vertices.len()
            )));
        }

        for (i, v) in vertices.iter().enumerate() {
            if !(v.lat.is_finite() && v.lon.is_finite() && v.cumulative_mile.is_finite()) {
                return Err(TrailError::invalid_trail(format!(
                    "vertex {} has non-finite values",
                    i
                )));
            }
        }

        if let Some(i) = vertices
            .windows(2)
            .position(|w| w[1].cumulative_mile < w[0].cumulative_mile)
        {
            return Err(TrailError::invalid_trail(format!(
                "cumulative mile decreases at vertex {}",
                i + 1
            )));
        }

        let line: LineString<f64> = vertices
            .iter()
            .map(|v| Coord { x: v.lon, y: v.lat })
            .collect::<Vec<_>>()
            .into();
        let bounds = line
            .bounding_rect()
            .ok_or_invalid_trail("polyline has no extent")?;

        let index = if vertices.len() - 1 >= INDEX_MIN_SEGMENTS {
            debug!(
                "[TrailReference] Building segment index for {} segments",
                vertices.len() - 1
            );
            Some(SegmentIndex::build(&vertices))
        } else {
            None
        };

        Ok(Self {
            vertices,
            line,
            bounds,
            index,
        })
    }

    /// Parse trail data from JSON: an array of vertex objects or of
    /// `[lon, lat, mile, elevation?]` arrays.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawVertex> = serde_json::from_str(json)?;
        let vertices = raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.into_vertex(i))
            .collect::<Result<Vec<_>>>()?;
        Self::from_vertices(vertices)
    }

    /// Build the segment index regardless of polyline size.
    pub fn with_index(mut self) -> Self {
        if self.index.is_none() {
            self.index = Some(SegmentIndex::build(&self.vertices));
        }
        self
    }

    /// Drop the segment index, forcing brute-force search.
    pub fn without_index(mut self) -> Self {
        self.index = None;
        self
    }

    pub fn vertices(&self) -> &[TrailVertex] {
        &self.vertices
    }

    pub fn segment_count(&self) -> usize {
        self.vertices.len() - 1
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Polyline as a geo `LineString` (x = lon, y = lat).
    pub fn line_string(&self) -> &LineString<f64> {
        &self.line
    }

    /// Bounding rectangle of the polyline (x = lon, y = lat).
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    /// Cumulative mile at the last vertex.
    pub fn total_miles(&self) -> f64 {
        self.vertices[self.vertices.len() - 1].cumulative_mile
    }

    /// Whether the point could be within `radius_miles` of the polyline,
    /// judged from the bounding rectangle alone.
    pub fn may_be_within(&self, lat: f64, lon: f64, radius_miles: f64) -> bool {
        let dlat = miles_to_lat_degrees(radius_miles);
        let dlon = miles_to_lon_degrees(radius_miles, lat);
        let min = self.bounds.min();
        let max = self.bounds.max();
        lat >= min.y - dlat && lat <= max.y + dlat && lon >= min.x - dlon && lon <= max.x + dlon
    }

    /// Project onto one segment.
    pub fn project(&self, segment_index: usize, lat: f64, lon: f64) -> SegmentMatch {
        let a = &self.vertices[segment_index];
        let b = &self.vertices[segment_index + 1];
        let proj = project_to_segment((lat, lon), (a.lat, a.lon), (b.lat, b.lon));
        SegmentMatch {
            segment_index,
            distance_miles: proj.distance_miles,
            t: proj.t,
        }
    }

    /// Scan every segment and keep the globally nearest one.
    ///
    /// Ties go to the lower segment index. Returns `None` for non-finite
    /// input.
    pub fn nearest_segment_brute_force(&self, lat: f64, lon: f64) -> Option<SegmentMatch> {
        if !(lat.is_finite() && lon.is_finite()) {
            return None;
        }
        self.nearest_among(lat, lon, 0..self.segment_count())
    }

    /// Nearest segment to a point, using the spatial index when present.
    ///
    /// Always returns the same segment as
    /// [`nearest_segment_brute_force`](Self::nearest_segment_brute_force).
    pub fn nearest_segment(&self, lat: f64, lon: f64) -> Option<SegmentMatch> {
        if !(lat.is_finite() && lon.is_finite()) {
            return None;
        }
        match &self.index {
            Some(index) => index
                .nearest(self, lat, lon)
                .or_else(|| self.nearest_segment_brute_force(lat, lon)),
            None => self.nearest_segment_brute_force(lat, lon),
        }
    }

    /// Nearest segment, but only if it lies within `max_miles`.
    pub fn nearest_segment_within(
        &self,
        lat: f64,
        lon: f64,
        max_miles: f64,
    ) -> Option<SegmentMatch> {
        if !(lat.is_finite() && lon.is_finite()) || !self.may_be_within(lat, lon, max_miles) {
            return None;
        }
        let best = match &self.index {
            Some(index) => index.nearest_within(self, lat, lon, max_miles),
            None => self.nearest_segment_brute_force(lat, lon),
        }?;
        (best.distance_miles <= max_miles).then_some(best)
    }

    /// Keep the nearest of the given segments; candidates must be ascending.
    pub(crate) fn nearest_among(
        &self,
        lat: f64,
        lon: f64,
        candidates: impl IntoIterator<Item = usize>,
    ) -> Option<SegmentMatch> {
        let mut best: Option<SegmentMatch> = None;
        for i in candidates {
            let m = self.project(i, lat, lon);
            if best.map_or(true, |b| m.distance_miles < b.distance_miles) {
                best = Some(m);
            }
        }
        best
    }

    /// Interpolate mile and elevation at a segment match.
    ///
    /// Elevation is only interpolated when both segment endpoints carry one.
    pub fn locate(&self, m: &SegmentMatch) -> TrailPosition {
        let a = &self.vertices[m.segment_index];
        let b = &self.vertices[m.segment_index + 1];
        let trail_mile = a.cumulative_mile + m.t * (b.cumulative_mile - a.cumulative_mile);
        let trail_elevation = match (a.elevation_feet, b.elevation_feet) {
            (Some(ea), Some(eb)) => Some(ea + m.t * (eb - ea)),
            _ => None,
        };
        TrailPosition {
            trail_mile,
            trail_elevation,
        }
    }

    /// Nearest segment and the interpolated position on it.
    pub fn snap(&self, lat: f64, lon: f64) -> Option<(SegmentMatch, TrailPosition)> {
        self.nearest_segment(lat, lon).map(|m| (m, self.locate(&m)))
    }
}
