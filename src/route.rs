//! route.rs — the cumulative-distance model of a track.
//!
//! A `Route` is built once from the fetched geometry and then only
//! queried: `position_at` maps a travelled distance to a point on the
//! polyline.

use tracing::debug;

use crate::{
    error::{Error, Result},
    geo::{haversine, LatLon},
    geojson::FeatureCollection,
};

/// Traversal order applied when a route is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    /// Start at the easternmost vertex and head west.
    #[default]
    EastToWest,
    /// Keep the order the points were recorded in.
    AsRecorded,
}

#[derive(Debug, Clone)]
pub struct Route {
    points: Vec<LatLon>,
    cumulative: Vec<f64>,
}

impl Route {
    pub fn new(points: Vec<LatLon>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::EmptyRoute);
        }

        let mut cumulative = Vec::with_capacity(points.len());
        cumulative.push(0.0);
        for pair in points.windows(2) {
            let last = cumulative[cumulative.len() - 1];
            cumulative.push(last + haversine(pair[0], pair[1]));
        }

        Ok(Self { points, cumulative })
    }

    pub fn from_collection(collection: &FeatureCollection, orientation: Orientation) -> Result<Self> {
        let points = collection.points();
        let points = match orientation {
            Orientation::EastToWest => reorient_east_to_west(points),
            Orientation::AsRecorded => points,
        };
        let route = Self::new(points)?;
        debug!(
            points = route.points.len(),
            length_m = route.total_length(),
            start = ?route.start(),
            "route loaded"
        );
        Ok(route)
    }

    pub fn points(&self) -> &[LatLon] {
        &self.points
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn start(&self) -> LatLon {
        self.points[0]
    }

    /// Length of the whole route in metres.
    pub fn total_length(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// Point `distance` metres along the route, or `None` when the
    /// distance falls outside `0..=total_length`.
    pub fn position_at(&self, distance: f64) -> Option<LatLon> {
        if distance < 0.0 || distance.is_nan() {
            return None;
        }
        if self.points.len() == 1 {
            return (distance == 0.0).then(|| self.points[0]);
        }

        for i in 1..self.cumulative.len() {
            if distance <= self.cumulative[i] {
                let from = self.cumulative[i - 1];
                let span = self.cumulative[i] - from;
                let (a, b) = (self.points[i - 1], self.points[i]);
                if span <= 0.0 {
                    return Some(a);
                }
                return Some(LatLon::lerp(a, b, (distance - from) / span));
            }
        }
        None
    }
}

/// Rotate `points` so the easternmost vertex comes first, then reverse
/// the tail if the second point still lies east of the first.
///
/// This only biases the traversal westward; a route that doubles back
/// on itself is not guaranteed to head west throughout.
pub fn reorient_east_to_west(mut points: Vec<LatLon>) -> Vec<LatLon> {
    let Some(east) = easternmost(&points) else {
        return points;
    };
    points.rotate_left(east);

    if points.len() > 1 && points[1].lon > points[0].lon {
        points[1..].reverse();
    }
    points
}

/// Index of the point with the greatest longitude; the first one wins ties.
fn easternmost(points: &[LatLon]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, p) in points.iter().enumerate() {
        match best {
            Some(b) if p.lon <= points[b].lon => {}
            _ => best = Some(i),
        }
    }
    best
}
