//! The moving marker: a route plus the schedule it is travelled on.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Result,
    geo::LatLon,
    geojson::FeatureCollection,
    meta::RouteMeta,
    route::{Orientation, Route},
    schedule::Schedule,
};

#[derive(Debug, Clone)]
pub struct Tracker {
    route: Route,
    schedule: Schedule,
}

/// Where the tracker is at a given instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub at: DateTime<Utc>,
    pub progress: f64,
    pub distance_m: f64,
    pub position: Option<LatLon>,
}

impl Tracker {
    pub fn new(route: Route, schedule: Schedule) -> Self {
        Self { route, schedule }
    }

    /// Build from the two API documents, optionally moving the start to
    /// `begin`.
    pub fn from_documents(
        meta: &RouteMeta,
        collection: &FeatureCollection,
        orientation: Orientation,
        begin: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let route = Route::from_collection(collection, orientation)?;
        let schedule = match begin {
            Some(begin) => meta.schedule().with_begin(begin),
            None => meta.schedule(),
        };
        Ok(Self::new(route, schedule))
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn fix(&self, now: DateTime<Utc>) -> Fix {
        self.fix_on(&self.schedule, now)
    }

    /// Like [`Tracker::fix`], with the trip start moved to `begin`.
    pub fn fix_with_begin(&self, begin: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Fix {
        match begin {
            Some(begin) => self.fix_on(&self.schedule.with_begin(begin), now),
            None => self.fix(now),
        }
    }

    fn fix_on(&self, schedule: &Schedule, now: DateTime<Utc>) -> Fix {
        let progress = schedule.progress(now);
        let distance_m = progress * self.route.total_length();
        Fix {
            at: now,
            progress,
            distance_m,
            position: self.route.position_at(distance_m),
        }
    }
}
