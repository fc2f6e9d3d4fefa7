//! Client for the route API (`/api/meta`, `/api/route`).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    error::Result,
    geojson::FeatureCollection,
    meta::RouteMeta,
    route::Orientation,
    tracker::Tracker,
};

const TIMEOUT: Duration = Duration::from_secs(15);

pub struct ApiClient {
    base: String,
    agent: ureq::Agent,
}

/// Both API documents as fetched together.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: RouteMeta,
    pub route: FeatureCollection,
}

impl Snapshot {
    pub fn tracker(&self, orientation: Orientation, begin: Option<DateTime<Utc>>) -> Result<Tracker> {
        Tracker::from_documents(&self.meta, &self.route, orientation, begin)
    }
}

impl ApiClient {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn fetch_meta(&self) -> Result<RouteMeta> {
        self.get_json("/api/meta")
    }

    pub fn fetch_route(&self) -> Result<FeatureCollection> {
        self.get_json("/api/route")
    }

    pub fn load(&self) -> Result<Snapshot> {
        let meta = self.fetch_meta()?;
        let route = self.fetch_route()?;
        debug!(features = route.features.len(), start = %meta.start_time, end = %meta.end_time, "fetched route");
        Ok(Snapshot { meta, route })
    }

    /// Fetch `/api/meta` and, only when it differs from `current`, the route
    /// that goes with it.
    pub fn fetch_if_changed(&self, current: &RouteMeta) -> Result<Option<Snapshot>> {
        let meta = self.fetch_meta()?;
        if meta == *current {
            return Ok(None);
        }
        let route = self.fetch_route()?;
        debug!(features = route.features.len(), start = %meta.start_time, end = %meta.end_time, "route changed");
        Ok(Some(Snapshot { meta, route }))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base);
        debug!(%url, "GET");
        let resp = self.agent.get(&url).call()?;
        Ok(serde_json::from_reader(resp.into_reader())?)
    }
}
