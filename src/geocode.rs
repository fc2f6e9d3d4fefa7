//! Place search through Nominatim.

use std::{io::Read, time::Duration};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    geo::{haversine, LatLon},
};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

// Nominatim's usage policy requires an identifying User-Agent.
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: Ordinate,
    lon: Ordinate,
    display_name: String,
}

/// Nominatim sends coordinates as strings; accept plain numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Ordinate {
    Text(String),
    Number(f64),
}

impl Ordinate {
    fn value(&self, field: &'static str) -> Result<f64> {
        match self {
            Ordinate::Number(v) => Ok(*v),
            Ordinate::Text(s) => s.trim().parse().map_err(|_| Error::Coordinate {
                field,
                value: s.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub name: String,
    pub position: LatLon,
}

pub struct Geocoder {
    url: String,
    agent: ureq::Agent,
}

impl Default for Geocoder {
    fn default() -> Self {
        Self::new(NOMINATIM_URL)
    }
}

impl Geocoder {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
        }
    }

    /// First match for `query`, if any. A blank query sends no request.
    pub fn search(&self, query: &str) -> Result<Option<Place>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        debug!(query, "geocoding");
        let resp = self
            .agent
            .get(&self.url)
            .query("format", "json")
            .query("q", query)
            .set("User-Agent", USER_AGENT)
            .call()?;
        let place = first_place(resp.into_reader())?;
        if place.is_none() {
            warn!(query, "no search results found");
        }
        Ok(place)
    }
}

/// Parse a Nominatim result array and keep the first entry.
pub fn first_place(reader: impl Read) -> Result<Option<Place>> {
    let results: Vec<SearchResult> = serde_json::from_reader(reader)?;
    let Some(first) = results.into_iter().next() else {
        return Ok(None);
    };
    let position = LatLon::new(first.lat.value("lat")?, first.lon.value("lon")?);
    Ok(Some(Place { name: first.display_name, position }))
}

/// A found place and how far it is from the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub place: Place,
    pub distance_km: f64,
}

impl SearchHit {
    pub fn new(place: Place, tracker: LatLon) -> Self {
        let distance_km = haversine(place.position, tracker) / 1000.0;
        Self { place, distance_km }
    }

    pub fn popup(&self) -> String {
        format!("{}\n{:.1} km from tracker", self.place.name, self.distance_km)
    }
}
