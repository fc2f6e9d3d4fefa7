//! route-tracker — follow a scheduled trip along a pre-computed route.
//!
//! The route is a GeoJSON polyline; a tracker moves along it in step with
//! the wall clock between a start and an end time. `route-server` builds
//! and serves the route, `route-tracker` follows it.

pub mod api;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod geojson;
pub mod kml;
pub mod meta;
pub mod route;
pub mod schedule;
pub mod segments;
pub mod svg;
pub mod tracker;

pub use error::{Error, Result};
pub use geo::{haversine, LatLon};
pub use route::{Orientation, Route};
pub use schedule::Schedule;
pub use tracker::{Fix, Tracker};

/// Install the stderr log subscriber (`RUST_LOG`, default `info`).
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}
