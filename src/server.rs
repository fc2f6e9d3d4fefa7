//! route-server — build the route from KML tracks and serve it.
//!
//! The track files in the data directory are laid out over the scheduled
//! window once at startup, and again whenever `POST /api/config` moves
//! the window.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use route_tracker::{
    geo::LatLon,
    geocode::{Geocoder, SearchHit},
    geojson::FeatureCollection,
    kml,
    meta::RouteMeta,
    schedule::parse_timestamp,
    segments::build_route,
    svg::{render_svg, Scene},
    Fix, Orientation, Tracker,
};

#[derive(Debug, Parser)]
#[command(version, about = "Serve a scheduled route built from KML tracks")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "ROUTE_ADDR", default_value = "0.0.0.0:8000")]
    addr: SocketAddr,

    /// Directory holding the `*.kml` track files.
    #[arg(long, env = "ROUTE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Start of the trip.
    #[arg(long, env = "ROUTE_START", default_value = "2024-08-10T00:00:00+00:00", value_parser = parse_time)]
    start: DateTime<Utc>,

    /// End of the trip.
    #[arg(long, env = "ROUTE_END", default_value = "2024-08-20T00:00:00+00:00", value_parser = parse_time)]
    end: DateTime<Utc>,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw).map_err(|e| e.to_string())
}

/// Longest trip the route is laid out over; every day is one GeoJSON leg.
const MAX_WINDOW_DAYS: i64 = 366;

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), String> {
    if end < start {
        return Err("end_time precedes start_time".to_string());
    }
    if end - start > Duration::days(MAX_WINDOW_DAYS) {
        return Err(format!("the trip may last at most {MAX_WINDOW_DAYS} days"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    coords: Arc<Vec<LatLon>>,
    published: Arc<RwLock<Published>>,
    geocoder: Arc<Geocoder>,
}

/// The documents currently being served.
struct Published {
    route: FeatureCollection,
    meta: RouteMeta,
    tracker: Option<Tracker>,
    revision: u64,
}

fn publish(coords: &[LatLon], start: DateTime<Utc>, end: DateTime<Utc>) -> route_tracker::Result<Published> {
    if coords.is_empty() {
        return Ok(Published {
            route: FeatureCollection::default(),
            meta: RouteMeta::empty(start, end),
            tracker: None,
            revision: 0,
        });
    }

    let (route, meta) = build_route(coords, start, end)?;
    let tracker = Tracker::from_documents(&meta, &route, Orientation::EastToWest, None)?;
    info!(
        legs = route.features.len(),
        total_km = meta.total_distance_km,
        daily_km = meta.daily_distance_km,
        speed_mps = meta.speed_mps,
        "route laid out from {start} to {end}"
    );
    Ok(Published { route, meta, tracker: Some(tracker), revision: 0 })
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/api/meta", get(api_meta))
        .route("/api/route", get(api_route))
        .route("/api/position", get(api_position))
        .route("/api/search", get(api_search))
        .route("/api/config", get(api_config).post(update_config))
        .route("/map.svg", get(map_svg))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    route_tracker::init_logging();
    let args = Args::parse();

    let coords = match kml::load_dir(&args.data_dir) {
        Ok(coords) => coords,
        Err(e) => {
            warn!("{e}; serving an empty route");
            Vec::new()
        }
    };
    check_window(args.start, args.end).map_err(anyhow::Error::msg)?;
    let published = publish(&coords, args.start, args.end).context("failed to lay out the route")?;

    let state = AppState {
        coords: Arc::new(coords),
        published: Arc::new(RwLock::new(published)),
        geocoder: Arc::new(Geocoder::default()),
    };

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("cannot listen on {}", args.addr))?;
    info!("route server listening on http://{}", args.addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

type ApiError = (StatusCode, String);

#[derive(Debug, Default, Deserialize)]
struct BeginQuery {
    begin: Option<String>,
}

impl BeginQuery {
    fn begin(&self) -> Result<Option<DateTime<Utc>>, ApiError> {
        self.begin
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(parse_timestamp)
            .transpose()
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
    }
}

const INDEX: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <meta http-equiv="refresh" content="5">
  <title>Route tracker</title>
</head>
<body style="margin:0;font-family:sans-serif">
  <form action="/api/search" style="padding:8px">
    <input name="q" placeholder="Search a place"> <button>Search</button>
  </form>
  <img src="/map.svg" alt="route map" style="max-width:100%">
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(INDEX)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn api_meta(State(state): State<AppState>) -> Json<RouteMeta> {
    Json(state.published.read().await.meta.clone())
}

async fn api_route(State(state): State<AppState>) -> Json<FeatureCollection> {
    Json(state.published.read().await.route.clone())
}

async fn api_position(
    State(state): State<AppState>,
    Query(query): Query<BeginQuery>,
) -> Result<Json<route_tracker::Fix>, ApiError> {
    let begin = query.begin()?;
    let published = state.published.read().await;
    let tracker = published
        .tracker
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "no route loaded".to_string()))?;
    Ok(Json(tracker.fix_with_begin(begin, Utc::now())))
}

/// Where to draw or measure from: the fix, or the route start when the fix
/// has no position.
fn marker_position(tracker: &Tracker, fix: &Fix) -> LatLon {
    fix.position.unwrap_or_else(|| {
        let start = tracker.route().start();
        warn!(
            "no position for distance {:.1} m, using the route start ({:.5}, {:.5})",
            fix.distance_m, start.lat, start.lon
        );
        start
    })
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    begin: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchReply {
    display_name: String,
    lat: f64,
    lon: f64,
    distance_km: f64,
    popup: String,
}

/// First Nominatim match and its distance from the tracker; `null` when
/// nothing matched.
async fn api_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Option<SearchReply>>, ApiError> {
    let begin = BeginQuery { begin: query.begin }.begin()?;
    let tracker_at = {
        let published = state.published.read().await;
        let tracker = published
            .tracker
            .as_ref()
            .ok_or((StatusCode::NOT_FOUND, "no route loaded".to_string()))?;
        marker_position(tracker, &tracker.fix_with_begin(begin, Utc::now()))
    };

    let geocoder = Arc::clone(&state.geocoder);
    let q = query.q;
    let place = tokio::task::spawn_blocking(move || geocoder.search(&q))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| {
            warn!("search failed: {e}");
            (StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    Ok(Json(place.map(|place| {
        let hit = SearchHit::new(place, tracker_at);
        SearchReply {
            popup: hit.popup(),
            display_name: hit.place.name,
            lat: hit.place.position.lat,
            lon: hit.place.position.lon,
            distance_km: hit.distance_km,
        }
    })))
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigUpdate {
    start_time: String,
    end_time: String,
}

#[derive(Debug, Serialize)]
struct ConfigState {
    revision: u64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

async fn api_config(State(state): State<AppState>) -> Json<ConfigState> {
    let published = state.published.read().await;
    Json(ConfigState {
        revision: published.revision,
        start_time: published.meta.start_time,
        end_time: published.meta.end_time,
    })
}

/// Lay the route out over a new window; clients following the
/// configuration notice the changed `/api/meta` and reload.
async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<RouteMeta>, ApiError> {
    let bad_request = |e: route_tracker::Error| (StatusCode::BAD_REQUEST, e.to_string());
    let start = parse_timestamp(&update.start_time).map_err(bad_request)?;
    let end = parse_timestamp(&update.end_time).map_err(bad_request)?;
    check_window(start, end).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let coords = Arc::clone(&state.coords);
    let internal = |e: String| (StatusCode::INTERNAL_SERVER_ERROR, e);
    let mut next = tokio::task::spawn_blocking(move || publish(&coords, start, end))
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| internal(e.to_string()))?;

    let mut published = state.published.write().await;
    next.revision = published.revision + 1;
    *published = next;
    info!(revision = published.revision, "configuration updated: {start} → {end}");
    Ok(Json(published.meta.clone()))
}

async fn map_svg(State(state): State<AppState>, Query(query): Query<BeginQuery>) -> Result<Response, ApiError> {
    let begin = query.begin()?;
    let published = state.published.read().await;

    let now = Utc::now();
    let (position, caption) = match &published.tracker {
        Some(tracker) => {
            let fix = tracker.fix_with_begin(begin, now);
            let schedule = match begin {
                Some(b) => tracker.schedule().with_begin(b),
                None => *tracker.schedule(),
            };
            let caption = schedule.countdown(now).caption(fix.progress);
            (Some(marker_position(tracker, &fix)), Some(caption))
        }
        None => (None, None),
    };

    let scene = Scene {
        tracker: position,
        caption: caption.as_deref(),
        ..Scene::new(&published.route)
    };
    let svg = render_svg(&scene);
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap()
    }

    fn state(coords: Vec<LatLon>) -> AppState {
        let published = publish(&coords, start(), start() + Duration::days(10)).unwrap();
        AppState {
            coords: Arc::new(coords),
            published: Arc::new(RwLock::new(published)),
            geocoder: Arc::new(Geocoder::new("http://127.0.0.1:9/unreachable")),
        }
    }

    fn track() -> Vec<LatLon> {
        (0..=20).map(|i| LatLon::new(42.5, -5.0 - i as f64 * 0.1)).collect()
    }

    #[tokio::test]
    async fn serves_meta_and_route() {
        let state = state(track());
        let Json(meta) = api_meta(State(state.clone())).await;
        assert_eq!(meta.days, 10);
        assert_eq!(meta.start_time, start());

        let Json(route) = api_route(State(state)).await;
        assert!(route.features.len() >= 10);
        assert_eq!(route.features[0].properties.day, Some(1));
    }

    #[tokio::test]
    async fn position_honours_begin() {
        let state = state(track());
        let begin = Utc::now() - Duration::days(20);
        let query = BeginQuery { begin: Some(begin.to_rfc3339()) };
        let Json(fix) = api_position(State(state), Query(query)).await.unwrap();
        assert_eq!(fix.progress, 1.0);
        let p = fix.position.unwrap();
        assert!((p.lon - -7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn bad_begin_is_rejected() {
        let query = BeginQuery { begin: Some("whenever".into()) };
        let err = api_position(State(state(track())), Query(query)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_data_serves_an_empty_route() {
        let state = state(Vec::new());
        let Json(route) = api_route(State(state.clone())).await;
        assert!(route.features.is_empty());
        let Json(meta) = api_meta(State(state.clone())).await;
        assert_eq!(meta.total_distance_km, 0.0);

        let err = api_position(State(state), Query(BeginQuery::default())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn config_update_relays_the_route() {
        let state = state(track());
        let update = ConfigUpdate {
            start_time: "2025-01-01T00:00:00Z".into(),
            end_time: "2025-01-03T00:00:00Z".into(),
        };
        let Json(meta) = update_config(State(state.clone()), Json(update)).await.unwrap();
        assert_eq!(meta.days, 2);

        let Json(config) = api_config(State(state.clone())).await;
        assert_eq!(config.revision, 1);
        let Json(served) = api_meta(State(state)).await;
        assert_eq!(served, meta);
    }

    #[tokio::test]
    async fn config_rejects_backwards_window() {
        let update = ConfigUpdate {
            start_time: "2025-01-03T00:00:00Z".into(),
            end_time: "2025-01-01T00:00:00Z".into(),
        };
        let err = update_config(State(state(track())), Json(update)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn config_rejects_an_overlong_window() {
        let state = state(track());
        let update = ConfigUpdate {
            start_time: "2024-01-01T00:00:00Z".into(),
            end_time: "3024-01-01T00:00:00Z".into(),
        };
        let err = update_config(State(state.clone()), Json(update)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(config) = api_config(State(state)).await;
        assert_eq!(config.revision, 0);
    }

    #[test]
    fn window_bounds() {
        assert!(check_window(start(), start()).is_ok());
        assert!(check_window(start(), start() + Duration::days(MAX_WINDOW_DAYS)).is_ok());
        assert!(check_window(start(), start() + Duration::days(MAX_WINDOW_DAYS + 1)).is_err());
        assert!(check_window(start(), start() - Duration::seconds(1)).is_err());
    }

    #[tokio::test]
    async fn missing_fix_falls_back_to_route_start() {
        let state = state(track());
        let published = state.published.read().await;
        let tracker = published.tracker.as_ref().unwrap();
        let fix = Fix { at: Utc::now(), progress: 1.5, distance_m: f64::INFINITY, position: None };
        assert_eq!(marker_position(tracker, &fix), tracker.route().start());

        let fix = tracker.fix(start() + Duration::days(5));
        assert_eq!(marker_position(tracker, &fix), fix.position.unwrap());
    }

    #[tokio::test]
    async fn map_caption_keeps_the_countdown_once_started() {
        let begin = Utc::now() - Duration::hours(1);
        let query = BeginQuery { begin: Some(begin.to_rfc3339()) };
        let resp = map_svg(State(state(track())), Query(query)).await.unwrap();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let svg = String::from_utf8(body.to_vec()).unwrap();
        assert!(svg.contains("Started 0d 1h 0m"));
        assert!(svg.contains("% of the route travelled"));
    }

    #[tokio::test]
    async fn map_is_svg() {
        let resp = map_svg(State(state(track())), Query(BeginQuery::default())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/svg+xml");
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let svg = String::from_utf8(body.to_vec()).unwrap();
        assert!(svg.contains("<polyline"));
        assert!(svg.contains("#ff0000"));
    }
}
