//! svg.rs — draw the route, the tracker and the last search hit as a
//! self-contained SVG map.
//!
//! Projection is equirectangular (plate carrée), zoomed to the route.
//! Country outlines come from the basemap embedded at build time.

use std::{fs, path::Path, sync::OnceLock};

use serde_json::Value;
use tracing::debug;

use crate::{error::Result, geo::LatLon, geocode::SearchHit, geojson::FeatureCollection};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const W: f64 = 1200.0;
const H: f64 = 800.0;

/// Fraction of the route extent added on every side.
const PADDING: f64 = 0.1;
/// Smallest extent in degrees, so a single point still gets a view.
const MIN_SPAN: f64 = 0.05;

const ROUTE_WEIGHT: f64 = 5.0;
const TRACKER_RADIUS: f64 = 10.0;
const TRACKER_COLOR: &str = "#ff0000";
const SEARCH_RADIUS: f64 = 7.0;
const SEARCH_COLOR: &str = "#2563eb";

const BASEMAP: &str = include_str!(concat!(env!("OUT_DIR"), "/basemap.geojson"));

static COUNTRIES: OnceLock<Value> = OnceLock::new();

fn countries() -> &'static Value {
    COUNTRIES.get_or_init(|| match serde_json::from_str(BASEMAP) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("basemap unreadable, drawing without it: {e}");
            Value::Null
        }
    })
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// Everything that goes on one frame of the map.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    pub route: &'a FeatureCollection,
    pub tracker: Option<LatLon>,
    pub search: Option<&'a SearchHit>,
    pub caption: Option<&'a str>,
    pub basemap: bool,
}

impl<'a> Scene<'a> {
    pub fn new(route: &'a FeatureCollection) -> Self {
        Self { route, tracker: None, search: None, caption: None, basemap: true }
    }
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
struct Viewport {
    min_lon: f64,
    max_lat: f64,
    scale: f64,
    x_off: f64,
    y_off: f64,
}

impl Viewport {
    fn world() -> Self {
        Self::fit(-180.0, 180.0, -90.0, 90.0, 0.0)
    }

    fn around(points: impl IntoIterator<Item = LatLon>) -> Self {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for p in points {
            let b = bounds.get_or_insert((p.lon, p.lon, p.lat, p.lat));
            b.0 = b.0.min(p.lon);
            b.1 = b.1.max(p.lon);
            b.2 = b.2.min(p.lat);
            b.3 = b.3.max(p.lat);
        }
        match bounds {
            Some((min_lon, max_lon, min_lat, max_lat)) => {
                Self::fit(min_lon, max_lon, min_lat, max_lat, PADDING)
            }
            None => Self::world(),
        }
    }

    fn fit(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64, padding: f64) -> Self {
        let lon_span = (max_lon - min_lon).max(MIN_SPAN);
        let lat_span = (max_lat - min_lat).max(MIN_SPAN);
        let mid_lon = (min_lon + max_lon) / 2.0;
        let mid_lat = (min_lat + max_lat) / 2.0;
        let lon_span = lon_span * (1.0 + 2.0 * padding);
        let lat_span = lat_span * (1.0 + 2.0 * padding);

        let scale = (W / lon_span).min(H / lat_span);
        Self {
            min_lon: mid_lon - lon_span / 2.0,
            max_lat: mid_lat + lat_span / 2.0,
            scale,
            x_off: (W - lon_span * scale) / 2.0,
            y_off: (H - lat_span * scale) / 2.0,
        }
    }

    #[inline]
    fn project(&self, p: LatLon) -> (f64, f64) {
        (
            self.x_off + (p.lon - self.min_lon) * self.scale,
            self.y_off + (self.max_lat - p.lat) * self.scale,
        )
    }
}

// ---------------------------------------------------------------------------
// Basemap GeoJSON → SVG paths
// ---------------------------------------------------------------------------

fn ring_to_path(view: &Viewport, coords: &[Value]) -> String {
    let mut d = String::new();
    for pt in coords {
        let Some(p) = pt
            .as_array()
            .and_then(|a| Some(LatLon::new(a.get(1)?.as_f64()?, a.first()?.as_f64()?)))
        else {
            continue;
        };
        let (x, y) = view.project(p);
        d.push(if d.is_empty() { 'M' } else { 'L' });
        d.push_str(&format!("{x:.1},{y:.1}"));
    }
    if !d.is_empty() {
        d.push('Z');
    }
    d
}

fn geometry_paths(view: &Viewport, geom: &Value) -> Vec<String> {
    let polygons: Vec<&Value> = match geom["type"].as_str() {
        Some("Polygon") => vec![&geom["coordinates"]],
        Some("MultiPolygon") => geom["coordinates"].as_array().map(|p| p.iter().collect()).unwrap_or_default(),
        _ => Vec::new(),
    };

    polygons
        .into_iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_array)
        .map(|ring| ring_to_path(view, ring))
        .filter(|d| !d.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// SVG rendering
// ---------------------------------------------------------------------------

pub fn render_svg(scene: &Scene<'_>) -> String {
    let route_points = scene.route.points();
    let view = if route_points.is_empty() {
        Viewport::around(scene.tracker.into_iter().chain(scene.search.map(|h| h.place.position)))
    } else {
        Viewport::around(route_points.iter().copied())
    };

    let mut s = String::with_capacity(64 << 10);

    s.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{W}" height="{H}" viewBox="0 0 {W} {H}">
  <title>Route tracker</title>
"#
    ));

    // background (sea)
    s.push_str(&format!("  <rect width='{W}' height='{H}' fill='#aad3df'/>\n"));

    if scene.basemap {
        s.push_str("  <g fill='#f2efe9' stroke='#b9b3a8' stroke-width='0.6'>\n");
        if let Some(features) = countries()["features"].as_array() {
            for feature in features {
                for d in geometry_paths(&view, &feature["geometry"]) {
                    s.push_str(&format!("    <path d='{d}'/>\n"));
                }
            }
        }
        s.push_str("  </g>\n");
    }

    // route legs, one polyline per line in document order
    s.push_str(&format!(
        "  <g fill='none' stroke-width='{ROUTE_WEIGHT}' stroke-linecap='round' stroke-linejoin='round'>\n"
    ));
    for feature in &scene.route.features {
        let color = escape(&feature.properties.color);
        for line in feature.lines() {
            let pts: Vec<String> = line
                .iter()
                .map(|p| {
                    let (x, y) = view.project(*p);
                    format!("{x:.1},{y:.1}")
                })
                .collect();
            if pts.is_empty() {
                continue;
            }
            s.push_str(&format!("    <polyline stroke='{color}' points='{}'/>\n", pts.join(" ")));
        }
    }
    s.push_str("  </g>\n");

    if let Some(hit) = scene.search {
        let (x, y) = view.project(hit.place.position);
        s.push_str(&format!(
            "  <circle cx='{x:.1}' cy='{y:.1}' r='{SEARCH_RADIUS}' fill='{SEARCH_COLOR}' stroke='#ffffff' stroke-width='2'/>\n"
        ));
        push_popup(&mut s, x, y - SEARCH_RADIUS - 6.0, &hit.popup());
    }

    if let Some(p) = scene.tracker {
        let (x, y) = view.project(p);
        s.push_str(&format!(
            "  <circle cx='{x:.1}' cy='{y:.1}' r='{TRACKER_RADIUS}' fill='{TRACKER_COLOR}' stroke='{TRACKER_COLOR}' stroke-width='2'/>\n"
        ));
    }

    if let Some(caption) = scene.caption {
        s.push_str(&format!(
            "  <text x='16' y='28' font-family='sans-serif' font-size='18' fill='#1e293b'>{}</text>\n",
            escape(caption)
        ));
    }

    s.push_str("</svg>\n");
    s
}

/// A label box whose bottom edge sits at `(x, bottom)`.
fn push_popup(s: &mut String, x: f64, bottom: f64, text: &str) {
    let lines: Vec<&str> = text.lines().collect();
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as f64 * 7.2 + 16.0;
    let height = lines.len() as f64 * 16.0 + 10.0;
    let left = (x - width / 2.0).clamp(0.0, (W - width).max(0.0));
    let top = (bottom - height).max(0.0);

    s.push_str("  <g font-family='sans-serif' font-size='12' fill='#0f172a'>\n");
    s.push_str(&format!(
        "    <rect x='{left:.1}' y='{top:.1}' width='{width:.1}' height='{height:.1}' rx='4' fill='#ffffff' stroke='#94a3b8'/>\n"
    ));
    for (i, line) in lines.iter().enumerate() {
        s.push_str(&format!(
            "    <text x='{:.1}' y='{:.1}'>{}</text>\n",
            left + 8.0,
            top + 20.0 + i as f64 * 16.0,
            escape(line)
        ));
    }
    s.push_str("  </g>\n");
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Write through a temp file and rename, so viewers never see half a map.
pub fn write_svg(path: &Path, svg: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, svg)?;
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), bytes = svg.len(), "map written");
    Ok(())
}
