//! build.rs — fetch the basemap once.
//!
//! Natural Earth 110m country GeoJSON → assets/world.geojson, then copied
//! into `$OUT_DIR/basemap.geojson` where `svg.rs` embeds it.
//!
//! Offline builds still work:
//!   • Set ROUTE_TRACKER_OFFLINE=1 to skip the download entirely.
//!   • A failed download is not fatal; the map is drawn without countries.

use std::{env, fs, io::Read, path::Path};

const GEOJSON_URL: &str =
    "https://raw.githubusercontent.com/datasets/geo-countries/master/data/countries.geojson";
const GEOJSON_PATH: &str = "assets/world.geojson";
const EMPTY_COLLECTION: &str = r#"{"type":"FeatureCollection","features":[]}"#;

fn main() {
    println!("cargo:rerun-if-env-changed=ROUTE_TRACKER_OFFLINE");
    println!("cargo:rerun-if-changed={GEOJSON_PATH}");

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let out_dir = env::var("OUT_DIR").unwrap();
    let cached = Path::new(&manifest_dir).join(GEOJSON_PATH);
    let embedded = Path::new(&out_dir).join("basemap.geojson");

    if cached.exists() {
        eprintln!("[build] world.geojson already present, skipping download.");
        fs::copy(&cached, &embedded).expect("failed to copy world.geojson into OUT_DIR");
        return;
    }

    if env::var("ROUTE_TRACKER_OFFLINE").map_or(false, |v| !v.is_empty()) {
        eprintln!("[build] ROUTE_TRACKER_OFFLINE set, basemap disabled.");
        fs::write(&embedded, EMPTY_COLLECTION).expect("failed to write basemap.geojson");
        return;
    }

    eprintln!("[build] Downloading world.geojson ...");
    match fetch(GEOJSON_URL) {
        Ok(body) => {
            if let Some(parent) = cached.parent() {
                fs::create_dir_all(parent).expect("could not create assets/ directory");
            }
            fs::write(&cached, &body).expect("failed to write world.geojson");
            fs::write(&embedded, &body).expect("failed to write basemap.geojson");
            eprintln!("[build] Saved {} bytes → {GEOJSON_PATH}", body.len());
        }
        Err(e) => {
            eprintln!("[build] ⚠  Failed to download world.geojson: {e}");
            eprintln!("[build]    The map will be drawn without country outlines.");
            fs::write(&embedded, EMPTY_COLLECTION).expect("failed to write basemap.geojson");
        }
    }
}

fn fetch(url: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let resp = ureq::get(url).set("Accept-Encoding", "identity").call()?;
    let mut buf = Vec::new();
    resp.into_reader().read_to_end(&mut buf)?;
    Ok(buf)
}
