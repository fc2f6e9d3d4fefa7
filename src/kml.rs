//! Minimal KML reader: pulls the coordinates out of every `LineString`.

use std::{fs, path::Path};

use tracing::info;

use crate::{
    error::{Error, Result},
    geo::LatLon,
};

/// Extract all `LineString` coordinates from a KML document, in order.
pub fn parse_kml(text: &str) -> Result<Vec<LatLon>> {
    let mut coords = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("<LineString") {
        let body = &rest[open..];
        let end = body.find("</LineString>").unwrap_or(body.len());
        if let Some(block) = element_text(&body[..end], "coordinates") {
            for tuple in block.split_whitespace() {
                coords.push(parse_tuple(tuple)?);
            }
        }
        rest = body[end..].strip_prefix("</LineString>").unwrap_or("");
    }
    Ok(coords)
}

/// Read every `*.kml` file in `dir`, sorted by file name, and concatenate
/// their tracks.
pub fn load_dir(dir: &Path) -> Result<Vec<LatLon>> {
    let mut files: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |e| e.eq_ignore_ascii_case("kml")))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::NoTracks(dir.display().to_string()));
    }

    let mut coords = Vec::new();
    for file in &files {
        let track = parse_kml(&fs::read_to_string(file)?)?;
        info!(file = %file.display(), points = track.len(), "read track");
        coords.extend(track);
    }
    Ok(coords)
}

fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = xml.find(&format!("<{tag}"))?;
    let content = open + xml[open..].find('>')? + 1;
    let close = content + xml[content..].find(&format!("</{tag}>"))?;
    Some(&xml[content..close])
}

/// `lon,lat[,alt]`
fn parse_tuple(tuple: &str) -> Result<LatLon> {
    let mut parts = tuple.split(',');
    let lon = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
    let lat = parts.next().and_then(|v| v.trim().parse::<f64>().ok());
    match (lat, lon) {
        (Some(lat), Some(lon)) => Ok(LatLon::new(lat, lon)),
        _ => Err(Error::Kml(tuple.to_string())),
    }
}
