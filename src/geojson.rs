//! The subset of GeoJSON the route API speaks: a `FeatureCollection` of
//! coloured line features.

use serde::{Deserialize, Serialize};

use crate::geo::LatLon;

const DEFAULT_COLOR: &str = "#3388ff";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_type")]
    pub kind: String,
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Properties,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(default = "default_color")]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    LineString(Vec<Vec<f64>>),
    MultiLineString(Vec<Vec<Vec<f64>>>),
}

fn collection_type() -> String {
    "FeatureCollection".to_string()
}

fn feature_type() -> String {
    "Feature".to_string()
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Default for Properties {
    fn default() -> Self {
        Self { day: None, color: default_color() }
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { kind: collection_type(), features }
    }

    /// Every position of every feature, in document order.
    pub fn points(&self) -> Vec<LatLon> {
        self.features.iter().flat_map(Feature::lines).flatten().collect()
    }
}

impl Feature {
    pub fn line(points: &[LatLon], properties: Properties) -> Self {
        Self {
            kind: feature_type(),
            properties,
            geometry: Geometry::LineString(points.iter().map(|p| p.to_lon_lat()).collect()),
        }
    }

    /// The feature's geometry as one or more polylines. Positions with
    /// fewer than two ordinates are skipped.
    pub fn lines(&self) -> Vec<Vec<LatLon>> {
        fn to_points(line: &[Vec<f64>]) -> Vec<LatLon> {
            line.iter().filter_map(|c| LatLon::from_lon_lat(c)).collect()
        }

        match &self.geometry {
            Geometry::LineString(line) => vec![to_points(line)],
            Geometry::MultiLineString(lines) => lines.iter().map(|l| to_points(l)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_route_document() {
        let doc = r##"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"day": 1, "color": "#ff0000"},
                 "geometry": {"type": "LineString", "coordinates": [[-5.0, 42.0], [-5.1, 42.1]]}},
                {"type": "Feature", "properties": {"color": "#00ff00", "name": "ignored"},
                 "geometry": {"type": "MultiLineString", "coordinates": [[[-5.1, 42.1]], [[-5.2, 42.2]]]}}
            ]
        }"##;
        let fc: FeatureCollection = serde_json::from_str(doc).unwrap();

        assert_eq!(fc.features.len(), 2);
        assert_eq!(fc.features[0].properties.day, Some(1));
        assert_eq!(fc.features[1].properties.color, "#00ff00");
        assert_eq!(
            fc.points(),
            vec![
                LatLon::new(42.0, -5.0),
                LatLon::new(42.1, -5.1),
                LatLon::new(42.1, -5.1),
                LatLon::new(42.2, -5.2),
            ]
        );
    }

    #[test]
    fn missing_properties_get_default_color() {
        let doc = r#"{"features": [{"geometry": {"type": "LineString", "coordinates": []}}]}"#;
        let fc: FeatureCollection = serde_json::from_str(doc).unwrap();
        assert_eq!(fc.kind, "FeatureCollection");
        assert_eq!(fc.features[0].properties.color, DEFAULT_COLOR);
        assert!(fc.points().is_empty());
    }

    #[test]
    fn writes_lon_lat_order() {
        let feature = Feature::line(&[LatLon::new(42.0, -5.0)], Properties::default());
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["geometry"]["type"], "LineString");
        assert_eq!(json["geometry"]["coordinates"][0][0], -5.0);
        assert!(json["properties"].get("day").is_none());
    }
}
