//! Route metadata served at `/api/meta`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMeta {
    #[serde(default)]
    pub total_distance_km: f64,
    #[serde(default)]
    pub daily_distance_km: f64,
    #[serde(default)]
    pub speed_mps: f64,
    #[serde(with = "iso8601")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub days: i64,
}

impl RouteMeta {
    /// Metadata for a window with no track loaded.
    pub fn empty(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            total_distance_km: 0.0,
            daily_distance_km: 0.0,
            speed_mps: 0.0,
            start_time,
            end_time,
            days: 0,
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.start_time, self.end_time)
    }
}

mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::schedule::parse_timestamp;

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reads_server_meta() {
        let doc = r#"{
            "total_distance_km": 250.5,
            "daily_distance_km": 25.05,
            "speed_mps": 0.29,
            "start_time": "2024-08-10T00:00:00+00:00",
            "end_time": "2024-08-20T00:00:00+00:00",
            "days": 10
        }"#;
        let meta: RouteMeta = serde_json::from_str(doc).unwrap();
        assert_eq!(meta.start_time, Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap());
        assert_eq!(meta.end_time, Utc.with_ymd_and_hms(2024, 8, 20, 0, 0, 0).unwrap());
        assert_eq!(meta.days, 10);
    }

    #[test]
    fn only_the_window_is_required() {
        let doc = r#"{"start_time": "2024-08-10T02:00:00+02:00", "end_time": "2024-08-11T00:00:00Z"}"#;
        let meta: RouteMeta = serde_json::from_str(doc).unwrap();
        assert_eq!(meta.start_time, Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap());
        assert_eq!(meta.total_distance_km, 0.0);
    }

    #[test]
    fn writes_offset_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap();
        let meta = RouteMeta::empty(start, start);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["start_time"], "2024-08-10T00:00:00+00:00");
    }

    #[test]
    fn rejects_garbage_timestamps() {
        let doc = r#"{"start_time": "soon", "end_time": "later"}"#;
        assert!(serde_json::from_str::<RouteMeta>(doc).is_err());
    }
}
