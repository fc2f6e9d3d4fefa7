//! segments.rs — cut a track into per-day legs for display.
//!
//! The whole track is spread evenly over the scheduled window: with `n`
//! days each leg is `total / n` long and gets its own colour.

use chrono::{DateTime, Utc};

use crate::{
    error::{Error, Result},
    geo::{haversine, LatLon},
    geojson::{Feature, FeatureCollection, Properties},
    meta::RouteMeta,
};

/// One colour per day, cycled for longer trips.
pub const PALETTE: [&str; 10] = [
    "#ff0000", "#ff7f00", "#ffff00", "#7fff00", "#00ff00",
    "#00ffff", "#0000ff", "#8b00ff", "#ff00ff", "#ff007f",
];

pub fn total_distance_km(coords: &[LatLon]) -> f64 {
    coords.windows(2).map(|w| haversine(w[0], w[1])).sum::<f64>() / 1000.0
}

/// Split `coords` into consecutive legs of about `segment_len_km`.
///
/// Each cut point is interpolated onto the polyline and shared by the leg
/// it ends and the leg it starts. The last leg is usually shorter.
pub fn split_into_segments(coords: &[LatLon], segment_len_km: f64) -> Vec<Vec<LatLon>> {
    let Some(&first) = coords.first() else {
        return Vec::new();
    };
    if !(segment_len_km > 0.0) || !segment_len_km.is_finite() {
        return vec![coords.to_vec()];
    }

    let mut segments = Vec::new();
    let mut current = vec![first];
    let mut current_len = 0.0;

    for pair in coords.windows(2) {
        let (mut prev, cur) = (pair[0], pair[1]);
        let mut step = haversine(prev, cur) / 1000.0;

        // current_len < segment_len_km holds here, so step > 0 inside.
        while current_len + step >= segment_len_km {
            let ratio = (segment_len_km - current_len) / step;
            let cut = LatLon::lerp(prev, cur, ratio);
            current.push(cut);
            segments.push(std::mem::replace(&mut current, vec![cut]));
            prev = cut;
            step = haversine(prev, cur) / 1000.0;
            current_len = 0.0;
        }
        current.push(cur);
        current_len += step;
    }
    segments.push(current);
    segments
}

pub fn build_collection(segments: &[Vec<LatLon>]) -> FeatureCollection {
    let features = segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            let properties = Properties {
                day: Some(idx as u32 + 1),
                color: PALETTE[idx % PALETTE.len()].to_string(),
            };
            Feature::line(segment, properties)
        })
        .collect();
    FeatureCollection::new(features)
}

/// Lay the track out over `start..end`: per-day legs plus the metadata the
/// client needs to animate it.
pub fn build_route(
    coords: &[LatLon],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(FeatureCollection, RouteMeta)> {
    if coords.is_empty() {
        return Err(Error::EmptyRoute);
    }

    let window = end - start;
    let total_distance_km = total_distance_km(coords);
    let days = window.num_days().max(1);
    let daily_distance_km = total_distance_km / days as f64;
    let collection = build_collection(&split_into_segments(coords, daily_distance_km));

    let duration_s = (window.num_milliseconds() as f64 / 1000.0).max(1.0);
    let meta = RouteMeta {
        total_distance_km,
        daily_distance_km,
        speed_mps: total_distance_km * 1000.0 / duration_s,
        start_time: start,
        end_time: end,
        days,
    };
    Ok((collection, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};

    fn equator(lons: &[f64]) -> Vec<LatLon> {
        lons.iter().map(|&lon| LatLon::new(0.0, lon)).collect()
    }

    #[test]
    fn cuts_legs_at_even_distances() {
        let coords = equator(&[0.0, 1.0, 3.0]);
        let total = total_distance_km(&coords);
        let segments = split_into_segments(&coords, total / 2.5);

        assert_eq!(segments.len(), 3);
        assert_relative_eq!(segments[0].last().unwrap().lon, 1.2, epsilon = 1e-9);
        assert_relative_eq!(segments[1].last().unwrap().lon, 2.4, epsilon = 1e-9);
        assert_eq!(segments[2].last().unwrap().lon, 3.0);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].last(), pair[1].first());
        }
        // the vertex at lon 1 falls inside the first leg
        assert_eq!(segments[0], vec![LatLon::new(0.0, 0.0), LatLon::new(0.0, 1.0), segments[1][0]]);
    }

    #[test]
    fn long_leg_is_cut_several_times() {
        let coords = equator(&[0.0, 10.0]);
        let total = total_distance_km(&coords);
        let segments = split_into_segments(&coords, total / 3.5);
        assert_eq!(segments.len(), 4);
        assert!(segments.iter().all(|s| s.len() == 2));
    }

    #[test]
    fn degenerate_lengths_keep_one_segment() {
        let coords = equator(&[0.0, 0.0]);
        assert_eq!(split_into_segments(&coords, 0.0), vec![coords.clone()]);
        assert_eq!(split_into_segments(&coords, f64::NAN), vec![coords.clone()]);
        assert!(split_into_segments(&[], 5.0).is_empty());
    }

    #[test]
    fn colours_cycle_by_day() {
        let segments = vec![equator(&[0.0, 1.0]); 12];
        let fc = build_collection(&segments);
        assert_eq!(fc.features.len(), 12);
        assert_eq!(fc.features[0].properties.day, Some(1));
        assert_eq!(fc.features[0].properties.color, PALETTE[0]);
        assert_eq!(fc.features[10].properties.color, PALETTE[0]);
        assert_eq!(fc.features[11].properties.day, Some(12));
    }

    #[test]
    fn route_metadata_spreads_distance_over_the_window() {
        let start = Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap();
        let end = start + Duration::days(10);
        let coords = equator(&[0.0, 1.0, 2.0]);

        let (fc, meta) = build_route(&coords, start, end).unwrap();
        let total = total_distance_km(&coords);
        assert_eq!(meta.days, 10);
        assert_relative_eq!(meta.total_distance_km, total);
        assert_relative_eq!(meta.daily_distance_km, total / 10.0);
        assert_relative_eq!(meta.speed_mps, total * 1000.0 / 864_000.0);
        assert!(fc.features.len() >= 10);
    }

    #[test]
    fn short_window_counts_as_one_day() {
        let start = Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap();
        let (_, meta) = build_route(&equator(&[0.0, 1.0]), start, start + Duration::hours(3)).unwrap();
        assert_eq!(meta.days, 1);
        assert_relative_eq!(meta.daily_distance_km, meta.total_distance_km);
    }

    #[test]
    fn empty_track_is_an_error() {
        let start = Utc.with_ymd_and_hms(2024, 8, 10, 0, 0, 0).unwrap();
        assert!(matches!(build_route(&[], start, start), Err(Error::EmptyRoute)));
    }
}
