use crate::error::Result;
use crate::formats::gpx::{extract_trackpoints, read_gpx, TrackPoint};
use serde::Serialize;
use std::path::Path;

/// Mean Earth radius (IUGG), metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub const TSV_HEADER: &str =
    "file\tpoints\tsegments\tdistance_m\tduration_s\tavg_speed_mps\tmax_speed_mps";

/// Great-circle distance in metres between two `(lat, lon)` pairs in degrees.
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Per-step time (s), distance (m) and speed (m/s), index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepMetrics {
    pub dts: Vec<f64>,
    pub distances: Vec<f64>,
    pub speeds: Vec<f64>,
}

/// Metrics for consecutive point pairs. Pairs whose time does not advance are dropped.
pub fn compute_step_metrics(points: &[TrackPoint]) -> StepMetrics {
    let mut out = StepMetrics::default();
    for pair in points.windows(2) {
        let dt = (pair[1].time - pair[0].time).num_milliseconds() as f64 / 1000.0;
        if dt <= 0.0 {
            continue;
        }
        let d = haversine_m((pair[0].lat, pair[0].lon), (pair[1].lat, pair[1].lon));
        out.dts.push(dt);
        out.distances.push(d);
        out.speeds.push(d / dt);
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackStats {
    pub points: usize,
    /// Steps that contributed to the totals.
    pub segments: usize,
    pub distance_m: f64,
    pub duration_s: f64,
    pub avg_speed_mps: f64,
    pub max_speed_mps: f64,
}

impl TrackStats {
    pub fn from_points(points: &[TrackPoint]) -> Self {
        if points.len() < 2 {
            return Self {
                points: points.len(),
                ..Self::default()
            };
        }
        let steps = compute_step_metrics(points);
        let distance_m: f64 = steps.distances.iter().sum();
        let duration_s: f64 = steps.dts.iter().sum();
        Self {
            points: points.len(),
            segments: steps.speeds.len(),
            distance_m,
            duration_s,
            avg_speed_mps: if duration_s > 0.0 { distance_m / duration_s } else { 0.0 },
            max_speed_mps: steps.speeds.iter().copied().fold(0.0, f64::max),
        }
    }
}

pub fn analyze_track(path: &Path) -> Result<TrackStats> {
    let doc = read_gpx(path)?;
    Ok(TrackStats::from_points(&extract_trackpoints(&doc)))
}

pub fn format_report(path: &Path, stats: &TrackStats) -> String {
    format!(
        "{}\n  points        : {}\n  segments      : {}\n  distance (m)  : {:.2}\n  duration (s)  : {:.1}\n  avg speed m/s : {:.3}\n  max speed m/s : {:.3}\n",
        path.display(),
        stats.points,
        stats.segments,
        stats.distance_m,
        stats.duration_s,
        stats.avg_speed_mps,
        stats.max_speed_mps,
    )
}

pub fn format_tsv_row(path: &Path, stats: &TrackStats) -> String {
    format!(
        "{}\t{}\t{}\t{:.2}\t{:.1}\t{:.3}\t{:.3}",
        path.display(),
        stats.points,
        stats.segments,
        stats.distance_m,
        stats.duration_s,
        stats.avg_speed_mps,
        stats.max_speed_mps,
    )
}
