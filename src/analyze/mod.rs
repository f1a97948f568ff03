//! Distance, duration and speed statistics for GPX tracks.

pub mod track;

pub use track::{
    analyze_track, compute_step_metrics, format_report, format_tsv_row, haversine_m,
    StepMetrics, TrackStats, TSV_HEADER,
};
