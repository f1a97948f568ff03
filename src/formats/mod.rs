pub mod gpx;
pub mod preview;
pub mod xml;

pub use gpx::{
    extract_trackpoints, first_time_utc, format_gpx_time, normalize, normalize_document,
    parse_gpx, parse_gpx_time, read_gpx, NormalizeOptions, NormalizeResult, TrackPoint,
};
pub use preview::{preview_document, preview_file};
