//! GPX-level operations: parsing, canonical metadata, deterministic re-serialization.
//!
//! Only the XML structure is touched. Coordinates, segments and points are
//! carried through unchanged.

use crate::error::{FormatError, Result};
use crate::formats::xml::{decode_document, Document, Element, Node};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Elements that follow `<time>` inside `<metadata>` in GPX 1.1.
const AFTER_METADATA_TIME: &[&str] = &["keywords", "bounds", "extensions"];

/// Parse a GPX `<time>` value. Accepts `Z`, explicit offsets and fractional
/// seconds; naive timestamps are taken as UTC.
pub fn parse_gpx_time(text: &str) -> Option<DateTime<Utc>> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let naive = s.strip_suffix(['Z', 'z']).unwrap_or(s);
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|n| Utc.from_utc_datetime(&n))
}

/// UTC, second precision, literal `Z`.
pub fn format_gpx_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub set_metadata_name: bool,
    pub set_trk_name: bool,
    pub ensure_metadata_time: bool,
    pub pretty: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            set_metadata_name: true,
            set_trk_name: true,
            ensure_metadata_time: true,
            pretty: true,
        }
    }
}

/// What normalization changed. Folded into the sidecar as `gpx_stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeResult {
    pub metadata_name_set: bool,
    pub trk_name_set: bool,
    pub metadata_time_set: bool,
    pub trk_count: usize,
    pub first_time_utc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
    pub ele: Option<f64>,
}

/// Parse `xml` and require a `<gpx>` root.
pub fn parse_gpx(xml: &str) -> std::result::Result<Document, FormatError> {
    let doc = Document::parse(xml)?;
    if doc.root.local_name() != "gpx" {
        return Err(FormatError::NotGpx(doc.root.name.clone()));
    }
    Ok(doc)
}

pub fn read_gpx(path: &Path) -> Result<Document> {
    let xml = decode_document(&fs::read(path)?)?;
    Ok(parse_gpx(&xml)?)
}

/// Earliest track-point time; falls back to `metadata/time`.
pub fn first_time_utc(doc: &Document) -> Option<DateTime<Utc>> {
    let ns = doc.root.namespace.as_deref();
    let earliest = doc
        .root
        .descendants()
        .into_iter()
        .filter(|e| e.is("trkpt", ns))
        .filter_map(|pt| pt.find("time", ns))
        .filter_map(|t| parse_gpx_time(&t.text()))
        .min();

    earliest.or_else(|| {
        doc.root
            .find("metadata", ns)
            .and_then(|md| md.find("time", ns))
            .and_then(|t| parse_gpx_time(&t.text()))
    })
}

/// Track points in document order. Points without a parseable lat, lon or time are skipped.
pub fn extract_trackpoints(doc: &Document) -> Vec<TrackPoint> {
    let ns = doc.root.namespace.as_deref();
    doc.root
        .descendants()
        .into_iter()
        .filter(|e| e.is("trkpt", ns))
        .filter_map(|pt| {
            let lat = pt.attr("lat")?.trim().parse::<f64>().ok()?;
            let lon = pt.attr("lon")?.trim().parse::<f64>().ok()?;
            let time = parse_gpx_time(&pt.find("time", ns)?.text())?;
            let ele = pt
                .find("ele", ns)
                .and_then(|e| e.text().trim().parse::<f64>().ok());
            Some(TrackPoint { lat, lon, time, ele })
        })
        .collect()
}

/// Normalize a GPX document held in memory. Returns the serialized output and
/// what changed; nothing touches the filesystem.
pub fn normalize_document(
    xml: &str,
    title: &str,
    options: &NormalizeOptions,
) -> std::result::Result<(String, NormalizeResult), FormatError> {
    let mut doc = parse_gpx(xml)?;
    let ns_owned = doc.root.namespace.clone();
    let ns = ns_owned.as_deref();

    let trk_count = doc.root.elements().filter(|e| e.is("trk", ns)).count();
    let first_time = first_time_utc(&doc);

    let md_index = match doc.root.position("metadata", ns) {
        Some(i) => i,
        None => {
            let md = doc.root.new_child("metadata");
            doc.root.children.insert(0, Node::Element(md));
            0
        }
    };

    let mut result = NormalizeResult {
        trk_count,
        first_time_utc: first_time.map(format_gpx_time),
        ..NormalizeResult::default()
    };

    if !title.is_empty() {
        if options.set_metadata_name {
            if let Some(md) = doc.root.child_at_mut(md_index) {
                result.metadata_name_set = set_child_text(md, "name", title, ns);
            }
        }
        if options.set_trk_name {
            if let Some(i) = doc.root.position("trk", ns) {
                if let Some(trk) = doc.root.child_at_mut(i) {
                    result.trk_name_set = set_child_text(trk, "name", title, ns);
                }
            }
        }
    }

    if options.ensure_metadata_time {
        if let Some(md) = doc.root.child_at_mut(md_index) {
            result.metadata_time_set = ensure_metadata_time(md, first_time, ns);
        }
    }

    let out = if options.pretty {
        doc.to_pretty_string()
    } else {
        doc.to_raw_string()
    };
    Ok((out, result))
}

/// Read `source`, normalize it and write the result to `dest`, creating parent
/// directories. `source` is never modified.
pub fn normalize(
    source: &Path,
    dest: &Path,
    title: &str,
    options: &NormalizeOptions,
) -> Result<NormalizeResult> {
    let xml = decode_document(&fs::read(source)?)?;
    let (out, result) = normalize_document(&xml, title, options)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, out)?;
    Ok(result)
}

/// Set the text of the first `local` child, creating it as the first child when
/// missing. Returns whether anything changed.
fn set_child_text(parent: &mut Element, local: &str, value: &str, ns: Option<&str>) -> bool {
    if let Some(child) = parent.find_mut(local, ns) {
        if child.value() == value {
            return false;
        }
        child.set_text(value);
        return true;
    }
    let mut child = parent.new_child(local);
    child.set_text(value);
    parent.children.insert(0, Node::Element(child));
    true
}

fn ensure_metadata_time(
    md: &mut Element,
    first_time: Option<DateTime<Utc>>,
    ns: Option<&str>,
) -> bool {
    match md.find_mut("time", ns) {
        Some(el) => {
            let current = el.value();
            if current.trim().is_empty() {
                match first_time {
                    Some(t) => {
                        el.set_text(&format_gpx_time(t));
                        true
                    }
                    None => false,
                }
            } else {
                // Unparseable values are left as found.
                match parse_gpx_time(&current).map(format_gpx_time) {
                    Some(canonical) if canonical != current => {
                        el.set_text(&canonical);
                        true
                    }
                    _ => false,
                }
            }
        }
        None => {
            let Some(t) = first_time else { return false };
            let mut el = md.new_child("time");
            el.set_text(&format_gpx_time(t));
            let at = md
                .children
                .iter()
                .position(|n| {
                    matches!(n, Node::Element(e) if AFTER_METADATA_TIME.contains(&e.local_name()))
                })
                .unwrap_or(md.children.len());
            md.children.insert(at, Node::Element(el));
            true
        }
    }
}
