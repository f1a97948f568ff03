//! Plain-text summary of a GPX file for the picker's preview pane.

use crate::formats::gpx::read_gpx;
use crate::formats::xml::{Document, Element};
use std::fmt::Write;
use std::path::Path;

const MAX_POINTS: usize = 12;
const MAX_WAYPOINTS: usize = 20;

/// Preview text for `path`. Unreadable or malformed files produce a one-line
/// message instead of an error so the pane always has something to show.
pub fn preview_file(path: &Path) -> String {
    match read_gpx(path) {
        Ok(doc) => preview_document(&doc),
        Err(e) => format!("Failed to parse GPX: {}\n", e),
    }
}

/// Summarize the first track, else the first route, else the waypoints.
pub fn preview_document(doc: &Document) -> String {
    let ns = doc.root.namespace.as_deref();
    let mut out = String::new();
    let tracks: Vec<&Element> = doc.root.elements().filter(|e| e.is("trk", ns)).collect();
    let routes: Vec<&Element> = doc.root.elements().filter(|e| e.is("rte", ns)).collect();
    let waypoints: Vec<&Element> = doc.root.elements().filter(|e| e.is("wpt", ns)).collect();

    if let Some(trk) = tracks.first() {
        let points: Vec<&Element> = trk
            .descendants()
            .into_iter()
            .filter(|e| e.is("trkpt", ns))
            .collect();
        let _ = writeln!(out, "Tracks: {}\n", tracks.len());
        let name = child_text(trk, "name", ns).unwrap_or_else(|| "(no trk name)".to_string());
        let _ = writeln!(out, "Track: {}\n", name);
        let _ = writeln!(out, "Trackpoints: {}\n", points.len());
        for pt in points.iter().take(MAX_POINTS) {
            let _ = writeln!(out, "{}", point_line(pt, ns));
        }
    } else if let Some(rte) = routes.first() {
        let points: Vec<&Element> = rte.elements().filter(|e| e.is("rtept", ns)).collect();
        let _ = writeln!(out, "Routes: {}\n", routes.len());
        let name = child_text(rte, "name", ns).unwrap_or_else(|| "(no rte name)".to_string());
        let _ = writeln!(out, "Route: {}\n", name);
        let _ = writeln!(out, "Routepoints: {}\n", points.len());
        for pt in points.iter().take(MAX_POINTS) {
            let mut line = point_line(pt, ns);
            if let Some(name) = child_text(pt, "name", ns).filter(|n| !n.is_empty()) {
                line.push_str("  ");
                line.push_str(&name);
            }
            let _ = writeln!(out, "{}", line);
        }
    } else if !waypoints.is_empty() {
        let _ = writeln!(out, "Waypoints: {}\n", waypoints.len());
        for wpt in waypoints.iter().take(MAX_WAYPOINTS) {
            let name = child_text(wpt, "name", ns).unwrap_or_else(|| "(no name)".to_string());
            let mut line = format!(
                "{}  ({}, {})",
                name,
                wpt.attr("lat").unwrap_or(""),
                wpt.attr("lon").unwrap_or("")
            );
            if let Some(time) = child_text(wpt, "time", ns).filter(|t| !t.is_empty()) {
                line.push_str("  ");
                line.push_str(&time);
            }
            let _ = writeln!(out, "{}", line);
            if let Some(desc) = child_text(wpt, "desc", ns).filter(|d| !d.is_empty()) {
                let _ = writeln!(out, "  {}", desc);
            }
        }
    } else {
        out.push_str("No <trk>, <rte>, or <wpt> elements found.\n");
    }
    out
}

fn child_text(el: &Element, local: &str, ns: Option<&str>) -> Option<String> {
    el.find(local, ns).map(|c| c.value().trim().to_string())
}

/// `lat, lon` followed by the point's time when it has one.
fn point_line(pt: &Element, ns: Option<&str>) -> String {
    let mut line = format!(
        "{}, {}",
        pt.attr("lat").unwrap_or(""),
        pt.attr("lon").unwrap_or("")
    );
    if let Some(time) = child_text(pt, "time", ns).filter(|t| !t.is_empty()) {
        line.push_str("  ");
        line.push_str(&time);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::gpx::parse_gpx;
    use std::fs;

    const NS: &str = r#"xmlns="http://www.topografix.com/GPX/1/1""#;

    fn preview(body: &str) -> String {
        preview_document(&parse_gpx(&format!("<gpx {}>{}</gpx>", NS, body)).unwrap())
    }

    #[test]
    fn test_track_preview_lists_first_points() {
        let points: String = (0..15)
            .map(|i| format!(r#"<trkpt lat="47.{i}" lon="-122.3"><time>2026-01-02T21:{i:02}:00Z</time></trkpt>"#))
            .collect();
        let text = preview(&format!(
            "<wpt lat=\"1\" lon=\"2\"/><trk><name>Ridge</name><trkseg>{}</trkseg></trk><trk/>",
            points
        ));
        assert!(text.starts_with("Tracks: 2\n\nTrack: Ridge\n\nTrackpoints: 15\n\n"));
        assert!(text.contains("47.0, -122.3  2026-01-02T21:00:00Z\n"));
        assert!(text.contains("47.11, -122.3"));
        assert!(!text.contains("47.12, -122.3"));
        assert!(!text.contains("Waypoints"));
    }

    #[test]
    fn test_route_preview_appends_point_names() {
        let text = preview(
            r#"<rte><rtept lat="1" lon="2"><name>Start</name></rtept><rtept lat="3" lon="4"/></rte>"#,
        );
        assert_eq!(
            text,
            "Routes: 1\n\nRoute: (no rte name)\n\nRoutepoints: 2\n\n1, 2  Start\n3, 4\n"
        );
    }

    #[test]
    fn test_waypoint_preview_shows_description() {
        let text = preview(
            r#"<wpt lat="1" lon="2"><name>Camp</name><time>2026-01-02T21:14:44Z</time><desc>Near water</desc></wpt><wpt lat="5" lon="6"/>"#,
        );
        assert_eq!(
            text,
            "Waypoints: 2\n\nCamp  (1, 2)  2026-01-02T21:14:44Z\n  Near water\n(no name)  (5, 6)\n"
        );
    }

    #[test]
    fn test_empty_and_broken_files() {
        assert_eq!(preview(""), "No <trk>, <rte>, or <wpt> elements found.\n");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gpx");
        fs::write(&path, "<gpx><trk>").unwrap();
        assert!(preview_file(&path).starts_with("Failed to parse GPX: "));
        assert!(preview_file(&dir.path().join("missing.gpx")).starts_with("Failed to parse GPX: "));
    }
}
