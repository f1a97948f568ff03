//! Friendly device identifiers for Garmin units.

use crate::app::ports::MountInfo;
use crate::formats::xml::{decode_document, Document};
use crate::hashing::sha256_bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

static HEX_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_[0-9a-fA-F]{6,}$").expect("suffix pattern is valid"));
static GARMIN_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Garmin[_\s]+").expect("prefix pattern is valid"));

const DEVICE_XML_LOCATIONS: &[&[&str]] = &[
    &["Internal Storage", "GARMIN", "GarminDevice.xml"],
    &["GARMIN", "GarminDevice.xml"],
    &["Internal Storage", "Garmin", "GarminDevice.xml"],
];

/// `"GPSMAP 67"` -> `"gpsmap67"`. Never empty.
pub fn slugify_device_model(model: &str) -> String {
    let trimmed = GARMIN_PREFIX.replace(model.trim(), "");
    let slug: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if slug.is_empty() {
        "garmin".to_string()
    } else {
        slug
    }
}

/// Model description from a GarminDevice.xml document, if one can be found.
pub fn device_xml_description(path: &Path) -> Option<String> {
    let text = decode_document(&fs::read(path).ok()?).ok()?;
    let doc = match Document::parse(&text) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not parse GarminDevice.xml");
            return None;
        }
    };
    let all = doc.root.descendants();
    let non_empty = |s: String| {
        let s = s.trim().to_string();
        (!s.is_empty()).then_some(s)
    };

    all.iter()
        .filter(|e| e.local_name() == "Description")
        .find_map(|e| non_empty(e.text()))
        .or_else(|| {
            all.iter()
                .filter(|e| e.local_name() == "Model")
                .flat_map(|m| m.elements().filter(|c| c.local_name() == "Name"))
                .find_map(|e| non_empty(e.text()))
        })
        .or_else(|| {
            all.iter()
                .filter(|e| e.local_name().to_lowercase().ends_with("description"))
                .find_map(|e| non_empty(e.text()))
        })
}

/// Host name first (`Garmin_GPSMAP_67_0000abcd12` -> `gpsmap67`), then
/// GarminDevice.xml on the mount, then a hash of the host.
pub fn derive_device_id(mount: &MountInfo) -> String {
    let host = mount.host.as_str();

    if let Some(model) = host.strip_prefix("Garmin_") {
        let model = HEX_SUFFIX.replace(model, "").replace('_', " ");
        let slug = slugify_device_model(&model);
        if !slug.is_empty() {
            debug!(host, device_id = %slug, "Device id from host name");
            return slug;
        }
    }

    for parts in DEVICE_XML_LOCATIONS {
        let path = parts.iter().fold(mount.gvfs_mount.clone(), |p, part| p.join(part));
        if path.is_file() {
            if let Some(desc) = device_xml_description(&path) {
                debug!(path = %path.display(), description = %desc, "Device id from GarminDevice.xml");
                return slugify_device_model(&desc);
            }
        }
    }

    format!("garmin_{}", &sha256_bytes(host.as_bytes())[..8])
}
