use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Destination folder for an ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Current,
    Archive,
    Waypoints,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Current => "Current",
            Category::Archive => "Archive",
            Category::Waypoints => "Waypoints",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// `subpath` is the part below the category folder on the device.
    Ingest { category: Category, subpath: String },
    Skip,
}

// Order matters: the catch-all must come last.
static RULES: Lazy<Vec<(Category, Regex)>> = Lazy::new(|| {
    [
        (Category::Current, r"(?i)/GARMIN/GPX/Current/(.+\.gpx)$"),
        (Category::Archive, r"(?i)/GARMIN/GPX/Archive/(.+\.gpx)$"),
        (Category::Waypoints, r"(?i)/GARMIN/GPX/(Waypoints_[^/]+\.gpx)$"),
        (Category::Other, r"(?i)/GARMIN/GPX/(.+\.gpx)$"),
    ]
    .into_iter()
    .map(|(cat, pattern)| (cat, Regex::new(pattern).expect("classification pattern is valid")))
    .collect()
});

/// Classify a device-relative POSIX path.
pub fn classify_gpx(relpath: &str) -> Classification {
    let path = format!("/{}", relpath.trim_start_matches('/'));
    for (category, re) in RULES.iter() {
        if let Some(sub) = re.captures(&path).and_then(|c| c.get(1)) {
            return Classification::Ingest {
                category: *category,
                subpath: sub.as_str().to_string(),
            };
        }
    }
    Classification::Skip
}

/// `*.gpx` files under a device mount as `(absolute, relative POSIX path)`, sorted
/// by relative path. Below the root, only directories whose path mentions
/// `GARMIN` (any case) are entered.
pub fn iter_gpx_files(root: &Path) -> Vec<(PathBuf, String)> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut out: Vec<(PathBuf, String)> = WalkDir::new(&root)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || entry.path().to_string_lossy().to_uppercase().contains("GARMIN")
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .ends_with(".gpx")
        })
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(&root).ok()?;
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            Some((entry.into_path(), rel))
        })
        .collect();
    out.sort_by(|a, b| a.1.cmp(&b.1));
    out
}
