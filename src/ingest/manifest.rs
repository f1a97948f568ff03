use crate::ingest::classify::Category;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

pub const INGEST_LAYOUT: &str = "<raw_root>/<year>/<download_date>/<device_id>/<Category>/...";

/// One file copied off the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub category: Category,
    pub source_path: String,
    pub source_relpath: String,
    pub dest_path: String,
    pub dest_relpath: String,
    pub bytes: u64,
    pub mtime_utc: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub device_id: String,
    pub mtp_uri: Option<String>,
    pub mtp_host: Option<String>,
    pub gvfs_mount: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationSection {
    pub dest_base: String,
    pub layout: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestCounts {
    pub planned: Option<i64>,
    pub copied: Option<i64>,
    pub records: Option<i64>,
}

/// `manifest.json` written next to an ingest. Every field defaults so that an
/// incomplete document can still be read and checked by the importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestManifest {
    pub ingest_utc: String,
    pub device: DeviceSection,
    pub destination: DestinationSection,
    pub counts: IngestCounts,
    pub files: Vec<ImportedFile>,
}

/// File entry as read back by the importer; tolerant of missing fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportedFile {
    pub category: Option<String>,
    pub source_path: Option<String>,
    pub source_relpath: Option<String>,
    pub dest_path: Option<String>,
    pub dest_relpath: Option<String>,
    pub bytes: i64,
    pub mtime_utc: Option<String>,
    pub sha256: Option<String>,
}

impl From<&FileRecord> for ImportedFile {
    fn from(r: &FileRecord) -> Self {
        Self {
            category: Some(r.category.to_string()),
            source_path: Some(r.source_path.clone()),
            source_relpath: Some(r.source_relpath.clone()),
            dest_path: Some(r.dest_path.clone()),
            dest_relpath: Some(r.dest_relpath.clone()),
            bytes: r.bytes as i64,
            mtime_utc: Some(r.mtime_utc.clone()),
            sha256: Some(r.sha256.clone()),
        }
    }
}

const CSV_HEADER: [&str; 8] = [
    "category",
    "source_path",
    "source_relpath",
    "dest_path",
    "dest_relpath",
    "bytes",
    "mtime_utc",
    "sha256",
];

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// RFC 4180 CSV of the records, header first, CRLF line endings.
pub fn render_csv(records: &[FileRecord]) -> String {
    let mut out = CSV_HEADER.join(",");
    out.push_str("\r\n");
    for r in records {
        let row = [
            r.category.as_str().to_string(),
            r.source_path.clone(),
            r.source_relpath.clone(),
            r.dest_path.clone(),
            r.dest_relpath.clone(),
            r.bytes.to_string(),
            r.mtime_utc.clone(),
            r.sha256.clone(),
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        let _ = write!(out, "{}\r\n", fields.join(","));
    }
    out
}

/// `sha256sum`-compatible lines: `<digest>  <dest_relpath>`.
pub fn render_checksums(records: &[FileRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}  {}\n", r.sha256, r.dest_relpath))
        .collect()
}
