//! Copy GPX files off a mounted device into the dated, write-once archive.
//!
//! Layout: `<raw_root>/<year>/<download_date>/<device_id>/<Category>/...`, plus
//! `checksums.sha256`, `manifest.json` and optionally `manifest.csv` in the
//! device directory. The device tree is only read.

pub mod classify;
pub mod garmin;
pub mod manifest;

pub use classify::{classify_gpx, iter_gpx_files, Category, Classification};
pub use garmin::derive_device_id;
pub use manifest::{FileRecord, ImportedFile, IngestManifest};

use crate::app::ports::MountInfo;
use crate::error::Result;
use crate::hashing::sha256_file;
use crate::normalize::sidecar::write_json;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use manifest::{
    render_checksums, render_csv, DestinationSection, DeviceSection, IngestCounts, INGEST_LAYOUT,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Defaults to the current local year.
    pub year: Option<String>,
    /// `YYYY-MM-DD`; defaults to today (local).
    pub download_date: Option<String>,
    pub write_csv: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub category: Category,
    pub source: PathBuf,
    pub source_relpath: String,
    pub dest: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub dest_base: PathBuf,
    pub planned: Vec<PlannedCopy>,
    pub records: Vec<FileRecord>,
    pub skipped_identical: usize,
    /// Set when a manifest was written.
    pub manifest_path: Option<PathBuf>,
}

impl IngestReport {
    pub fn copied(&self) -> usize {
        self.records.len()
    }
}

/// Every classifiable GPX file on the mount and where it would land.
pub fn plan_ingest(mount_root: &Path, dest_base: &Path) -> Vec<PlannedCopy> {
    iter_gpx_files(mount_root)
        .into_iter()
        .filter_map(|(source, rel)| match classify_gpx(&rel) {
            Classification::Ingest { category, subpath } => Some(PlannedCopy {
                category,
                dest: dest_base.join(category.as_str()).join(&subpath),
                source,
                source_relpath: rel,
            }),
            Classification::Skip => None,
        })
        .collect()
}

pub fn run_ingest(
    raw_root: &Path,
    mount: &MountInfo,
    device_id: &str,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let today = Local::now();
    let download_date = options
        .download_date
        .clone()
        .unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
    let year = options
        .year
        .clone()
        .unwrap_or_else(|| today.format("%Y").to_string());
    let dest_base = raw_root.join(&year).join(&download_date).join(device_id);
    info!(dest = %dest_base.display(), "Destination base");

    let planned = plan_ingest(&mount.gvfs_mount, &dest_base);
    let mut report = IngestReport {
        dest_base: dest_base.clone(),
        planned,
        records: Vec::new(),
        skipped_identical: 0,
        manifest_path: None,
    };

    if report.planned.is_empty() {
        info!("No GPX files found to ingest");
        return Ok(report);
    }
    if options.dry_run {
        info!(files = report.planned.len(), dest = %dest_base.display(), "Dry run, nothing copied");
        for p in &report.planned {
            debug!(category = %p.category, source = %p.source.display(), dest = %p.dest.display(), "Would copy");
        }
        return Ok(report);
    }

    fs::create_dir_all(&dest_base)?;
    let ingest_utc = timestamp(Utc::now());

    for plan in &report.planned {
        let Some(dest) = resolve_destination(&plan.source, &plan.dest)? else {
            debug!(dest = %plan.dest.display(), "Identical file already archived");
            report.skipped_identical += 1;
            continue;
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_preserving_mtime(&plan.source, &dest)?;

        let meta = fs::metadata(&dest)?;
        let mtime: DateTime<Utc> = meta.modified()?.into();
        let record = FileRecord {
            category: plan.category,
            source_path: plan.source.to_string_lossy().into_owned(),
            source_relpath: plan.source_relpath.clone(),
            dest_path: dest.to_string_lossy().into_owned(),
            dest_relpath: posix_relative(&dest, &dest_base),
            bytes: meta.len(),
            mtime_utc: timestamp(mtime),
            sha256: sha256_file(&dest)?,
        };
        debug!(category = %plan.category, source = %plan.source.display(), dest = %dest.display(), "Copied");
        report.records.push(record);
    }

    if report.records.is_empty() {
        // Keep the manifest describing the ingest that actually copied these files.
        info!(skipped = report.skipped_identical, "Nothing new to ingest");
        return Ok(report);
    }

    fs::write(dest_base.join("checksums.sha256"), render_checksums(&report.records))?;

    let manifest = IngestManifest {
        ingest_utc,
        device: DeviceSection {
            device_id: device_id.to_string(),
            mtp_uri: Some(mount.uri.clone()),
            mtp_host: Some(mount.host.clone()),
            gvfs_mount: Some(mount.gvfs_mount.to_string_lossy().into_owned()),
        },
        destination: DestinationSection {
            dest_base: dest_base.to_string_lossy().into_owned(),
            layout: Some(INGEST_LAYOUT.to_string()),
        },
        counts: IngestCounts {
            planned: Some(report.planned.len() as i64),
            copied: Some(report.records.len() as i64),
            records: Some(report.records.len() as i64),
        },
        files: report.records.iter().map(ImportedFile::from).collect(),
    };
    let manifest_path = dest_base.join("manifest.json");
    write_json(&manifest_path, &manifest)?;

    if options.write_csv {
        fs::write(dest_base.join("manifest.csv"), render_csv(&report.records))?;
    }

    info!(
        copied = report.records.len(),
        skipped = report.skipped_identical,
        manifest = %manifest_path.display(),
        "Ingest complete"
    );
    report.manifest_path = Some(manifest_path);
    Ok(report)
}

/// Where to copy `source`: `dest` if free, otherwise `<stem>__<sha8><ext>` (then
/// `__<sha12>`). `None` when an identical copy already exists.
fn resolve_destination(source: &Path, dest: &Path) -> Result<Option<PathBuf>> {
    if !dest.exists() {
        return Ok(Some(dest.to_path_buf()));
    }
    let digest = sha256_file(source)?;
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = dest
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let candidates = [
        dest.to_path_buf(),
        dest.with_file_name(format!("{}__{}{}", stem, &digest[..8], ext)),
        dest.with_file_name(format!("{}__{}{}", stem, &digest[..12], ext)),
    ];
    for candidate in candidates {
        if !candidate.exists() {
            return Ok(Some(candidate));
        }
        if sha256_file(&candidate)? == digest {
            return Ok(None);
        }
    }
    warn!(dest = %dest.display(), "Every candidate name holds different content, skipping");
    Ok(None)
}

fn copy_preserving_mtime(source: &Path, dest: &Path) -> Result<()> {
    let modified = fs::metadata(source)?.modified()?;
    fs::copy(source, dest)?;
    File::options().write(true).open(dest)?.set_modified(modified)?;
    Ok(())
}

fn posix_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}
