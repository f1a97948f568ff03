//! Sidecar and run-manifest documents. Assembly is pure; [`write_json`] is the only I/O.

use crate::constants::{NORMALIZATION_MANIFEST_SCHEMA, SIDECAR_SCHEMA, TOOL_NAME, TOOL_VERSION};
use crate::error::Result;
use crate::formats::gpx::{NormalizeOptions, NormalizeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One successfully normalized file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedArtifact {
    pub source_path: PathBuf,
    pub source_sha256: String,
    pub normalized_path: PathBuf,
    pub normalized_sha256: String,
    pub sidecar_path: PathBuf,
    pub title: String,
    pub activity: String,
    pub geotag_candidate: bool,
    pub photos_pending: bool,
    pub device_id: String,
    pub date: String,
    pub notes: String,
    pub normalized_utc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    fn current() -> Self {
        Self {
            name: TOOL_NAME.to_string(),
            version: TOOL_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub normalized_gpx: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeotagState {
    pub candidate: bool,
    pub photos_pending: bool,
}

/// Which structural operations were enabled for the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decisions {
    pub set_metadata_name: bool,
    pub set_trk_name: bool,
    pub ensure_metadata_time: bool,
    pub pretty_print: bool,
}

impl From<&NormalizeOptions> for Decisions {
    fn from(options: &NormalizeOptions) -> Self {
        Self {
            set_metadata_name: options.set_metadata_name,
            set_trk_name: options.set_trk_name,
            ensure_metadata_time: options.ensure_metadata_time,
            pretty_print: options.pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarDoc {
    pub schema: String,
    pub created_utc: String,
    pub tool: ToolInfo,
    pub source: SourceRef,
    pub output: OutputRef,
    pub title: String,
    pub activity: String,
    pub geotag: GeotagState,
    pub gpx_stats: NormalizeResult,
    pub notes: String,
    pub decisions: Decisions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub started_utc: String,
    pub finished_utc: String,
    pub raw_root: PathBuf,
    pub work_root: PathBuf,
    pub tool_version: String,
    pub preset: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCounts {
    pub tracks: usize,
    pub by_activity: BTreeMap<String, usize>,
    pub geotag_candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDoc {
    pub schema: String,
    pub run: RunInfo,
    pub counts: ManifestCounts,
    pub artifacts: Vec<NormalizedArtifact>,
}

pub fn build_sidecar(
    artifact: &NormalizedArtifact,
    stats: &NormalizeResult,
    notes: &str,
    options: &NormalizeOptions,
) -> SidecarDoc {
    SidecarDoc {
        schema: SIDECAR_SCHEMA.to_string(),
        created_utc: artifact.normalized_utc.clone(),
        tool: ToolInfo::current(),
        source: SourceRef {
            path: artifact.source_path.clone(),
            sha256: artifact.source_sha256.clone(),
        },
        output: OutputRef {
            normalized_gpx: artifact.normalized_path.clone(),
            sha256: artifact.normalized_sha256.clone(),
        },
        title: artifact.title.clone(),
        activity: artifact.activity.clone(),
        geotag: GeotagState {
            candidate: artifact.geotag_candidate,
            photos_pending: artifact.photos_pending,
        },
        gpx_stats: stats.clone(),
        notes: notes.to_string(),
        decisions: Decisions::from(options),
    }
}

pub fn build_manifest(artifacts: &[NormalizedArtifact], run: RunInfo) -> ManifestDoc {
    let mut by_activity = BTreeMap::new();
    for artifact in artifacts {
        *by_activity.entry(artifact.activity.clone()).or_insert(0) += 1;
    }
    ManifestDoc {
        schema: NORMALIZATION_MANIFEST_SCHEMA.to_string(),
        run,
        counts: ManifestCounts {
            tracks: artifacts.len(),
            by_activity,
            geotag_candidates: artifacts.iter().filter(|a| a.geotag_candidate).count(),
        },
        artifacts: artifacts.to_vec(),
    }
}

/// UTF-8 JSON, two-space indent, trailing newline.
pub fn write_json<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(doc)?;
    text.push('\n');
    fs::write(path, text)?;
    Ok(())
}
