//! Normalization of archived GPX files into the working tree.
//!
//! Per file: intent resolution, naming and collision handling, structural
//! normalization, sidecar. Once per run: the manifest.

pub mod intent;
pub mod naming;
pub mod orchestrator;
pub mod sidecar;

pub use intent::{resolve_intent, GeotagOverride, IntentOverrides, Prompting, TrackIntent};
pub use naming::{choose_output_slug, render_name, slugify, validate_template, NameContext};
pub use orchestrator::{
    list_gpx_candidates, FileOutcome, FileState, NormalizeRun, RunOptions, RunStatus, RunSummary,
};
pub use sidecar::{
    build_manifest, build_sidecar, write_json, ManifestDoc, NormalizedArtifact, RunInfo, SidecarDoc,
};
