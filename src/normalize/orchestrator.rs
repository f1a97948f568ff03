use crate::app::ports::Prompter;
use crate::config::EffectiveConfig;
use crate::constants::TOOL_VERSION;
use crate::error::{GpsmaxError, Result};
use crate::formats::gpx::{normalize, NormalizeOptions};
use crate::hashing::sha256_file;
use crate::normalize::intent::{resolve_intent, IntentOverrides, Prompting, TrackIntent};
use crate::normalize::naming::{choose_output_slug, render_name, slugify, validate_template, NameContext};
use crate::normalize::sidecar::{
    build_manifest, build_sidecar, write_json, ManifestDoc, NormalizedArtifact, RunInfo,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Per-file progress. Terminal states are `Recorded`, `Skipped` and `Failed`;
/// a dry run stops at `SlugChosen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Selected,
    IntentResolved,
    SlugChosen,
    Normalized,
    SidecarWritten,
    Recorded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub source: PathBuf,
    pub state: FileState,
    /// Where the normalized GPX goes (or went), once a slug was chosen.
    pub normalized_path: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// At least one file recorded, or a dry run produced a plan.
    Normalized,
    NoneNormalized,
    NothingSelected,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Normalized => 0,
            RunStatus::NoneNormalized => 1,
            RunStatus::NothingSelected => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub outcomes: Vec<FileOutcome>,
    pub artifacts: Vec<NormalizedArtifact>,
    pub manifest_path: Option<PathBuf>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub preset: Option<String>,
    pub overrides: IntentOverrides,
    /// `--prompt`
    pub prompt: bool,
    pub dry_run: bool,
    pub normalize: NormalizeOptions,
}

/// Normalizes a selection of archived GPX files into the working tree.
pub struct NormalizeRun {
    config: EffectiveConfig,
    prompter: Option<Box<dyn Prompter>>,
}

struct Planned {
    out_dir: PathBuf,
    normalized_path: PathBuf,
    sidecar_path: PathBuf,
}

impl NormalizeRun {
    pub fn new(config: EffectiveConfig) -> Self {
        Self {
            config,
            prompter: None,
        }
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn run(&mut self, selected: &[PathBuf], options: &RunOptions) -> Result<RunSummary> {
        let preset_name = self
            .config
            .normalize
            .preset_name(options.preset.as_deref())
            .to_string();
        let preset = self.config.normalize.preset(options.preset.as_deref());
        validate_template(&preset.name_template)?;

        let started = Utc::now();
        let run_id = run_id(started);

        if selected.is_empty() {
            info!("No files selected");
            return Ok(RunSummary {
                run_id,
                outcomes: Vec::new(),
                artifacts: Vec::new(),
                manifest_path: None,
                status: RunStatus::NothingSelected,
            });
        }

        info!(
            run_id = %run_id,
            preset = %preset_name,
            files = selected.len(),
            dry_run = options.dry_run,
            "Starting normalization run"
        );

        let prompt_enabled = options.prompt || !self.config.normalize.prompt_only_missing;
        if prompt_enabled && self.prompter.is_none() {
            warn!("Prompting requested but no prompter is available; using resolved defaults");
        }

        let mut outcomes = Vec::with_capacity(selected.len());
        let mut artifacts = Vec::new();

        for source in selected {
            // Sidecars and manifests record absolute paths; a missing file stays as given.
            let source = &source.canonicalize().unwrap_or_else(|_| source.clone());
            let mut outcome = FileOutcome {
                source: source.clone(),
                state: FileState::Selected,
                normalized_path: None,
                error: None,
            };

            if !source.is_file() {
                warn!(path = %source.display(), "Not a regular file, skipping");
                outcome.state = FileState::Skipped;
                outcomes.push(outcome);
                continue;
            }

            let prompting = match self.prompter.as_deref_mut() {
                Some(prompter) if prompt_enabled => Some(Prompting {
                    prompter,
                    only_missing: self.config.normalize.prompt_only_missing,
                }),
                _ => None,
            };

            let intent = match resolve_intent(
                source,
                &self.config.raw_root,
                &options.overrides,
                &preset,
                prompting,
            ) {
                Ok(intent) => intent,
                Err(e) => {
                    fail(&mut outcome, &e);
                    outcomes.push(outcome);
                    continue;
                }
            };
            outcome.state = FileState::IntentResolved;

            let name = render_name(
                &preset.name_template,
                &NameContext {
                    date: &intent.date_key,
                    title: &intent.title,
                    activity: &intent.activity,
                    device: &intent.device_id,
                },
            )?;
            let out_parent = self
                .config
                .work_root
                .join(intent.year())
                .join(&intent.date_key)
                .join(&intent.device_id);
            let slug = match choose_output_slug(&slugify(&name), &out_parent, source) {
                Ok(slug) => slug,
                Err(e) => {
                    fail(&mut outcome, &GpsmaxError::Io(e));
                    outcomes.push(outcome);
                    continue;
                }
            };
            let out_dir = out_parent.join(&slug);
            let planned = Planned {
                normalized_path: out_dir.join(format!("{}.gpx", slug)),
                sidecar_path: out_dir.join(format!("{}.sidecar.json", slug)),
                out_dir,
            };
            outcome.state = FileState::SlugChosen;
            outcome.normalized_path = Some(planned.normalized_path.clone());

            if options.dry_run {
                info!(
                    source = %source.display(),
                    gpx = %planned.normalized_path.display(),
                    sidecar = %planned.sidecar_path.display(),
                    "Plan"
                );
                outcomes.push(outcome);
                continue;
            }

            match write_outputs(source, &intent, &planned, &options.normalize, &mut outcome) {
                Ok(artifact) => {
                    info!(
                        source = %source.display(),
                        gpx = %artifact.normalized_path.display(),
                        "Normalized"
                    );
                    outcome.state = FileState::Recorded;
                    artifacts.push(artifact);
                }
                Err(e) => fail(&mut outcome, &e),
            }
            outcomes.push(outcome);
        }

        if options.dry_run {
            let status = if outcomes.iter().any(|o| o.state == FileState::SlugChosen) {
                RunStatus::Normalized
            } else {
                RunStatus::NoneNormalized
            };
            return Ok(RunSummary {
                run_id,
                outcomes,
                artifacts,
                manifest_path: None,
                status,
            });
        }

        let run = RunInfo {
            run_id: run_id.clone(),
            started_utc: utc_timestamp(started),
            finished_utc: utc_timestamp(Utc::now()),
            raw_root: self.config.raw_root.clone(),
            work_root: self.config.work_root.clone(),
            tool_version: TOOL_VERSION.to_string(),
            preset: preset_name,
        };
        let manifest_path = self
            .config
            .work_root
            .join("manifests")
            .join(format!("normalize_{}.json", run_id));
        let manifest = build_manifest(&artifacts, run);

        if let Err(e) = write_manifest(&manifest_path, &manifest) {
            for artifact in &artifacts {
                error!(
                    gpx = %artifact.normalized_path.display(),
                    sidecar = %artifact.sidecar_path.display(),
                    "Written but not recorded in a manifest"
                );
            }
            return Err(e);
        }
        info!(path = %manifest_path.display(), tracks = artifacts.len(), "Wrote normalization manifest");

        let status = if artifacts.is_empty() {
            RunStatus::NoneNormalized
        } else {
            RunStatus::Normalized
        };
        Ok(RunSummary {
            run_id,
            outcomes,
            artifacts,
            manifest_path: Some(manifest_path),
            status,
        })
    }
}

fn fail(outcome: &mut FileOutcome, err: &GpsmaxError) {
    error!(path = %outcome.source.display(), error = %err, "Failed to normalize");
    outcome.state = FileState::Failed;
    outcome.error = Some(err.to_string());
}

/// Normalize, hash and write the sidecar. On failure, files this call created are removed.
fn write_outputs(
    source: &Path,
    intent: &TrackIntent,
    planned: &Planned,
    options: &NormalizeOptions,
    outcome: &mut FileOutcome,
) -> Result<NormalizedArtifact> {
    let dir_existed = planned.out_dir.exists();
    let gpx_existed = planned.normalized_path.exists();

    let result = produce_outputs(source, intent, planned, options, outcome);
    if result.is_err() {
        if !gpx_existed && planned.normalized_path.exists() {
            debug!(path = %planned.normalized_path.display(), "Removing orphaned GPX");
            let _ = fs::remove_file(&planned.normalized_path);
        }
        if !dir_existed {
            let _ = fs::remove_dir(&planned.out_dir);
        }
    }
    result
}

fn produce_outputs(
    source: &Path,
    intent: &TrackIntent,
    planned: &Planned,
    options: &NormalizeOptions,
    outcome: &mut FileOutcome,
) -> Result<NormalizedArtifact> {
    let stats = normalize(source, &planned.normalized_path, &intent.title, options)?;
    outcome.state = FileState::Normalized;

    let artifact = NormalizedArtifact {
        source_path: source.to_path_buf(),
        source_sha256: sha256_file(source)?,
        normalized_path: planned.normalized_path.clone(),
        normalized_sha256: sha256_file(&planned.normalized_path)?,
        sidecar_path: planned.sidecar_path.clone(),
        title: intent.title.clone(),
        activity: intent.activity.clone(),
        geotag_candidate: intent.geotag_candidate,
        photos_pending: intent.photos_pending,
        device_id: intent.device_id.clone(),
        date: intent.date_key.clone(),
        notes: intent.notes.clone(),
        normalized_utc: utc_timestamp(Utc::now()),
    };

    let sidecar = build_sidecar(&artifact, &stats, &intent.notes, options);
    write_json(&planned.sidecar_path, &sidecar)?;
    outcome.state = FileState::SidecarWritten;
    Ok(artifact)
}

fn write_manifest(path: &Path, manifest: &ManifestDoc) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| GpsmaxError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }
    write_json(path, manifest).map_err(|e| match e {
        GpsmaxError::Io(source) => GpsmaxError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// `YYYYMMDDTHHMMSS<micros>Z`
pub fn run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%6fZ").to_string()
}

fn utc_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Every `*.gpx` regular file under `root`, sorted. A missing root yields nothing.
pub fn list_gpx_candidates(root: &Path) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }
    let mut out: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"))
        })
        .map(|entry| entry.into_path())
        .collect();
    out.sort();
    out
}
