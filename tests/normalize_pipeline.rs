use gpsmax::config::{EffectiveConfig, NormalizeConfig};
use gpsmax::error::GpsmaxError;
use gpsmax::normalize::{FileState, IntentOverrides, NormalizeRun, RunOptions, RunStatus};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MORNING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="GPSMAP 67">
  <trk>
    <trkseg>
      <trkpt lat="47.6062" lon="-122.3321"><ele>56.0</ele><time>2026-01-02T21:14:44Z</time></trkpt>
      <trkpt lat="47.6070" lon="-122.3330"><ele>58.5</ele><time>2026-01-02T21:20:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>
"#;

const EVENING: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="GPSMAP 67">
  <trk>
    <trkseg>
      <trkpt lat="47.6100" lon="-122.3400"><time>2026-01-02T23:00:00Z</time></trkpt>
      <trkpt lat="47.6110" lon="-122.3410"><time>2026-01-02T23:05:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>
"#;

struct Fixture {
    _dir: TempDir,
    device_dir: PathBuf,
    config: EffectiveConfig,
}

impl Fixture {
    fn new() -> Self {
        Self::in_dir(TempDir::new().unwrap())
    }

    fn in_dir(dir: TempDir) -> Self {
        let root = dir.path().to_path_buf();
        let raw_root = root.join("_raw");
        let device_dir = raw_root.join("2026/2026-01-03/gpsmap67/Current");
        fs::create_dir_all(&device_dir).unwrap();
        let config = EffectiveConfig {
            runtime_root: root.clone(),
            raw_root,
            work_root: root.join("_work"),
            db_root: root.join("_db"),
            db_path: root.join("_db/gps.sqlite"),
            normalize: NormalizeConfig::default(),
            provenance: BTreeMap::new(),
        };
        Self {
            _dir: dir,
            device_dir,
            config,
        }
    }

    fn source(&self, name: &str, content: &str) -> PathBuf {
        let path = self.device_dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn out_parent(&self) -> PathBuf {
        self.config.work_root.join("2026/2026-01-02/gpsmap67")
    }

    fn run(&self, files: &[PathBuf], options: &RunOptions) -> gpsmax::normalize::RunSummary {
        NormalizeRun::new(self.config.clone()).run(files, options).unwrap()
    }
}

fn titled(title: &str) -> RunOptions {
    RunOptions {
        overrides: IntentOverrides {
            title: Some(title.to_string()),
            ..IntentOverrides::default()
        },
        ..RunOptions::default()
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn morning_hike_end_to_end() {
    let fx = Fixture::new();
    let source = fx.source("Current.gpx", MORNING);

    let summary = fx.run(&[source.clone()], &titled("Morning Hike"));
    assert_eq!(summary.status, RunStatus::Normalized);
    assert_eq!(summary.status.exit_code(), 0);

    let slug_dir = fx.out_parent().join("20260102_morning_hike");
    let gpx = fs::read_to_string(slug_dir.join("20260102_morning_hike.gpx")).unwrap();
    assert!(gpx.contains("<metadata>\n    <name>Morning Hike</name>\n    <time>2026-01-02T21:14:44Z</time>\n  </metadata>"));
    assert!(gpx.contains("<trk>\n    <name>Morning Hike</name>"));

    let sidecar = read_json(&slug_dir.join("20260102_morning_hike.sidecar.json"));
    assert_eq!(sidecar["schema"], "gpsmax.sidecar.v1");
    assert_eq!(sidecar["gpx_stats"]["trk_count"], 1);
    assert_eq!(sidecar["gpx_stats"]["metadata_time_set"], true);
    assert_eq!(sidecar["gpx_stats"]["first_time_utc"], "2026-01-02T21:14:44Z");
    assert_eq!(
        sidecar["source"]["path"],
        source.canonicalize().unwrap().to_string_lossy().as_ref()
    );

    let manifest = read_json(summary.manifest_path.as_ref().unwrap());
    assert_eq!(manifest["counts"]["tracks"], 1);
    assert_eq!(manifest["artifacts"][0]["device_id"], "gpsmap67");
    assert_eq!(manifest["artifacts"][0]["date"], "2026-01-02");
    assert_eq!(fs::read_to_string(&source).unwrap(), MORNING);
}

#[test]
fn manifest_lists_only_successful_files() {
    let fx = Fixture::new();
    let files = vec![
        fx.source("a.gpx", MORNING),
        fx.source("b.gpx", "<gpx><trk><trkseg>"),
        fx.source("c.gpx", EVENING),
    ];

    let summary = fx.run(&files, &RunOptions::default());
    assert_eq!(summary.status, RunStatus::Normalized);
    let states: Vec<FileState> = summary.outcomes.iter().map(|o| o.state).collect();
    assert_eq!(
        states,
        vec![FileState::Recorded, FileState::Failed, FileState::Recorded]
    );
    assert!(summary.outcomes[1].error.is_some());

    let manifest = read_json(summary.manifest_path.as_ref().unwrap());
    assert_eq!(manifest["counts"]["tracks"], 2);
    let sources: Vec<&str> = manifest["artifacts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["source_path"].as_str().unwrap())
        .collect();
    assert_eq!(sources.len(), 2);
    assert!(sources.iter().all(|s| !s.ends_with("b.gpx")));
}

#[test]
fn all_failures_exit_nonzero() {
    let fx = Fixture::new();
    let bad = fx.source("bad.gpx", "not xml at all");
    let summary = fx.run(&[bad, fx.device_dir.join("missing.gpx")], &RunOptions::default());
    assert_eq!(summary.status, RunStatus::NoneNormalized);
    assert_eq!(summary.status.exit_code(), 1);
    assert_eq!(summary.outcomes[1].state, FileState::Skipped);
}

#[test]
fn different_sources_with_same_name_do_not_overwrite() {
    let fx = Fixture::new();
    let morning = fx.source("a.gpx", MORNING);
    let other = fx.source("b.gpx", &MORNING.replace("47.6070", "47.6071"));

    fx.run(&[morning.clone()], &titled("Morning Hike"));
    let summary = fx.run(&[other.clone()], &titled("Morning Hike"));

    let out = summary.outcomes[0].normalized_path.clone().unwrap();
    let sha = gpsmax::hashing::sha256_file(&other).unwrap();
    assert_eq!(
        out.parent().unwrap().file_name().unwrap().to_string_lossy(),
        format!("20260102_morning_hike__{}", &sha[..8])
    );
    let first = fs::read_to_string(
        fx.out_parent()
            .join("20260102_morning_hike/20260102_morning_hike.gpx"),
    )
    .unwrap();
    assert!(first.contains("47.6070"));
}

#[test]
fn rerun_is_idempotent() {
    let fx = Fixture::new();
    let source = fx.source("Current.gpx", MORNING);
    let first = fx.run(&[source.clone()], &titled("Morning Hike"));
    let gpx_path = first.artifacts[0].normalized_path.clone();
    let before = fs::read(&gpx_path).unwrap();

    let second = fx.run(&[source], &titled("Morning Hike"));
    assert_eq!(second.artifacts[0].normalized_path, gpx_path);
    assert_eq!(fs::read(&gpx_path).unwrap(), before);
    assert_eq!(
        first.artifacts[0].normalized_sha256,
        second.artifacts[0].normalized_sha256
    );
    assert_eq!(fs::read_dir(fx.out_parent()).unwrap().count(), 1);
}

#[test]
fn dry_run_writes_nothing() {
    let fx = Fixture::new();
    let source = fx.source("Current.gpx", MORNING);
    let options = RunOptions {
        dry_run: true,
        ..titled("Morning Hike")
    };
    let summary = fx.run(&[source], &options);
    assert_eq!(summary.status, RunStatus::Normalized);
    assert!(summary.manifest_path.is_none());
    assert_eq!(summary.outcomes[0].state, FileState::SlugChosen);
    assert_eq!(
        summary.outcomes[0].normalized_path,
        Some(
            fx.out_parent()
                .join("20260102_morning_hike/20260102_morning_hike.gpx")
        )
    );
    assert!(!fx.config.work_root.exists());
}

#[test]
fn empty_selection_is_not_an_error() {
    let fx = Fixture::new();
    let summary = fx.run(&[], &RunOptions::default());
    assert_eq!(summary.status, RunStatus::NothingSelected);
    assert_eq!(summary.status.exit_code(), 3);
    assert!(!fx.config.work_root.exists());
}

#[test]
fn bad_template_fails_before_any_file() {
    let mut fx = Fixture::new();
    fx.config
        .normalize
        .presets
        .get_mut("default")
        .unwrap()
        .name_template = "{date}_{bogus}".to_string();
    let source = fx.source("Current.gpx", MORNING);
    let err = NormalizeRun::new(fx.config.clone())
        .run(&[source], &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, GpsmaxError::Template(_)));
    assert!(!fx.config.work_root.exists());
}

#[test]
fn relative_source_paths_are_recorded_absolute() {
    let dir = tempfile::Builder::new().tempdir_in(".").unwrap();
    let fx = Fixture::in_dir(dir);
    assert!(fx.config.raw_root.is_relative());
    let source = fx.source("Current.gpx", MORNING);
    assert!(source.is_relative());

    let summary = fx.run(&[source.clone()], &titled("Morning Hike"));
    assert_eq!(summary.status, RunStatus::Normalized);
    let absolute = source.canonicalize().unwrap();
    assert_eq!(summary.outcomes[0].source, absolute);

    let artifact = &summary.artifacts[0];
    assert!(artifact.source_path.is_absolute());
    assert_eq!(artifact.device_id, "gpsmap67");
    let sidecar = read_json(&artifact.sidecar_path);
    assert_eq!(sidecar["source"]["path"], absolute.to_string_lossy().as_ref());
    let manifest = read_json(summary.manifest_path.as_ref().unwrap());
    assert_eq!(
        manifest["artifacts"][0]["source_path"],
        absolute.to_string_lossy().as_ref()
    );
}

#[test]
fn unwritable_manifest_directory_is_a_manifest_error() {
    let fx = Fixture::new();
    let source = fx.source("Current.gpx", MORNING);
    fs::create_dir_all(&fx.config.work_root).unwrap();
    fs::write(fx.config.work_root.join("manifests"), "not a directory").unwrap();

    let err = NormalizeRun::new(fx.config.clone())
        .run(&[source], &titled("Morning Hike"))
        .unwrap_err();
    assert!(matches!(err, GpsmaxError::ManifestWrite { .. }));
    // Outputs written before the manifest failure stay in place.
    assert!(fx
        .out_parent()
        .join("20260102_morning_hike/20260102_morning_hike.gpx")
        .is_file());
}

#[test]
fn sidecar_failure_removes_gpx_and_run_continues() {
    let fx = Fixture::new();
    let blocked = fx.source("a.gpx", MORNING);
    let good = fx.source("b.gpx", EVENING);

    let plan = fx.run(
        &[blocked.clone()],
        &RunOptions {
            dry_run: true,
            ..RunOptions::default()
        },
    );
    let planned = plan.outcomes[0].normalized_path.clone().unwrap();
    let base = planned
        .parent()
        .unwrap()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();

    // Every slug candidate holds a directory where its sidecar file should go.
    let sha = gpsmax::hashing::sha256_file(&blocked).unwrap();
    let slugs = [
        base.clone(),
        format!("{}__{}", base, &sha[..8]),
        format!("{}__{}", base, &sha[..12]),
    ];
    for slug in &slugs {
        fs::create_dir_all(fx.out_parent().join(slug).join(format!("{}.sidecar.json", slug)))
            .unwrap();
    }

    let summary = fx.run(&[blocked, good.clone()], &RunOptions::default());
    assert_eq!(summary.status, RunStatus::Normalized);
    assert_eq!(summary.outcomes[0].state, FileState::Failed);
    assert!(summary.outcomes[0].error.is_some());
    assert_eq!(summary.outcomes[1].state, FileState::Recorded);

    let chosen = fx.out_parent().join(&slugs[2]);
    assert!(!chosen.join(format!("{}.gpx", slugs[2])).exists());
    assert_eq!(fs::read_dir(&chosen).unwrap().count(), 1);

    let manifest = read_json(summary.manifest_path.as_ref().unwrap());
    assert_eq!(manifest["counts"]["tracks"], 1);
    assert_eq!(
        manifest["artifacts"][0]["source_path"],
        good.canonicalize().unwrap().to_string_lossy().as_ref()
    );
}
