use gpsmax::config::{EffectiveConfig, NormalizeConfig};
use gpsmax::normalize::{NormalizeRun, RunOptions};
use gpsmax::schema::{compile_str, violations, MANIFEST_V1, SIDECAR_V1};
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;

fn sidecar_schema() -> JSONSchema {
    compile_str(SIDECAR_V1).unwrap()
}

fn manifest_schema() -> JSONSchema {
    compile_str(MANIFEST_V1).unwrap()
}

/// Run one real normalization and return (sidecar, manifest).
fn produced_documents() -> (Value, Value) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let device = root.join("_raw/2026/2026-01-03/gpsmap67/Current");
    fs::create_dir_all(&device).unwrap();
    let source = device.join("Current.gpx");
    fs::write(
        &source,
        r#"<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1"><trk><trkseg>
<trkpt lat="1" lon="2"><time>2026-01-02T08:00:00.500Z</time></trkpt>
</trkseg></trk></gpx>"#,
    )
    .unwrap();

    let config = EffectiveConfig {
        runtime_root: root.to_path_buf(),
        raw_root: root.join("_raw"),
        work_root: root.join("_work"),
        db_root: root.join("_db"),
        db_path: root.join("_db/gps.sqlite"),
        normalize: NormalizeConfig::default(),
        provenance: BTreeMap::new(),
    };
    let summary = NormalizeRun::new(config)
        .run(&[source], &RunOptions::default())
        .unwrap();

    let read = |p: &std::path::Path| -> Value {
        serde_json::from_str(&fs::read_to_string(p).unwrap()).unwrap()
    };
    (
        read(&summary.artifacts[0].sidecar_path),
        read(summary.manifest_path.as_ref().unwrap()),
    )
}

#[test]
fn written_documents_match_their_schemas() {
    let (sidecar, manifest) = produced_documents();
    assert_eq!(violations(&sidecar_schema(), &sidecar), Vec::<String>::new());
    assert_eq!(violations(&manifest_schema(), &manifest), Vec::<String>::new());
}

#[test]
fn fractional_first_time_is_canonical_in_sidecar() {
    let (sidecar, _) = produced_documents();
    assert_eq!(sidecar["gpx_stats"]["first_time_utc"], "2026-01-02T08:00:00Z");
}

#[test]
fn bad_digest_is_rejected() {
    let (mut sidecar, _) = produced_documents();
    sidecar["source"]["sha256"] = json!("NOTAHEX");
    let problems = violations(&sidecar_schema(), &sidecar);
    assert_eq!(problems.len(), 1);
    assert!(problems[0].ends_with(" at /source/sha256"), "{}", problems[0]);
}

#[test]
fn unknown_fields_are_rejected() {
    let (mut sidecar, mut manifest) = produced_documents();
    sidecar["extra"] = json!(true);
    assert!(!sidecar_schema().is_valid(&sidecar));

    manifest["counts"]["tracks"] = json!(-1);
    assert!(!manifest_schema().is_valid(&manifest));
}

#[test]
fn schema_tags_are_not_interchangeable() {
    let (sidecar, manifest) = produced_documents();
    assert!(!manifest_schema().is_valid(&sidecar));
    assert!(!sidecar_schema().is_valid(&manifest));
}
