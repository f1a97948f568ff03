//! Bundled JSON Schemas for sidecars and normalization manifests.

use crate::constants::{NORMALIZATION_MANIFEST_SCHEMA, SIDECAR_SCHEMA};
use crate::error::{GpsmaxError, Result};
use jsonschema::JSONSchema;
use serde_json::Value;

pub const SIDECAR_V1: &str = include_str!("../schemas/sidecar.v1.json");
pub const MANIFEST_V1: &str = include_str!("../schemas/normalization_manifest.v1.json");

/// Schema text for a document's `schema` tag.
pub fn bundled_for(tag: &str) -> Option<&'static str> {
    match tag {
        SIDECAR_SCHEMA => Some(SIDECAR_V1),
        NORMALIZATION_MANIFEST_SCHEMA => Some(MANIFEST_V1),
        _ => None,
    }
}

/// Compile a schema document. jsonschema 0.17 borrows the schema for
/// `'static`, so it is leaked; callers compile a handful per process.
pub fn compile(schema: Value) -> Result<JSONSchema> {
    let schema: &'static Value = Box::leak(Box::new(schema));
    JSONSchema::options()
        .compile(schema)
        .map_err(|e| GpsmaxError::Schema(e.to_string()))
}

pub fn compile_str(schema: &str) -> Result<JSONSchema> {
    compile(serde_json::from_str(schema)?)
}

/// Validation failures as `message at /instance/path`; empty when valid.
pub fn violations(schema: &JSONSchema, instance: &Value) -> Vec<String> {
    match schema.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect(),
    }
}
