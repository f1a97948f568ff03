//! Document schema tags and fixed names shared across the pipeline.
//! These strings end up in files on disk, so changing one is a format change.

pub const TOOL_NAME: &str = "gpsmax-normalize";
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SIDECAR_SCHEMA: &str = "gpsmax.sidecar.v1";
pub const NORMALIZATION_MANIFEST_SCHEMA: &str = "gpsmax.normalization_manifest.v1";

pub const DEFAULT_PRESET: &str = "default";
pub const DEFAULT_ACTIVITY: &str = "unknown";
pub const DEFAULT_NAME_TEMPLATE: &str = "{date}_{title}";
pub const DEFAULT_TITLE: &str = "untitled";
pub const UNKNOWN_DEVICE: &str = "unknown";
pub const SLUG_FALLBACK: &str = "track";

// Environment overrides (highest non-CLI precedence)
pub const ENV_RUNTIME_ROOT: &str = "GPSMAX_RUNTIME_ROOT";
pub const ENV_RAW_ROOT: &str = "GPSMAX_RAW_ROOT";
pub const ENV_WORK_ROOT: &str = "GPSMAX_WORK_ROOT";
pub const ENV_DB_ROOT: &str = "GPSMAX_DB_ROOT";
pub const ENV_SQLITE_PATH: &str = "GPSMAX_SQLITE_PATH";

/// All env vars the config resolver looks at, in application order.
pub fn config_env_vars() -> Vec<&'static str> {
    vec![
        ENV_RUNTIME_ROOT,
        ENV_RAW_ROOT,
        ENV_WORK_ROOT,
        ENV_DB_ROOT,
        ENV_SQLITE_PATH,
    ]
}
