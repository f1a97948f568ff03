//! Layered configuration for gpsmax.
//!
//! Precedence for any value, lowest to highest:
//! 1. Hard defaults (`~/GPS/_raw`, `~/GPS/_work`, `~/GPS/_db/gps.sqlite`)
//! 2. Repo config: `<repo_root>/config/config.toml`
//! 3. User config: `<user config dir>/gpsmax/config.toml`
//! 4. Environment variables (`GPSMAX_*`)
//! 5. CLI arguments (only the raw and work roots)
//!
//! Missing files are treated as empty. A file that exists but is not valid TOML
//! is a [`ConfigError`]. Everything is parsed once into typed structs; values of
//! the wrong type fall back to their defaults instead of failing.

use crate::constants::{
    DEFAULT_ACTIVITY, DEFAULT_NAME_TEMPLATE, DEFAULT_PRESET, ENV_DB_ROOT, ENV_RAW_ROOT,
    ENV_RUNTIME_ROOT, ENV_SQLITE_PATH, ENV_WORK_ROOT,
};
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const RUNTIME_ROOT: &str = "paths.runtime_root";
const RAW_ROOT: &str = "paths.raw_root";
const WORK_ROOT: &str = "paths.work_root";
const DB_ROOT: &str = "paths.db_root";
const SQLITE_PATH: &str = "db.sqlite_path";

/// Defaults applied to per-file normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub activity: String,
    pub geotag_candidate: bool,
    pub name_template: String,
    pub slugify_title: bool,
    pub title_from_filename_if_missing: bool,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            activity: DEFAULT_ACTIVITY.to_string(),
            geotag_candidate: false,
            name_template: DEFAULT_NAME_TEMPLATE.to_string(),
            slugify_title: true,
            title_from_filename_if_missing: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    pub default_preset: String,
    pub prompt_only_missing: bool,
    pub presets: BTreeMap<String, Preset>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert(DEFAULT_PRESET.to_string(), Preset::default());
        Self {
            default_preset: DEFAULT_PRESET.to_string(),
            prompt_only_missing: true,
            presets,
        }
    }
}

impl NormalizeConfig {
    /// Requested preset, then the configured default, then `"default"`, then the built-in.
    pub fn preset(&self, name: Option<&str>) -> Preset {
        name.and_then(|n| self.presets.get(n))
            .or_else(|| self.presets.get(&self.default_preset))
            .or_else(|| self.presets.get(DEFAULT_PRESET))
            .cloned()
            .unwrap_or_default()
    }

    /// Name of the preset [`NormalizeConfig::preset`] would pick, for logging.
    pub fn preset_name<'a>(&'a self, name: Option<&'a str>) -> &'a str {
        match name {
            Some(n) if self.presets.contains_key(n) => n,
            _ if self.presets.contains_key(&self.default_preset) => &self.default_preset,
            _ => DEFAULT_PRESET,
        }
    }
}

/// Fully merged, read-only configuration for one run.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub runtime_root: PathBuf,
    pub raw_root: PathBuf,
    pub work_root: PathBuf,
    pub db_root: PathBuf,
    pub db_path: PathBuf,
    pub normalize: NormalizeConfig,
    /// Where each value came from: `default`, `repo:<path>`, `user:<path>`, `env:<VAR>` or `cli`.
    pub provenance: BTreeMap<String, String>,
}

/// Inputs to [`resolve`]. Built from the real environment by [`ConfigSources::discover`];
/// tests construct it directly.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub home: PathBuf,
    pub repo_config: Option<PathBuf>,
    pub user_config: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl ConfigSources {
    pub fn discover() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let repo_config = std::env::current_dir()
            .ok()
            .and_then(|cwd| find_repo_root(&cwd))
            .map(|root| root.join("config").join("config.toml"));
        let user_config = dirs::config_dir().map(|d| d.join("gpsmax").join("config.toml"));
        let env = crate::constants::config_env_vars()
            .into_iter()
            .filter_map(|var| std::env::var(var).ok().map(|v| (var.to_string(), v)))
            .collect();
        Self {
            home,
            repo_config,
            user_config,
            env,
        }
    }
}

/// Walk upward from `start`; the first directory holding a `config/` folder is the repo root.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|p| p.join("config").is_dir())
        .map(Path::to_path_buf)
}

/// Resolve configuration from the process environment and the standard file locations.
pub fn load_config(
    cli_raw_root: Option<&Path>,
    cli_work_root: Option<&Path>,
) -> Result<EffectiveConfig, ConfigError> {
    resolve(&ConfigSources::discover(), cli_raw_root, cli_work_root)
}

pub fn resolve(
    sources: &ConfigSources,
    cli_raw_root: Option<&Path>,
    cli_work_root: Option<&Path>,
) -> Result<EffectiveConfig, ConfigError> {
    let repo = load_file(sources.repo_config.as_deref())?;
    let user = load_file(sources.user_config.as_deref())?;

    let mut provenance: BTreeMap<String, String> = [
        RUNTIME_ROOT,
        RAW_ROOT,
        WORK_ROOT,
        DB_ROOT,
        SQLITE_PATH,
        "normalize.default_preset",
        "normalize.prompt_only_missing",
        "normalize.presets",
    ]
    .iter()
    .map(|k| (k.to_string(), "default".to_string()))
    .collect();

    let mut explicit: BTreeMap<&'static str, PathBuf> = BTreeMap::new();
    let mut normalize = NormalizeConfig::default();

    let layers = [
        (repo, sources.repo_config.as_deref(), "repo"),
        (user, sources.user_config.as_deref(), "user"),
    ];
    for (file, path, kind) in layers {
        let Some(file) = file else { continue };
        let label = format!("{}:{}", kind, path.map(|p| p.display().to_string()).unwrap_or_default());

        for (key, value) in file.path_entries() {
            if let Some(value) = value {
                explicit.insert(key, expand_tilde(&value, &sources.home));
                provenance.insert(key.to_string(), label.clone());
            }
        }
        file.normalize.apply(&mut normalize, &mut provenance, &label);
    }

    let env_map = [
        (ENV_RUNTIME_ROOT, RUNTIME_ROOT),
        (ENV_RAW_ROOT, RAW_ROOT),
        (ENV_WORK_ROOT, WORK_ROOT),
        (ENV_DB_ROOT, DB_ROOT),
        (ENV_SQLITE_PATH, SQLITE_PATH),
    ];
    for (var, key) in env_map {
        match sources.env.get(var) {
            Some(v) if !v.trim().is_empty() => {
                explicit.insert(key, expand_tilde(Path::new(v), &sources.home));
                provenance.insert(key.to_string(), format!("env:{}", var));
            }
            _ => {}
        }
    }

    for (key, value) in [(RAW_ROOT, cli_raw_root), (WORK_ROOT, cli_work_root)] {
        if let Some(value) = value {
            explicit.insert(key, expand_tilde(value, &sources.home));
            provenance.insert(key.to_string(), "cli".to_string());
        }
    }

    // Sub-roots that were not set explicitly derive from the runtime root.
    let runtime_root = explicit
        .remove(RUNTIME_ROOT)
        .unwrap_or_else(|| sources.home.join("GPS"));
    let raw_root = explicit
        .remove(RAW_ROOT)
        .unwrap_or_else(|| runtime_root.join("_raw"));
    let work_root = explicit
        .remove(WORK_ROOT)
        .unwrap_or_else(|| runtime_root.join("_work"));
    let db_root = explicit
        .remove(DB_ROOT)
        .unwrap_or_else(|| runtime_root.join("_db"));
    let db_path = explicit
        .remove(SQLITE_PATH)
        .unwrap_or_else(|| db_root.join("gps.sqlite"));

    normalize
        .presets
        .entry(DEFAULT_PRESET.to_string())
        .or_insert_with(Preset::default);

    debug!(?provenance, "Resolved configuration");

    Ok(EffectiveConfig {
        runtime_root,
        raw_root,
        work_root,
        db_root,
        db_path,
        normalize,
        provenance,
    })
}

fn load_file(path: Option<&Path>) -> Result<Option<ConfigFile>, ConfigError> {
    let Some(path) = path else { return Ok(None) };
    if !path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(file))
}

pub fn expand_tilde(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// On-disk TOML shape
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    paths: PathsSection,
    db: DbSection,
    normalize: NormalizeSection,
}

impl ConfigFile {
    fn path_entries(&self) -> [(&'static str, Option<PathBuf>); 5] {
        [
            (RUNTIME_ROOT, self.paths.runtime_root.clone()),
            (RAW_ROOT, self.paths.raw_root.clone()),
            (WORK_ROOT, self.paths.work_root.clone()),
            (DB_ROOT, self.paths.db_root.clone()),
            (SQLITE_PATH, self.db.sqlite_path.clone()),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
struct PathsSection {
    #[serde(default, deserialize_with = "lenient_path")]
    runtime_root: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient_path")]
    raw_root: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient_path")]
    work_root: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient_path")]
    db_root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct DbSection {
    #[serde(default, deserialize_with = "lenient_path")]
    sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct NormalizeSection {
    #[serde(default, deserialize_with = "lenient_string")]
    default_preset: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    prompt_only_missing: Option<bool>,
    #[serde(default)]
    presets: BTreeMap<String, toml::Value>,
}

impl NormalizeSection {
    fn apply(
        self,
        target: &mut NormalizeConfig,
        provenance: &mut BTreeMap<String, String>,
        label: &str,
    ) {
        if let Some(name) = self.default_preset {
            target.default_preset = name;
            provenance.insert("normalize.default_preset".to_string(), label.to_string());
        }
        if let Some(flag) = self.prompt_only_missing {
            target.prompt_only_missing = flag;
            provenance.insert("normalize.prompt_only_missing".to_string(), label.to_string());
        }
        if !self.presets.is_empty() {
            provenance.insert("normalize.presets".to_string(), label.to_string());
        }
        for (name, block) in self.presets {
            // A preset that is not a table still exists, with every field defaulted.
            let raw = block.try_into::<PresetSection>().unwrap_or_default();
            target.presets.insert(name, raw.into_preset());
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PresetSection {
    #[serde(default, deserialize_with = "lenient_string")]
    activity: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    geotag_candidate: Option<bool>,
    #[serde(default, deserialize_with = "lenient_string")]
    name_template: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    slugify_title: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    title_from_filename_if_missing: Option<bool>,
}

impl PresetSection {
    fn into_preset(self) -> Preset {
        let defaults = Preset::default();
        Preset {
            activity: self.activity.unwrap_or(defaults.activity),
            geotag_candidate: self.geotag_candidate.unwrap_or(defaults.geotag_candidate),
            name_template: self.name_template.unwrap_or(defaults.name_template),
            slugify_title: self.slugify_title.unwrap_or(defaults.slugify_title),
            title_from_filename_if_missing: self
                .title_from_filename_if_missing
                .unwrap_or(defaults.title_from_filename_if_missing),
        }
    }
}

fn coerce_bool(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::Integer(i) => Some(*i != 0),
        toml::Value::Float(f) => Some(*f != 0.0),
        toml::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "on" => Some(true),
            "false" | "no" | "n" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(Option::<toml::Value>::deserialize(d)?.as_ref().and_then(coerce_bool))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<toml::Value>::deserialize(d)?.as_ref().and_then(coerce_string))
}

fn lenient_path<'de, D: Deserializer<'de>>(d: D) -> Result<Option<PathBuf>, D::Error> {
    Ok(Option::<toml::Value>::deserialize(d)?
        .and_then(|v| v.as_str().map(PathBuf::from)))
}
