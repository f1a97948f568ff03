use std::path::PathBuf;
use thiserror::Error;

/// Configuration could not be loaded. Always fatal: raised before any file is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A name template referenced something outside `{date}`, `{title}`, `{activity}`, `{device}`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown placeholder '{{{placeholder}}}' in name_template {template:?}. Valid: {{date}}, {{title}}, {{activity}}, {{device}}.")]
    UnknownPlaceholder { placeholder: String, template: String },

    #[error("Malformed name_template {template:?}: {reason}")]
    Malformed { template: String, reason: String },
}

/// The source document is not well-formed XML or is not a GPX document.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("XML is not well-formed at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("Document bytes do not match its declared encoding")]
    Encoding,

    #[error("Unsupported document encoding {0:?}")]
    UnknownEncoding(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Unexpected content after the root element")]
    TrailingContent,

    #[error("Root element is <{0}>, expected <gpx>")]
    NotGpx(String),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No MTP device found: {0}")]
    NoDevice(String),

    #[error("Failed to run '{command}': {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Mount path does not exist: {}", .0.display())]
    MountMissing(PathBuf),
}

#[derive(Error, Debug)]
pub enum PickerError {
    #[error("{0} not found on PATH")]
    NotFound(String),

    #[error("Picker failed: {0}")]
    Failed(String),

    #[error("I/O error while talking to picker: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GpsmaxError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Invalid GPX: {0}")]
    Format(#[from] FormatError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Picker(#[from] PickerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid JSON Schema: {0}")]
    Schema(String),

    #[error("Failed to write manifest '{}': {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, GpsmaxError>;
