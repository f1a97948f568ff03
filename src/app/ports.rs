use crate::error::{DeviceError, PickerError};
use std::io;
use std::path::{Path, PathBuf};

/// Interactive selection from a list of files.
pub trait Picker {
    /// Returns the chosen subset in selection order. An empty result means the
    /// operator cancelled; that is not an error.
    fn select(&self, items: &[PathBuf], header: &str) -> Result<Vec<PathBuf>, PickerError>;
}

/// Per-field questions asked during intent resolution.
pub trait Prompter {
    /// Free text with an editable default; an empty answer keeps the default.
    fn prompt_str(&mut self, prompt: &str, default: &str) -> io::Result<String>;
    fn prompt_bool(&mut self, prompt: &str, default: bool) -> io::Result<bool>;
}

/// A device reachable over MTP and where GVFS exposes it locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountInfo {
    pub uri: String,
    pub host: String,
    pub gvfs_mount: PathBuf,
}

impl MountInfo {
    /// Build from an `mtp://<host>/` URI and the per-user GVFS directory.
    pub fn from_uri(uri: &str, gvfs_root: &Path) -> Option<Self> {
        let host = uri
            .strip_prefix("mtp://")?
            .trim_end_matches('/')
            .split('/')
            .next()
            .filter(|h| !h.is_empty())?
            .to_string();
        Some(Self {
            uri: format!("mtp://{}/", host),
            gvfs_mount: gvfs_root.join(format!("mtp:host={}", host)),
            host,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
    Failed(String),
}

pub trait MountService {
    fn discover(&self) -> Result<MountInfo, DeviceError>;
    /// Mount `uri` if needed. Failures are reported in the outcome, not as errors,
    /// because the mount may already be usable.
    fn ensure(&self, uri: &str) -> Result<MountOutcome, DeviceError>;
}
