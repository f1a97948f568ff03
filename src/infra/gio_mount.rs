use crate::app::ports::{MountInfo, MountOutcome, MountService};
use crate::error::DeviceError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info, warn};

static MTP_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:activation_root|default_location)=(mtp://\S+/)\s*$")
        .expect("MTP URI pattern is valid")
});

/// MTP discovery and mounting through GVFS (`gio mount`).
pub struct GioMountService {
    gvfs_root: PathBuf,
}

impl Default for GioMountService {
    fn default() -> Self {
        Self {
            gvfs_root: gvfs_root(),
        }
    }
}

impl GioMountService {
    pub fn new(gvfs_root: PathBuf) -> Self {
        Self { gvfs_root }
    }
}

/// `$XDG_RUNTIME_DIR/gvfs`, or `/run/user/<uid>/gvfs` when the variable is unset.
pub fn gvfs_root() -> PathBuf {
    if let Some(runtime) = dirs::runtime_dir() {
        return runtime.join("gvfs");
    }
    let uid = current_uid().unwrap_or(1000);
    PathBuf::from(format!("/run/user/{}/gvfs", uid))
}

#[cfg(unix)]
fn current_uid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata("/proc/self").ok().map(|m| m.uid())
}

#[cfg(not(unix))]
fn current_uid() -> Option<u32> {
    None
}

/// First `mtp://…/` activation root or default location in `gio mount -li` output.
pub fn parse_gio_listing(text: &str, gvfs_root: &std::path::Path) -> Option<MountInfo> {
    let uri = MTP_URI_RE.captures(text)?.get(1)?.as_str();
    MountInfo::from_uri(uri, gvfs_root)
}

impl MountService for GioMountService {
    fn discover(&self) -> Result<MountInfo, DeviceError> {
        let output = Command::new("gio")
            .args(["mount", "-li"])
            .output()
            .map_err(|source| DeviceError::Command {
                command: "gio mount -li".to_string(),
                source,
            })?;
        let text = String::from_utf8_lossy(&output.stdout);
        let info = parse_gio_listing(&text, &self.gvfs_root).ok_or_else(|| {
            DeviceError::NoDevice("no MTP mount in `gio mount -li` output".to_string())
        })?;
        info!(uri = %info.uri, mount = %info.gvfs_mount.display(), "Discovered MTP device");
        Ok(info)
    }

    fn ensure(&self, uri: &str) -> Result<MountOutcome, DeviceError> {
        if let Some(info) = MountInfo::from_uri(uri, &self.gvfs_root) {
            if info.gvfs_mount.is_dir() {
                debug!(mount = %info.gvfs_mount.display(), "Already mounted");
                return Ok(MountOutcome::AlreadyMounted);
            }
        }
        let output = Command::new("gio")
            .args(["mount", uri])
            .output()
            .map_err(|source| DeviceError::Command {
                command: format!("gio mount {}", uri),
                source,
            })?;
        if output.status.success() {
            info!(uri, "Mounted");
            Ok(MountOutcome::Mounted)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(uri, error = %stderr, "gio mount failed");
            Ok(MountOutcome::Failed(stderr))
        }
    }
}
