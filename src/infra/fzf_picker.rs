use crate::app::ports::Picker;
use crate::error::PickerError;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Preview command run by fzf for the highlighted line; `{2}` is the path field.
pub const DEFAULT_PREVIEW: &str = "gpsmax preview {2}";

/// Interactive selection through `fzf`. Items are shown by file name and
/// returned as full paths.
pub struct FzfPicker {
    binary: String,
    multi: bool,
    preview: String,
}

impl Default for FzfPicker {
    fn default() -> Self {
        Self::new("fzf", true)
    }
}

impl FzfPicker {
    pub fn new(binary: impl Into<String>, multi: bool) -> Self {
        Self {
            binary: binary.into(),
            multi,
            preview: DEFAULT_PREVIEW.to_string(),
        }
    }

    /// Use `program preview {2}` as the preview command, e.g. with the path of
    /// the running executable.
    pub fn with_preview_program(mut self, program: &Path) -> Self {
        self.preview = preview_command(program);
        self
    }
}

fn preview_command(program: &Path) -> String {
    let quoted = program.to_string_lossy().replace('\'', r"'\''");
    format!("'{}' preview {{2}}", quoted)
}

impl Picker for FzfPicker {
    fn select(&self, items: &[PathBuf], header: &str) -> Result<Vec<PathBuf>, PickerError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--ansi",
            "--delimiter=\t",
            "--nth=1",
            "--with-nth=1",
            "--height=60%",
            "--layout=reverse",
            "--border",
            "--preview-window",
            "right:60%:wrap",
        ])
        .arg("--preview")
        .arg(&self.preview)
        .arg("--header")
        .arg(header)
        .arg(if self.multi { "--multi" } else { "--no-multi" })
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => PickerError::NotFound(self.binary.clone()),
            _ => PickerError::Io(e),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = render_items(items);
            // fzf may exit before reading everything (e.g. Esc); that is not an error.
            match stdin.write_all(input.as_bytes()) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(PickerError::Io(e)),
                _ => {}
            }
        }

        let output = child.wait_with_output()?;
        debug!(status = ?output.status.code(), "fzf finished");
        match output.status.code() {
            Some(0) => Ok(parse_selection(&String::from_utf8_lossy(&output.stdout))),
            // no match / cancelled
            Some(1) | Some(130) => Ok(Vec::new()),
            _ => Err(PickerError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }
}

fn render_items(items: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in items {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        out.push_str(&name);
        out.push('\t');
        out.push_str(&path.to_string_lossy());
        out.push('\n');
    }
    out
}

/// fzf prints whole lines (`name<TAB>path`); keep the path part.
pub fn parse_selection(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once('\t') {
            Some((_, path)) => PathBuf::from(path),
            None => PathBuf::from(line),
        })
        .collect()
}
