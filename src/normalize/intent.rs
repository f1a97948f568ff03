use crate::app::ports::Prompter;
use crate::config::Preset;
use crate::constants::{DEFAULT_TITLE, UNKNOWN_DEVICE};
use crate::error::Result;
use crate::formats::gpx::{first_time_utc, read_gpx};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::{Component, Path};
use tracing::debug;

/// CLI control over the geotag flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeotagOverride {
    /// Use the preset value.
    #[default]
    Unset,
    Force(bool),
}

/// Values supplied explicitly on the command line. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct IntentOverrides {
    pub title: Option<String>,
    pub activity: Option<String>,
    pub geotag: GeotagOverride,
    pub photos_pending: bool,
    pub notes: Option<String>,
    pub device_id: Option<String>,
}

/// The resolved decisions for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackIntent {
    pub title: String,
    pub activity: String,
    pub geotag_candidate: bool,
    pub photos_pending: bool,
    pub notes: String,
    pub device_id: String,
    /// `YYYY-MM-DD`
    pub date_key: String,
}

impl TrackIntent {
    pub fn year(&self) -> &str {
        self.date_key.split('-').next().unwrap_or(&self.date_key)
    }
}

/// How interactive prompting behaves for a run.
pub struct Prompting<'a> {
    pub prompter: &'a mut dyn Prompter,
    /// Do not ask about fields that were given on the command line.
    pub only_missing: bool,
}

/// Merge CLI overrides, preset defaults and optional prompt answers.
pub fn resolve_intent(
    source: &Path,
    raw_root: &Path,
    overrides: &IntentOverrides,
    preset: &Preset,
    prompting: Option<Prompting<'_>>,
) -> Result<TrackIntent> {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut title = match non_empty(overrides.title.as_deref()) {
        Some(t) => t.to_string(),
        None if preset.title_from_filename_if_missing => source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        None => DEFAULT_TITLE.to_string(),
    };
    let mut activity = non_empty(overrides.activity.as_deref())
        .unwrap_or(&preset.activity)
        .to_string();
    let mut geotag_candidate = match overrides.geotag {
        GeotagOverride::Force(value) => value,
        GeotagOverride::Unset => preset.geotag_candidate,
    };
    let mut photos_pending = geotag_candidate || overrides.photos_pending;
    let mut notes = overrides.notes.clone().unwrap_or_default();

    if let Some(Prompting {
        prompter,
        only_missing,
    }) = prompting
    {
        let ask = |given: bool| !(only_missing && given);

        if ask(overrides.title.is_some()) {
            title = prompter.prompt_str(&format!("Title for {}", file_name), &title)?;
        }
        if ask(overrides.activity.is_some()) {
            activity = prompter.prompt_str(&format!("Activity for {}", file_name), &activity)?;
        }
        if ask(overrides.geotag != GeotagOverride::Unset) {
            geotag_candidate = prompter
                .prompt_bool(&format!("Geotag candidate for {}?", file_name), geotag_candidate)?;
            photos_pending = geotag_candidate || overrides.photos_pending;
        }
        if ask(overrides.photos_pending) {
            photos_pending =
                prompter.prompt_bool(&format!("Photos pending for {}?", file_name), photos_pending)?;
        }
        if ask(overrides.notes.is_some()) {
            notes = prompter.prompt_str(&format!("Notes for {}", file_name), &notes)?;
        }
    }

    let device_id = match non_empty(overrides.device_id.as_deref()) {
        Some(d) => d.to_string(),
        None => device_from_path(source, raw_root).unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
    };

    let intent = TrackIntent {
        title,
        activity,
        geotag_candidate,
        photos_pending,
        notes,
        device_id,
        date_key: date_key(source, Local::now().date_naive()),
    };
    debug!(source = %source.display(), ?intent, "Resolved intent");
    Ok(intent)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// `<raw_root>/<year>/<date>/<device_id>/...`: the third component below the
/// root, provided something sits beneath it.
pub fn device_from_path(source: &Path, raw_root: &Path) -> Option<String> {
    let relative = source.strip_prefix(raw_root).ok().map(Path::to_path_buf).or_else(|| {
        let source = source.canonicalize().ok()?;
        let root = raw_root.canonicalize().ok()?;
        source.strip_prefix(&root).ok().map(Path::to_path_buf)
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.len() >= 4 {
        Some(parts[2].clone())
    } else {
        None
    }
}

/// UTC date of the earliest track point, or `today` when the file has no usable time.
pub fn date_key(source: &Path, today: NaiveDate) -> String {
    read_gpx(source)
        .ok()
        .and_then(|doc| first_time_utc(&doc))
        .map(|t| t.date_naive())
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    #[derive(Default)]
    struct ScriptedPrompter {
        answers: VecDeque<String>,
        asked: Vec<String>,
    }

    impl ScriptedPrompter {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.to_string()).collect(),
                asked: Vec::new(),
            }
        }

        fn next(&mut self, prompt: &str) -> String {
            self.asked.push(prompt.to_string());
            self.answers.pop_front().unwrap_or_default()
        }
    }

    impl Prompter for ScriptedPrompter {
        fn prompt_str(&mut self, prompt: &str, default: &str) -> io::Result<String> {
            let answer = self.next(prompt);
            Ok(if answer.is_empty() { default.to_string() } else { answer })
        }

        fn prompt_bool(&mut self, prompt: &str, default: bool) -> io::Result<bool> {
            Ok(match self.next(prompt).as_str() {
                "y" => true,
                "n" => false,
                _ => default,
            })
        }
    }

    fn archived(dir: &TempDir, body: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let raw = dir.path().join("_raw");
        let device_dir = raw.join("2026").join("2026-01-03").join("gpsmap67").join("Current");
        fs::create_dir_all(&device_dir).unwrap();
        let source = device_dir.join("Track_2026-01-02.gpx");
        fs::write(&source, body).unwrap();
        (raw, source)
    }

    const ONE_POINT: &str = r#"<gpx xmlns="http://www.topografix.com/GPX/1/1"><trk><trkseg><trkpt lat="1" lon="2"><time>2026-01-02T23:30:00-02:00</time></trkpt></trkseg></trk></gpx>"#;

    #[test]
    fn test_defaults_from_preset_and_path() {
        let dir = TempDir::new().unwrap();
        let (raw, source) = archived(&dir, ONE_POINT);
        let preset = Preset {
            activity: "hiking".to_string(),
            geotag_candidate: true,
            ..Preset::default()
        };

        let intent = resolve_intent(&source, &raw, &IntentOverrides::default(), &preset, None).unwrap();
        assert_eq!(intent.title, "Track_2026-01-02");
        assert_eq!(intent.activity, "hiking");
        assert!(intent.geotag_candidate);
        assert!(intent.photos_pending);
        assert_eq!(intent.notes, "");
        assert_eq!(intent.device_id, "gpsmap67");
        // 23:30 at -02:00 is the next day in UTC.
        assert_eq!(intent.date_key, "2026-01-03");
        assert_eq!(intent.year(), "2026");
    }

    #[test]
    fn test_cli_overrides_win() {
        let dir = TempDir::new().unwrap();
        let (raw, source) = archived(&dir, ONE_POINT);
        let overrides = IntentOverrides {
            title: Some("Morning Hike".to_string()),
            activity: Some("running".to_string()),
            geotag: GeotagOverride::Force(false),
            photos_pending: true,
            notes: Some("cold".to_string()),
            device_id: Some("etrex".to_string()),
        };
        let preset = Preset {
            geotag_candidate: true,
            ..Preset::default()
        };

        let intent = resolve_intent(&source, &raw, &overrides, &preset, None).unwrap();
        assert_eq!(intent.title, "Morning Hike");
        assert_eq!(intent.activity, "running");
        assert!(!intent.geotag_candidate);
        assert!(intent.photos_pending);
        assert_eq!(intent.notes, "cold");
        assert_eq!(intent.device_id, "etrex");
    }

    #[test]
    fn test_untitled_when_filename_titles_disabled() {
        let dir = TempDir::new().unwrap();
        let (raw, source) = archived(&dir, ONE_POINT);
        let preset = Preset {
            title_from_filename_if_missing: false,
            ..Preset::default()
        };
        let intent = resolve_intent(&source, &raw, &IntentOverrides::default(), &preset, None).unwrap();
        assert_eq!(intent.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_device_falls_back_to_unknown() {
        let dir = TempDir::new().unwrap();
        let raw = dir.path().join("_raw");
        fs::create_dir_all(raw.join("2026")).unwrap();
        let shallow = raw.join("2026").join("x.gpx");
        fs::write(&shallow, ONE_POINT).unwrap();
        assert_eq!(device_from_path(&shallow, &raw), None);

        let outside = dir.path().join("elsewhere.gpx");
        fs::write(&outside, ONE_POINT).unwrap();
        let intent =
            resolve_intent(&outside, &raw, &IntentOverrides::default(), &Preset::default(), None)
                .unwrap();
        assert_eq!(intent.device_id, UNKNOWN_DEVICE);
    }

    #[test]
    fn test_date_key_falls_back_to_today() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.gpx");
        fs::write(&broken, "<gpx>").unwrap();
        let today = NaiveDate::from_ymd_opt(2030, 5, 6).unwrap();
        assert_eq!(date_key(&broken, today), "2030-05-06");
    }

    #[test]
    fn test_prompt_answers_become_final() {
        let dir = TempDir::new().unwrap();
        let (raw, source) = archived(&dir, ONE_POINT);
        let mut prompter = ScriptedPrompter::new(&["Ridge Walk", "", "y", "n", "windy"]);

        let intent = resolve_intent(
            &source,
            &raw,
            &IntentOverrides::default(),
            &Preset::default(),
            Some(Prompting {
                prompter: &mut prompter,
                only_missing: false,
            }),
        )
        .unwrap();

        assert_eq!(intent.title, "Ridge Walk");
        assert_eq!(intent.activity, "unknown");
        assert!(intent.geotag_candidate);
        assert!(!intent.photos_pending);
        assert_eq!(intent.notes, "windy");
        assert_eq!(prompter.asked.len(), 5);
    }

    #[test]
    fn test_only_missing_skips_cli_fields() {
        let dir = TempDir::new().unwrap();
        let (raw, source) = archived(&dir, ONE_POINT);
        let overrides = IntentOverrides {
            title: Some("Given".to_string()),
            geotag: GeotagOverride::Force(true),
            ..IntentOverrides::default()
        };
        let mut prompter = ScriptedPrompter::new(&[]);

        let intent = resolve_intent(
            &source,
            &raw,
            &overrides,
            &Preset::default(),
            Some(Prompting {
                prompter: &mut prompter,
                only_missing: true,
            }),
        )
        .unwrap();

        assert_eq!(intent.title, "Given");
        assert!(intent.geotag_candidate);
        assert_eq!(
            prompter.asked,
            vec![
                "Activity for Track_2026-01-02.gpx".to_string(),
                "Photos pending for Track_2026-01-02.gpx?".to_string(),
                "Notes for Track_2026-01-02.gpx".to_string(),
            ]
        );
    }
}
