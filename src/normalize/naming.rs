//! Output naming: template rendering, slugs, and content-addressed collision handling.

use crate::constants::SLUG_FALLBACK;
use crate::error::TemplateError;
use crate::hashing::sha256_file;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Values available to a name template.
#[derive(Debug, Clone, Copy)]
pub struct NameContext<'a> {
    pub date: &'a str,
    pub title: &'a str,
    pub activity: &'a str,
    pub device: &'a str,
}

impl<'a> NameContext<'a> {
    fn lookup(&self, key: &str) -> Option<&'a str> {
        match key {
            "date" => Some(self.date),
            "title" => Some(self.title),
            "activity" => Some(self.activity),
            "device" => Some(self.device),
            _ => None,
        }
    }
}

/// Render `template`, substituting `{date}`, `{title}`, `{activity}` and `{device}`.
/// `{{` and `}}` produce literal braces.
pub fn render_name(template: &str, ctx: &NameContext<'_>) -> Result<String, TemplateError> {
    let malformed = |reason: &str| TemplateError::Malformed {
        template: template.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => return Err(malformed("unclosed '{'")),
                        Some(ch) => key.push(ch),
                    }
                }
                if key.is_empty() {
                    return Err(malformed("empty placeholder '{}'"));
                }
                let value = ctx
                    .lookup(&key)
                    .ok_or_else(|| TemplateError::UnknownPlaceholder {
                        placeholder: key.clone(),
                        template: template.to_string(),
                    })?;
                out.push_str(value);
            }
            '}' => return Err(malformed("single '}' outside a placeholder")),
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Check a template once, up front, so a bad template fails the run before any file.
pub fn validate_template(template: &str) -> Result<(), TemplateError> {
    let sample = NameContext {
        date: "",
        title: "",
        activity: "",
        device: "",
    };
    render_name(template, &sample).map(|_| ())
}

/// Lowercase, `[a-z0-9_]` only. Hyphens between digits are dropped so dates
/// collapse (`2026-01-02` -> `20260102`); any other run of disallowed
/// characters becomes one `_`. Never empty.
pub fn slugify(text: &str) -> String {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut pending_sep = false;

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else if c == '-' && is_digit_at(&chars, i.wrapping_sub(1)) && is_digit_at(&chars, i + 1) {
            continue;
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        out
    }
}

fn is_digit_at(chars: &[char], i: usize) -> bool {
    chars.get(i).is_some_and(|c| c.is_ascii_digit())
}

/// Pick a directory name under `out_parent` for `source`.
///
/// Tries `base`, `base__<sha8>`, `base__<sha12>` in order and takes the first
/// that is free or already holds output of the same source bytes (its sidecar
/// records the same `source.sha256`). The source is only hashed when `base` is
/// taken. If every candidate belongs to other content, the 12-character form
/// is returned.
pub fn choose_output_slug(base_slug: &str, out_parent: &Path, source: &Path) -> io::Result<String> {
    if !out_parent.join(base_slug).exists() {
        return Ok(base_slug.to_string());
    }

    let digest = sha256_file(source)?;
    let candidates = [
        base_slug.to_string(),
        format!("{}__{}", base_slug, &digest[..8]),
        format!("{}__{}", base_slug, &digest[..12]),
    ];

    for candidate in &candidates {
        let dir = out_parent.join(candidate);
        if !dir.exists() {
            return Ok(candidate.clone());
        }
        if recorded_source_digest(&dir, candidate).as_deref() == Some(digest.as_str()) {
            debug!(slug = %candidate, "Existing output has identical source, reusing slug");
            return Ok(candidate.clone());
        }
    }

    Ok(candidates[2].clone())
}

fn recorded_source_digest(dir: &Path, slug: &str) -> Option<String> {
    let sidecar = dir.join(format!("{}.sidecar.json", slug));
    let text = fs::read_to_string(sidecar).ok()?;
    let doc: serde_json::Value = serde_json::from_str(&text).ok()?;
    doc.get("source")?
        .get("sha256")?
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::sha256_bytes;
    use once_cell::sync::Lazy;
    use regex::Regex;
    use tempfile::TempDir;

    static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-z0-9_]+$").unwrap());

    fn ctx() -> NameContext<'static> {
        NameContext {
            date: "2026-01-02",
            title: "Morning Hike",
            activity: "hiking",
            device: "gpsmap67",
        }
    }

    fn write_output(parent: &Path, slug: &str, source_sha: &str) {
        let dir = parent.join(slug);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(format!("{}.sidecar.json", slug)),
            format!(r#"{{"source": {{"path": "x", "sha256": "{}"}}}}"#, source_sha),
        )
        .unwrap();
    }

    #[test]
    fn test_render_all_placeholders() {
        let name = render_name("{date}_{title}_{activity}_{device}", &ctx()).unwrap();
        assert_eq!(name, "2026-01-02_Morning Hike_hiking_gpsmap67");
        assert_eq!(render_name("{{literal}} {date}", &ctx()).unwrap(), "{literal} 2026-01-02");
    }

    #[test]
    fn test_render_rejects_unknown_placeholder() {
        let err = render_name("{date}_{bogus}", &ctx()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownPlaceholder {
                placeholder: "bogus".to_string(),
                template: "{date}_{bogus}".to_string(),
            }
        );
        assert!(validate_template("{bogus}").is_err());
        assert!(validate_template("{date}_{title}").is_ok());
    }

    #[test]
    fn test_render_rejects_malformed_braces() {
        for template in ["{date", "date}", "{}", "{da{te}"] {
            assert!(
                matches!(validate_template(template), Err(TemplateError::Malformed { .. })),
                "{template}"
            );
        }
    }

    #[test]
    fn test_slugify_cases() {
        assert_eq!(slugify("2026-01-02_Morning Hike"), "20260102_morning_hike");
        assert_eq!(slugify("  Hello,   World!! "), "hello_world");
        assert_eq!(slugify("a - b"), "a_b");
        assert_eq!(slugify("Route 66-west"), "route_66_west");
        assert_eq!(slugify("___"), SLUG_FALLBACK);
        assert_eq!(slugify(""), SLUG_FALLBACK);
        assert_eq!(slugify("Café au lait"), "caf_au_lait");
    }

    #[test]
    fn test_slugify_is_always_well_formed() {
        let inputs = [
            "", "-", "--1--", "1-", "-1", "Ünïcödé", "日本語", "a\tb\nc", "x__y", "2026-01-02",
            "UPPER lower 123", "!!!", "{date}_{title}", "../../etc/passwd",
        ];
        for input in inputs {
            let slug = slugify(input);
            assert!(SLUG_RE.is_match(&slug), "{input:?} -> {slug:?}");
            assert!(!slug.starts_with('_') && !slug.ends_with('_'), "{input:?} -> {slug:?}");
        }
    }

    #[test]
    fn test_free_slug_is_returned_without_hashing() {
        let dir = TempDir::new().unwrap();
        let missing_source = dir.path().join("does-not-exist.gpx");
        let slug = choose_output_slug("hike", dir.path(), &missing_source).unwrap();
        assert_eq!(slug, "hike");
    }

    #[test]
    fn test_same_source_keeps_its_slug() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.gpx");
        fs::write(&source, b"<gpx/>").unwrap();
        write_output(dir.path(), "hike", &sha256_bytes(b"<gpx/>"));

        for _ in 0..3 {
            assert_eq!(choose_output_slug("hike", dir.path(), &source).unwrap(), "hike");
        }
    }

    #[test]
    fn test_different_sources_diverge_by_digest() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.gpx");
        let b = dir.path().join("b.gpx");
        fs::write(&a, b"<gpx>a</gpx>").unwrap();
        fs::write(&b, b"<gpx>b</gpx>").unwrap();
        write_output(dir.path(), "hike", &sha256_bytes(b"<gpx>a</gpx>"));

        let b_sha = sha256_bytes(b"<gpx>b</gpx>");
        let slug_b = choose_output_slug("hike", dir.path(), &b).unwrap();
        assert_eq!(slug_b, format!("hike__{}", &b_sha[..8]));

        // Once written, b keeps resolving to its suffixed slug and a keeps the base.
        write_output(dir.path(), &slug_b, &b_sha);
        assert_eq!(choose_output_slug("hike", dir.path(), &b).unwrap(), slug_b);
        assert_eq!(choose_output_slug("hike", dir.path(), &a).unwrap(), "hike");
    }

    #[test]
    fn test_widens_to_twelve_characters() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("c.gpx");
        fs::write(&source, b"<gpx>c</gpx>").unwrap();
        let sha = sha256_bytes(b"<gpx>c</gpx>");
        write_output(dir.path(), "hike", "other");
        write_output(dir.path(), &format!("hike__{}", &sha[..8]), "another");

        let slug = choose_output_slug("hike", dir.path(), &source).unwrap();
        assert_eq!(slug, format!("hike__{}", &sha[..12]));
    }
}
