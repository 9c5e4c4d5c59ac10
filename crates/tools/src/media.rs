//! Media marker extraction from tool/assistant text output.
//!
//! Two forms, both documented as an external contract the agent relies on:
//!
//! 1. Legacy, own-line form: `MEDIA:<relative-path-or-https-URL>`. The path
//!    must start with `./`, contain no `..`, and not be absolute or a
//!    tilde path; URLs must be `https://`. Matching lines are stripped
//!    from the text and their reference extracted.
//! 2. Structured inline form: `{{media:<mime>:'<path>'}}`, used to
//!    interleave text and media within one message. Same path rule as
//!    above applies to `<path>`.
//!
//! Anything that doesn't satisfy the path rule is left as plain text —
//! dropped from the media list, but not corrupted in the surrounding text.

use once_cell_lite::OnceRegex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRef {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

/// Extract every valid media marker from `text`, returning the cleaned
/// text (markers removed/stripped) alongside the media references found,
/// in the order they appeared.
pub fn extract_media(text: &str) -> (String, Vec<MediaRef>) {
    let mut refs = Vec::new();
    let without_structured = extract_structured(text, &mut refs);
    let cleaned = extract_legacy_lines(&without_structured, &mut refs);
    (cleaned, refs)
}

fn is_valid_media_path(path: &str) -> bool {
    if let Some(rest) = path.strip_prefix("https://") {
        return !rest.is_empty();
    }
    path.starts_with("./") && !path.contains("..") && !path.starts_with('~')
}

fn extract_legacy_lines(text: &str, refs: &mut Vec<MediaRef>) -> String {
    text.lines()
        .filter_map(|line| {
            if let Some(rest) = line.trim().strip_prefix("MEDIA:") {
                let candidate = rest.trim();
                if is_valid_media_path(candidate) {
                    refs.push(MediaRef { path: candidate.to_owned(), mime: None });
                    return None;
                }
            }
            Some(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

static STRUCTURED: OnceRegex = OnceRegex::new(r"\{\{media:([a-zA-Z0-9_/.+-]+):'([^']*)'\}\}");

fn extract_structured(text: &str, refs: &mut Vec<MediaRef>) -> String {
    STRUCTURED
        .get()
        .replace_all(text, |caps: &regex::Captures| {
            let mime = caps[1].to_string();
            let path = caps[2].to_string();
            if is_valid_media_path(&path) {
                refs.push(MediaRef { path, mime: Some(mime) });
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Tiny `OnceLock`-backed lazy regex, since this crate doesn't otherwise
/// depend on `once_cell`/`lazy_static`.
mod once_cell_lite {
    use regex::Regex;
    use std::sync::OnceLock;

    pub struct OnceRegex {
        pattern: &'static str,
        cell: OnceLock<Regex>,
    }

    impl OnceRegex {
        pub const fn new(pattern: &'static str) -> Self {
            Self { pattern, cell: OnceLock::new() }
        }

        pub fn get(&self) -> &Regex {
            self.cell.get_or_init(|| Regex::new(self.pattern).expect("valid media marker regex"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_legacy_line_marker() {
        let text = "here is a chart\nMEDIA:./out/chart.png\nmore text";
        let (cleaned, refs) = extract_media(text);
        assert_eq!(refs, vec![MediaRef { path: "./out/chart.png".into(), mime: None }]);
        assert!(!cleaned.contains("MEDIA:"));
        assert!(cleaned.contains("here is a chart"));
        assert!(cleaned.contains("more text"));
    }

    #[test]
    fn extracts_https_legacy_marker() {
        let (_, refs) = extract_media("MEDIA:https://example.com/a.png");
        assert_eq!(refs[0].path, "https://example.com/a.png");
    }

    #[test]
    fn rejects_traversal_and_tilde_and_absolute() {
        let (cleaned, refs) = extract_media(
            "MEDIA:../escape.png\nMEDIA:~/secret.png\nMEDIA:/etc/passwd",
        );
        assert!(refs.is_empty());
        assert!(cleaned.contains("MEDIA:../escape.png"));
    }

    #[test]
    fn extracts_structured_inline_marker() {
        let text = "before {{media:image/png:'./a.png'}} after";
        let (cleaned, refs) = extract_media(text);
        assert_eq!(refs[0].path, "./a.png");
        assert_eq!(refs[0].mime.as_deref(), Some("image/png"));
        assert_eq!(cleaned, "before  after");
    }

    #[test]
    fn leaves_invalid_structured_marker_as_text() {
        let text = "{{media:image/png:'../escape.png'}}";
        let (cleaned, refs) = extract_media(text);
        assert!(refs.is_empty());
        assert_eq!(cleaned, text);
    }

    #[test]
    fn handles_multiple_markers_in_order() {
        let text = "{{media:image/png:'./a.png'}} then MEDIA:./b.png";
        let (_, refs) = extract_media(text);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].path, "./a.png");
        assert_eq!(refs[1].path, "./b.png");
    }
}
