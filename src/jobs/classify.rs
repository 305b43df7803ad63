//! Output Classifier
//!
//! Maps a raw provider output value (URL or literal) to a delivery kind by
//! content-type heuristics. An unknown http(s) URL defaults to a generic
//! document so the transport can resolve the content type; that fallback is
//! deliberate policy, not a gap.

use serde_json::Value;
use std::fmt;

const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".mkv", ".avi"];
const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".webp", ".gif", ".bmp"];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".flac", ".m4a"];

/// How a single terminal output should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Video,
    Photo,
    /// Audio is delivered through the document capability: voice-note
    /// delivery needs binary bytes, which a remote URL does not provide.
    Audio,
    Document,
    Text,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Video => write!(f, "video"),
            OutputKind::Photo => write!(f, "photo"),
            OutputKind::Audio => write!(f, "audio"),
            OutputKind::Document => write!(f, "document"),
            OutputKind::Text => write!(f, "text"),
        }
    }
}

/// Classify one output value, unwrapping a one-element array and an
/// object's `url` field first. Returns `None` for null/empty values.
pub fn classify_output(value: &Value) -> Option<(OutputKind, String)> {
    let content = resolve_content(value)?;
    if content.is_empty() {
        return None;
    }
    let kind = classify_str(&content);
    Some((kind, content))
}

fn resolve_content(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.len() == 1 => resolve_content(&items[0]),
        Value::Object(map) => map.get("url").and_then(|u| u.as_str()).map(|s| s.to_string()),
        other => Some(other.to_string()),
    }
}

fn classify_str(content: &str) -> OutputKind {
    // Query strings don't affect the extension.
    let path = content.split('?').next().unwrap_or(content);
    let lower = path.to_lowercase();

    if VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        OutputKind::Video
    } else if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        OutputKind::Photo
    } else if AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        OutputKind::Audio
    } else if content.starts_with("http://") || content.starts_with("https://") {
        OutputKind::Document
    } else {
        OutputKind::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_video_url() {
        let (kind, content) = classify_output(&json!("https://x/a.mp4")).unwrap();
        assert_eq!(kind, OutputKind::Video);
        assert_eq!(content, "https://x/a.mp4");
    }

    #[test]
    fn test_photo_url_with_query_string() {
        let (kind, _) = classify_output(&json!("https://x/a.png?sig=1")).unwrap();
        assert_eq!(kind, OutputKind::Photo);
    }

    #[test]
    fn test_audio_from_url_object() {
        let (kind, content) = classify_output(&json!({"url": "https://x/a.wav"})).unwrap();
        assert_eq!(kind, OutputKind::Audio);
        assert_eq!(content, "https://x/a.wav");
    }

    #[test]
    fn test_unknown_url_falls_back_to_document() {
        let (kind, _) = classify_output(&json!("https://x/unknown")).unwrap();
        assert_eq!(kind, OutputKind::Document);
    }

    #[test]
    fn test_plain_text() {
        let (kind, content) = classify_output(&json!("plain text")).unwrap();
        assert_eq!(kind, OutputKind::Text);
        assert_eq!(content, "plain text");
    }

    #[test]
    fn test_one_element_array_unwrapped() {
        let (kind, _) = classify_output(&json!(["https://x/out.webm"])).unwrap();
        assert_eq!(kind, OutputKind::Video);
    }

    #[test]
    fn test_case_insensitive_extension() {
        let (kind, _) = classify_output(&json!("https://x/A.MP4")).unwrap();
        assert_eq!(kind, OutputKind::Video);
    }

    #[test]
    fn test_null_and_empty_skipped() {
        assert!(classify_output(&json!(null)).is_none());
        assert!(classify_output(&json!("")).is_none());
    }

    #[test]
    fn test_object_without_url_skipped() {
        assert!(classify_output(&json!({"kind": "weird"})).is_none());
    }
}
