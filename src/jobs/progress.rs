//! Progress Extractor
//!
//! Best-effort extraction of a 0-100 percentage from a provider callback
//! payload. Providers are heterogeneous: some report a numeric fraction,
//! some only mention progress inside log lines, many report nothing. The
//! extractor degrades to `None` rather than fail.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,3})%").unwrap());
static PROGRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"progress[:=]\s*(\d+(?:\.\d+)?)").unwrap());

/// Extract a percentage in [0,100] from a callback payload.
///
/// Resolution order, first match wins:
/// 1. top-level `progress` fraction in [0,1]
/// 2. `metrics.progress` fraction in [0,1]
/// 3. last log line containing `<digits>%`
/// 4. last log line containing `progress: <number>` (<=1 means fraction)
pub fn extract_percent(payload: &Value) -> Option<u8> {
    if let Some(p) = fraction_field(payload.get("progress")) {
        return Some(p);
    }

    if let Some(p) = fraction_field(payload.get("metrics").and_then(|m| m.get("progress"))) {
        return Some(p);
    }

    let line = last_log_line(payload)?;

    if let Some(caps) = PERCENT_RE.captures(&line) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return Some(n.min(100) as u8);
        }
    }

    if let Some(caps) = PROGRESS_RE.captures(&line.to_lowercase()) {
        if let Ok(n) = caps[1].parse::<f64>() {
            let pct = if n <= 1.0 { n * 100.0 } else { n };
            return Some(pct.clamp(0.0, 100.0).round() as u8);
        }
    }

    None
}

fn fraction_field(value: Option<&Value>) -> Option<u8> {
    let n = value?.as_f64()?;
    if (0.0..=1.0).contains(&n) {
        Some((n * 100.0).round() as u8)
    } else {
        None
    }
}

/// Most recent entry of the payload's log sequence, tolerating either a
/// newline-joined string or an array of lines.
fn last_log_line(payload: &Value) -> Option<String> {
    match payload.get("logs") {
        Some(Value::String(s)) => s
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.to_string()),
        Some(Value::Array(items)) => items
            .iter()
            .rev()
            .filter_map(|v| v.as_str())
            .find(|l| !l.trim().is_empty())
            .map(|l| l.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_fraction() {
        assert_eq!(extract_percent(&json!({"progress": 0.1})), Some(10));
        assert_eq!(extract_percent(&json!({"progress": 0.5})), Some(50));
        assert_eq!(extract_percent(&json!({"progress": 1.0})), Some(100));
        assert_eq!(extract_percent(&json!({"progress": 0.0})), Some(0));
    }

    #[test]
    fn test_fraction_out_of_range_ignored() {
        // A value above 1 is not a fraction; fall through to other sources.
        assert_eq!(extract_percent(&json!({"progress": 42})), None);
        assert_eq!(extract_percent(&json!({"progress": -0.5})), None);
    }

    #[test]
    fn test_metrics_fraction() {
        let payload = json!({"metrics": {"progress": 0.75}});
        assert_eq!(extract_percent(&payload), Some(75));
    }

    #[test]
    fn test_top_level_wins_over_metrics() {
        let payload = json!({"progress": 0.2, "metrics": {"progress": 0.9}});
        assert_eq!(extract_percent(&payload), Some(20));
    }

    #[test]
    fn test_logs_percent_pattern() {
        let payload = json!({"logs": "step 1 done\n 37%|███       | 37/100"});
        assert_eq!(extract_percent(&payload), Some(37));
    }

    #[test]
    fn test_logs_array_takes_last_entry() {
        let payload = json!({"logs": ["10% done", "80% done"]});
        assert_eq!(extract_percent(&payload), Some(80));
    }

    #[test]
    fn test_logs_percent_clamped() {
        let payload = json!({"logs": "999% overflow"});
        assert_eq!(extract_percent(&payload), Some(100));
    }

    #[test]
    fn test_logs_progress_fraction() {
        let payload = json!({"logs": "progress: 0.6"});
        assert_eq!(extract_percent(&payload), Some(60));
    }

    #[test]
    fn test_logs_progress_absolute() {
        let payload = json!({"logs": "progress=55"});
        assert_eq!(extract_percent(&payload), Some(55));
    }

    #[test]
    fn test_logs_trailing_blank_lines_skipped() {
        let payload = json!({"logs": "45% rendering\n\n  \n"});
        assert_eq!(extract_percent(&payload), Some(45));
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        assert_eq!(extract_percent(&json!({})), None);
        assert_eq!(extract_percent(&json!({"logs": "warming up"})), None);
        assert_eq!(extract_percent(&json!({"logs": ""})), None);
    }
}
