//! Utility functions for date normalization, string handling and output.
//!
//! - Date parsing and ISO-8601 normalization for scraped metadata
//! - String truncation for logging
//! - JSON error detection and code-fence stripping for model replies
//! - Writing JSON results to stdout or a file

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use std::error::Error as _;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// Normalize a loosely formatted date into an ISO-8601 UTC string.
///
/// Accepts RFC 3339 (with any offset), RFC 2822 and bare `YYYY-MM-DD`.
///
/// # Arguments
///
/// * `s` - The date as scraped; surrounding whitespace is ignored
///
/// # Returns
///
/// The instant in UTC with millisecond precision
/// (`2025-05-06T16:00:00.000Z`), or `None` for anything unparsable,
/// including an empty string.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(as_iso("2025-05-06T09:00:00-07:00").as_deref(), Some("2025-05-06T16:00:00.000Z"));
/// assert_eq!(as_iso("soon"), None);
/// ```
pub fn as_iso(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        })?;

    Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Whether `s` is a complete ISO-8601 datetime with an offset.
pub fn is_iso_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or before `max` bytes and
/// get an ellipsis and byte count appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When a model reply is cut off (e.g., due to token limits), the resulting
/// JSON fails to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Remove a surrounding markdown code fence (```json ... ```) if present.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Render a reqwest error with its source chain, which is where the useful
/// detail ("connection refused", "dns error") usually lives.
pub fn error_chain(e: &reqwest::Error) -> String {
    let mut out = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}

/// Serialize `value` as pretty JSON to `path`, or to stdout when `path` is `None`.
///
/// # Arguments
///
/// * `value` - Anything serializable, typically an article list
/// * `path` - Output file; missing parent directories are created
///
/// # Returns
///
/// `Ok(())` once the JSON is written, or the serialization or I/O error.
#[instrument(level = "info", skip_all, fields(path = ?path))]
pub async fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> crate::error::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            fs::write(path, json).await?;
            info!(path = %path.display(), "Wrote JSON output");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_iso_rfc3339_with_offset() {
        assert_eq!(
            as_iso("2025-05-06T09:00:00-07:00").as_deref(),
            Some("2025-05-06T16:00:00.000Z")
        );
    }

    #[test]
    fn test_as_iso_rfc2822() {
        assert_eq!(
            as_iso("Tue, 06 May 2025 16:00:00 GMT").as_deref(),
            Some("2025-05-06T16:00:00.000Z")
        );
    }

    #[test]
    fn test_as_iso_bare_date() {
        assert_eq!(as_iso("2025-05-06").as_deref(), Some("2025-05-06T00:00:00.000Z"));
    }

    #[test]
    fn test_as_iso_rejects_garbage() {
        assert_eq!(as_iso(""), None);
        assert_eq!(as_iso("   "), None);
        assert_eq!(as_iso("last week"), None);
    }

    #[test]
    fn test_is_iso_datetime() {
        assert!(is_iso_datetime("2025-05-06T16:00:00.000Z"));
        assert!(is_iso_datetime("2025-05-06T16:00:00+02:00"));
        assert!(!is_iso_datetime("2025-05-06"));
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundary() {
        let s = "ééééé";
        let result = truncate_for_log(s, 3);
        assert!(result.starts_with("é"));
        assert!(result.contains("(+8 bytes)"));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"[{"field": "value"#;
        let err = serde_json::from_str::<serde_json::Value>(json_eof).unwrap_err();
        assert!(looks_truncated(&err));

        let json_bad = r#"[{"field": value}]"#;
        let err = serde_json::from_str::<serde_json::Value>(json_bad).unwrap_err();
        assert!(!looks_truncated(&err));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("[1, 2]"), "[1, 2]");
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n[]\n```\n"), "[]");
    }

    #[tokio::test]
    async fn test_write_json_to_file() {
        let dir = std::env::temp_dir().join(format!("sigment_reader_test_{}", std::process::id()));
        let path = dir.join("nested").join("out.json");
        write_json(&vec![1, 2, 3], Some(&path)).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<u32> = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
