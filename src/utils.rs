//! Small helpers for logging, file naming and output directories.

use crate::error::MinerError;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or before `max` bytes,
/// with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
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

/// Turn a search id into a file-name-safe slug.
///
/// Lower-cases the id and replaces anything other than ASCII letters,
/// digits, `-` and `_` with `-`.
pub fn slugify_id(id: &str) -> String {
    let slug: String = id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "search".to_string()
    } else {
        slug.to_string()
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), MinerError> {
    let unusable = |e: std::io::Error| {
        MinerError::config(format!("output directory {} is not writable: {e}", path.display()))
    };

    fs::create_dir_all(path).await.map_err(unusable)?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path).map_err(unusable)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("Zoë Zoë Zoë", 3);
        assert_eq!(result, "Zo…(+12 bytes)");
    }

    #[test]
    fn test_slugify_id() {
        assert_eq!(slugify_id("za_weekly"), "za_weekly");
        assert_eq!(slugify_id("ZA Weekly/News"), "za-weekly-news");
        assert_eq!(slugify_id("  ../etc  "), "etc");
        assert_eq!(slugify_id("///"), "search");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("output").join("runs");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("taken");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            ensure_writable_dir(&file).await,
            Err(MinerError::Configuration(_))
        ));
    }
}
