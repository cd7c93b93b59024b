//! Utility functions for text cleaning, string manipulation, and file system operations.
//!
//! This module provides helper functions used throughout the crate:
//! - HTML stripping and whitespace normalization for feed and API content
//! - String truncation and slugification for logging and file names
//! - File system validation for output directories

use scraper::Html;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the remaining bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Convert a title to a file-name friendly slug.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify_title("Hello World"), "hello-world");
/// assert_eq!(slugify_title("Test-Article!"), "test-article");
/// ```
pub fn slugify_title(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_alphanumeric() && c != ' ' && c != '-', "")
        .replace(' ', "-")
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove markup from an HTML fragment, decoding entities along the way.
///
/// Text nodes are joined with spaces so adjacent block elements do not run
/// together; callers normally follow up with [`collapse_whitespace`].
pub fn strip_html(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return fragment.to_string();
    }
    let parsed = Html::parse_fragment(fragment);
    parsed.root_element().text().collect::<Vec<_>>().join(" ")
}

/// Strip markup and normalize whitespace.
pub fn clean_text(raw: &str) -> String {
    collapse_whitespace(&strip_html(raw))
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
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
        let s = "ééééé";
        assert_eq!(truncate_for_log(s, 2), "éé…(+6 bytes)");
    }

    #[test]
    fn test_slugify_title() {
        assert_eq!(slugify_title("Hello World"), "hello-world");
        assert_eq!(slugify_title("Test-Article!"), "test-article");
        assert_eq!(slugify_title("Google Research"), "google-research");
        assert_eq!(slugify_title("Martin Kleppmann"), "martin-kleppmann");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_strip_html_removes_tags_and_decodes_entities() {
        let html = "<p>Fish &amp; chips</p><p>are <b>great</b></p>";
        assert_eq!(clean_text(html), "Fish & chips are great");
    }

    #[test]
    fn test_strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("no markup here"), "no markup here");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        let nested = nested.to_str().unwrap();
        ensure_writable_dir(nested).await.unwrap();
        assert!(std::path::Path::new(nested).is_dir());
    }
}
