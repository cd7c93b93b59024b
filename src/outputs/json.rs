//! JSON output of harvested entries.
//!
//! Files are organized by run date with one file per source:
//! `{output_dir}/{YYYY-MM-DD}/{source-slug}.json`, each holding a JSON array
//! of [`BlogEntry`] objects. A later run on the same day replaces the file.

use crate::models::BlogEntry;
use crate::utils::slugify_title;
use chrono::NaiveDate;
use itertools::Itertools;
use std::error::Error;
use std::io::Write;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `entries` grouped by source under `{output_dir}/{date}/`.
///
/// # Returns
///
/// Paths of the files written, in source-name order.
///
/// # Errors
///
/// Fails if the directory cannot be created, an entry cannot be serialized, or
/// a file cannot be written.
#[instrument(level = "info", skip(entries), fields(count = entries.len()))]
pub async fn write_entries(
    entries: &[BlogEntry],
    output_dir: &str,
    date: NaiveDate,
) -> Result<Vec<String>, Box<dyn Error>> {
    let day_dir = format!("{}/{}", output_dir.trim_end_matches('/'), date);
    if let Err(e) = fs::create_dir_all(&day_dir).await {
        error!(%day_dir, error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let by_source = entries.iter().into_group_map_by(|e| e.source.as_str());
    let mut written = Vec::with_capacity(by_source.len());
    for (source, group) in by_source.into_iter().sorted_by_key(|(source, _)| *source) {
        let path = format!("{}/{}.json", day_dir, slugify_title(source));
        let json = serde_json::to_string_pretty(&group)?;
        fs::write(&path, json).await?;
        info!(%path, source, count = group.len(), "Wrote entries");
        written.push(path);
    }
    Ok(written)
}

/// Write one JSON object per line.
///
/// # Errors
///
/// Fails on serialization or write errors.
pub fn write_json_lines<W: Write>(entries: &[BlogEntry], mut out: W) -> Result<(), Box<dyn Error>> {
    for entry in entries {
        serde_json::to_writer(&mut out, entry)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn entry(source: &str, url: &str) -> BlogEntry {
        BlogEntry {
            url: url.to_string(),
            title: "Title".to_string(),
            content: "Body".to_string(),
            author: None,
            published_at: Some(Utc.with_ymd_and_hms(2024, 4, 16, 9, 30, 0).unwrap()),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_entries_groups_by_source() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().to_str().unwrap();
        let entries = vec![
            entry("Meta Engineering", "https://engineering.fb.com/a"),
            entry("Google Research", "https://research.google/blog/b"),
            entry("Meta Engineering", "https://engineering.fb.com/c"),
        ];
        let date = NaiveDate::from_ymd_opt(2024, 4, 16).unwrap();

        let written = write_entries(&entries, output_dir, date).await.unwrap();
        assert_eq!(
            written,
            vec![
                format!("{output_dir}/2024-04-16/google-research.json"),
                format!("{output_dir}/2024-04-16/meta-engineering.json"),
            ]
        );

        let raw = std::fs::read_to_string(&written[1]).unwrap();
        let meta: Vec<BlogEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta, vec![entries[0].clone(), entries[2].clone()]);
    }

    #[test]
    fn test_write_json_lines() {
        let mut buf = Vec::new();
        write_json_lines(
            &[entry("A", "https://a.example/1"), entry("A", "https://a.example/2")],
            &mut buf,
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: BlogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.url, "https://a.example/1");
    }
}
