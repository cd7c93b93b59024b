//! Data models for harvested blog posts and run bookkeeping.
//!
//! This module defines the core data structures used throughout the crate:
//! - [`PostMetadata`]: Unvalidated record produced by a source strategy
//! - [`BlogEntry`]: Validated, normalized post handed downstream
//! - [`FetchResult`]: Transient result of one successful HTTP GET
//! - [`SkippedItem`], [`SourceSummary`], [`RunReport`]: what happened during a run

use crate::error::{FetchError, ScrapeError, ValidationError};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Title used when every title source on a page is missing.
pub const UNTITLED: &str = "Untitled";

/// A normalized blog post.
///
/// `url` is the unique key within a run; `title` and `content` are never empty.
/// Instances are only built through [`PostMetadata::into_entry`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlogEntry {
    /// The canonical post URL.
    pub url: String,
    /// The post title.
    pub title: String,
    /// Cleaned post text.
    pub content: String,
    /// Author, when the source exposes one.
    pub author: Option<String>,
    /// Publication timestamp, when one could be parsed.
    pub published_at: Option<DateTime<Utc>>,
    /// Display name of the source the post came from.
    pub source: String,
}

/// A post as extracted by a source strategy, before validation.
///
/// Extraction never fails outright: missing fields degrade to `None`, an empty
/// string or [`UNTITLED`]. Validation decides whether the record is emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMetadata {
    pub url: String,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source_name: String,
}

impl PostMetadata {
    /// Validate and convert into a [`BlogEntry`].
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the URL, title or content is blank.
    pub fn into_entry(self) -> Result<BlogEntry, ValidationError> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle { url });
        }
        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent { url });
        }

        Ok(BlogEntry {
            url,
            title,
            content,
            author: self.author.filter(|a| !a.trim().is_empty()),
            published_at: self.published_at,
            source: self.source_name,
        })
    }
}

/// A successful HTTP response. Never persisted.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub body: String,
    /// URL after following redirects.
    pub final_url: String,
    pub headers: HeaderMap,
}

/// Where in a source pipeline an item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Discovering,
    Fetching,
    Extracting,
    Emitting,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Discovering => "discovering",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Emitting => "emitting",
            PipelineStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Discovery channel an item arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    Index,
    Feed,
    Api,
}

/// Why an item was not emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Fetch(FetchError),
    Validation(ValidationError),
    Parse(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(e) => write!(f, "fetch failed: {e}"),
            SkipReason::Validation(e) => write!(f, "invalid entry: {e}"),
            SkipReason::Parse(msg) => write!(f, "parse failed: {msg}"),
        }
    }
}

/// One item that was attempted but not emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub source: String,
    /// URL of the post or page, when known.
    pub url: Option<String>,
    pub channel: Channel,
    pub stage: PipelineStage,
    pub reason: SkipReason,
}

/// Per-source counters, reported once a pipeline finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    /// Links, feed items and API posts the pipeline tried to turn into entries.
    pub attempted: usize,
    pub emitted: usize,
    pub skipped: usize,
    /// Items suppressed because their URL was already emitted this run.
    pub duplicates: usize,
    /// Source- or channel-level failures (index fetch, invalid feed, ...).
    pub failures: Vec<String>,
}

/// Everything a multi-source run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    pub entries: Vec<BlogEntry>,
    pub skipped: Vec<SkippedItem>,
    pub sources: Vec<SourceSummary>,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.sources.iter().map(|s| s.attempted).sum()
    }

    pub fn successful(&self) -> usize {
        self.entries.len()
    }

    /// Record a source whose pipeline could not be started.
    pub(crate) fn record_failure(&mut self, source: &str, error: &ScrapeError) {
        self.sources.push(SourceSummary {
            source: source.to_string(),
            failures: vec![error.to_string()],
            ..SourceSummary::default()
        });
    }
}
