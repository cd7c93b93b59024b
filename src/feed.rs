//! RSS 2.0 and Atom feed parsing.
//!
//! [`FeedReader::parse`] turns a feed document into a [`ParsedFeed`] of
//! [`RawFeedEntry`] values. It tries RSS first and falls back to Atom; a
//! document that is neither is a [`FeedError::Unparseable`], which is fatal for
//! the source that produced it.
//!
//! Each raw entry keeps both the machine-parsed timestamps and the original
//! date strings, so [`RawFeedEntry::resolve_timestamp`] can walk its fallback
//! chain: published (parsed) → published (explicit formats) → updated (parsed)
//! → updated (explicit formats) → now.

use crate::error::FeedError;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, warn};

/// Formats tried, in order, on date strings the RFC parsers rejected.
pub const EXPLICIT_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%d %b %Y %H:%M:%S %z",
];

/// One feed item with every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub author: Option<String>,
    /// Raw `pubDate` / `published` text.
    pub published: Option<String>,
    pub published_parsed: Option<DateTime<Utc>>,
    /// Raw `dc:date` / `updated` text.
    pub updated: Option<String>,
    pub updated_parsed: Option<DateTime<Utc>>,
    /// Full body (`content:encoded` / Atom `content`).
    pub content: Option<String>,
    /// Short body (`description` / Atom `summary`).
    pub summary: Option<String>,
}

impl RawFeedEntry {
    /// Post URL: the link, or a GUID that looks like a URL.
    pub fn url(&self) -> Option<&str> {
        non_blank(self.link.as_deref()).or_else(|| {
            non_blank(self.guid.as_deref()).filter(|g| g.starts_with("http"))
        })
    }

    /// Embedded content, falling back to the summary.
    pub fn body(&self) -> Option<&str> {
        non_blank(self.content.as_deref()).or_else(|| non_blank(self.summary.as_deref()))
    }

    /// Publication time via the fallback chain, or the current time with a warning.
    pub fn resolve_timestamp(&self) -> DateTime<Utc> {
        self.published_parsed
            .or_else(|| self.published.as_deref().and_then(parse_explicit))
            .or(self.updated_parsed)
            .or_else(|| self.updated.as_deref().and_then(parse_explicit))
            .unwrap_or_else(|| {
                warn!(
                    link = self.link.as_deref().unwrap_or("unknown"),
                    published = ?self.published,
                    updated = ?self.updated,
                    "No valid date found, using current time"
                );
                Utc::now()
            })
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

fn parse_explicit(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = EXPLICIT_DATE_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc));
    if parsed.is_none() {
        debug!(raw, "Could not parse date string with explicit formats");
    }
    parsed
}

/// Lenient parse used to fill the `*_parsed` fields.
fn parse_lenient(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A parsed feed document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub link: Option<String>,
    pub entries: Vec<RawFeedEntry>,
}

impl ParsedFeed {
    /// Structural checks applied by sources that treat a degraded feed as broken.
    ///
    /// # Errors
    ///
    /// [`FeedError::Empty`] without entries, [`FeedError::MissingChannelFields`]
    /// without a channel title or link.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.entries.is_empty() {
            return Err(FeedError::Empty);
        }
        if non_blank(self.title.as_deref()).is_none() || non_blank(self.link.as_deref()).is_none()
        {
            return Err(FeedError::MissingChannelFields);
        }
        Ok(())
    }
}

pub struct FeedReader;

impl FeedReader {
    /// Parse an RSS or Atom document.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Unparseable`] when both parsers reject the document.
    pub fn parse(xml: &str) -> Result<ParsedFeed, FeedError> {
        match Self::parse_rss(xml) {
            Ok(feed) => Ok(feed),
            Err(rss_err) => match Self::parse_atom(xml) {
                Ok(feed) => Ok(feed),
                Err(atom_err) => Err(FeedError::Unparseable {
                    rss: rss_err.to_string(),
                    atom: atom_err.to_string(),
                }),
            },
        }
    }

    fn parse_rss(xml: &str) -> Result<ParsedFeed, rss::Error> {
        let channel = rss::Channel::read_from(xml.as_bytes())?;

        let entries = channel
            .items()
            .iter()
            .map(|item| {
                let dc = item.dublin_core_ext();
                let updated = dc.and_then(|dc| dc.dates().first().cloned());
                let author = item
                    .author()
                    .map(str::to_string)
                    .or_else(|| dc.and_then(|dc| dc.creators().first().cloned()));

                RawFeedEntry {
                    title: item.title().map(str::to_string),
                    link: item.link().map(str::to_string),
                    guid: item.guid().map(|g| g.value().to_string()),
                    author,
                    published_parsed: item.pub_date().and_then(parse_lenient),
                    published: item.pub_date().map(str::to_string),
                    updated_parsed: updated.as_deref().and_then(parse_lenient),
                    updated,
                    content: item.content().map(str::to_string),
                    summary: item.description().map(str::to_string),
                }
            })
            .collect();

        Ok(ParsedFeed {
            title: Some(channel.title().to_string()),
            link: Some(channel.link().to_string()),
            entries,
        })
    }

    fn parse_atom(xml: &str) -> Result<ParsedFeed, atom_syndication::Error> {
        let feed = atom_syndication::Feed::read_from(xml.as_bytes())?;

        let entries = feed
            .entries()
            .iter()
            .map(|entry| {
                let link = entry
                    .links()
                    .iter()
                    .find(|l| l.rel() == "alternate")
                    .or_else(|| entry.links().first())
                    .map(|l| l.href().to_string());
                let published = entry.published().copied();
                let updated = *entry.updated();

                RawFeedEntry {
                    title: Some(entry.title().as_str().to_string()),
                    link,
                    guid: Some(entry.id().to_string()),
                    author: entry.authors().first().map(|p| p.name().to_string()),
                    published: published.map(|dt| dt.to_rfc3339()),
                    published_parsed: published.map(to_utc),
                    updated: Some(updated.to_rfc3339()),
                    updated_parsed: Some(to_utc(updated)),
                    content: entry
                        .content()
                        .and_then(|c| c.value().map(str::to_string)),
                    summary: entry.summary().map(|s| s.as_str().to_string()),
                }
            })
            .collect();

        Ok(ParsedFeed {
            title: Some(feed.title().as_str().to_string()),
            link: feed.links().first().map(|l| l.href().to_string()),
            entries,
        })
    }
}

fn to_utc(dt: DateTime<FixedOffset>) -> DateTime<Utc> {
    dt.with_timezone(&Utc)
}
