//! Source strategies: the site-specific knowledge of each blog.
//!
//! Each strategy has exactly one of two shapes:
//!
//! 1. **Index** ([`IndexStrategy`]): discover post URLs on an index page, then
//!    extract metadata from each fetched post page
//! 2. **Feed** ([`FeedStrategy`]): turn RSS/Atom items into entries, optionally
//!    followed by a paged JSON API pass (the hybrid case)
//!
//! Strategies are pure functions over fetched text; all networking, retrying
//! and deduplication lives in the orchestrator.
//!
//! # Supported Sources
//!
//! | Source | Module | Discovery | Notes |
//! |--------|--------|-----------|-------|
//! | Google Research | [`google_research`] | HTML index | Author and date from the hero line |
//! | AllThingsDistributed | [`all_things_distributed`] | HTML index | Five-step title fallback; author is Werner Vogels |
//! | Martin Kleppmann | [`kleppmann`] | HTML index | Archive list; author is Martin Kleppmann |
//! | Lyft Engineering | [`lyft_engineering`] | RSS | Medium feed |
//! | Meta Engineering | [`meta_engineering`] | RSS + JSON API | Strict feed validation, boilerplate removal |

use crate::config::HarvestConfig;
use crate::error::ScrapeError;
use crate::feed::RawFeedEntry;
use crate::models::{PostMetadata, UNTITLED};
use crate::paginated::ApiEndpoint;
use crate::utils::clean_text;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod all_things_distributed;
pub mod extract;
pub mod google_research;
pub mod kleppmann;
pub mod lyft_engineering;
pub mod meta_engineering;

use all_things_distributed::AllThingsDistributedStrategy;
use google_research::GoogleResearchStrategy;
use kleppmann::KleppmannStrategy;
use lyft_engineering::LyftEngineeringStrategy;
use meta_engineering::MetaEngineeringStrategy;

/// Strategy for sources discovered through an HTML index page.
pub trait IndexStrategy: Send + Sync {
    fn source_name(&self) -> &str;

    /// The index page listing posts. Discovered links resolve against it.
    fn index_url(&self) -> &Url;

    /// Absolute post URLs in document order.
    fn discover_links(&self, index_html: &str) -> Vec<String>;

    /// Extract a post. Missing fields degrade to defaults, never errors.
    fn extract_metadata(&self, post_html: &str, url: &str) -> PostMetadata;
}

/// Strategy for sources discovered through an RSS/Atom feed.
pub trait FeedStrategy: Send + Sync {
    fn source_name(&self) -> &str;

    fn feed_url(&self) -> &Url;

    /// Treat an empty feed or one missing channel title/link as a failure.
    fn strict_feed(&self) -> bool {
        false
    }

    /// Normalize a title or body fragment.
    fn clean_text(&self, raw: &str) -> String {
        clean_text(raw)
    }

    /// Paged API read after the feed, for hybrid sources.
    fn paginated_api(&self) -> Option<&ApiEndpoint> {
        None
    }

    /// Build metadata from a feed item.
    fn entry_from_feed(&self, raw: &RawFeedEntry) -> PostMetadata {
        let title = raw
            .title
            .as_deref()
            .map(|t| self.clean_text(t))
            .unwrap_or_default();
        PostMetadata {
            url: raw.url().unwrap_or_default().trim().to_string(),
            title,
            content: raw.body().map(|b| self.clean_text(b)).unwrap_or_default(),
            author: raw.author.as_deref().map(|a| a.trim().to_string()),
            published_at: Some(raw.resolve_timestamp()),
            source_name: self.source_name().to_string(),
        }
    }
}

/// The capability a source exposes.
#[derive(Clone)]
pub enum SourceStrategy {
    Index(Arc<dyn IndexStrategy>),
    Feed(Arc<dyn FeedStrategy>),
}

impl fmt::Debug for SourceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStrategy::Index(s) => f.debug_tuple("Index").field(&s.source_name()).finish(),
            SourceStrategy::Feed(s) => f.debug_tuple("Feed").field(&s.source_name()).finish(),
        }
    }
}

/// How a source's posts are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    HtmlIndex,
    Rss,
    /// RSS followed by a paged JSON API.
    Hybrid,
}

/// Static configuration of one source.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub name: String,
    pub strategy: SourceStrategy,
    /// Politeness interval for this source's host, if it differs from the default.
    pub min_interval: Option<Duration>,
}

impl SourceDescriptor {
    pub fn index(strategy: impl IndexStrategy + 'static) -> Self {
        Self {
            name: strategy.source_name().to_string(),
            strategy: SourceStrategy::Index(Arc::new(strategy)),
            min_interval: None,
        }
    }

    pub fn feed(strategy: impl FeedStrategy + 'static) -> Self {
        Self {
            name: strategy.source_name().to_string(),
            strategy: SourceStrategy::Feed(Arc::new(strategy)),
            min_interval: None,
        }
    }

    pub fn with_min_interval(mut self, interval: Option<Duration>) -> Self {
        self.min_interval = interval;
        self
    }

    /// Index page or feed URL.
    pub fn url(&self) -> &Url {
        match &self.strategy {
            SourceStrategy::Index(s) => s.index_url(),
            SourceStrategy::Feed(s) => s.feed_url(),
        }
    }

    /// Every URL this source fetches from directly.
    pub fn entry_points(&self) -> Vec<&Url> {
        match &self.strategy {
            SourceStrategy::Index(s) => vec![s.index_url()],
            SourceStrategy::Feed(s) => std::iter::once(s.feed_url())
                .chain(s.paginated_api().map(|api| &api.url))
                .collect(),
        }
    }

    pub fn mode(&self) -> DiscoveryMode {
        match &self.strategy {
            SourceStrategy::Index(_) => DiscoveryMode::HtmlIndex,
            SourceStrategy::Feed(s) if s.paginated_api().is_some() => DiscoveryMode::Hybrid,
            SourceStrategy::Feed(_) => DiscoveryMode::Rss,
        }
    }
}

/// Fixed, ordered set of known sources.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceDescriptor>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self { sources }
    }

    /// The built-in sources, with URLs and intervals overridden from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::InvalidSourceUrl`] if a configured URL does not parse.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, ScrapeError> {
        let url_for = |name: &str, default: &str| -> Result<Url, ScrapeError> {
            let raw = config
                .sources
                .get(name)
                .and_then(|o| o.url.as_deref())
                .unwrap_or(default);
            Url::parse(raw).map_err(|error| ScrapeError::InvalidSourceUrl {
                source_name: name.to_string(),
                url: raw.to_string(),
                error,
            })
        };
        let api_url_for = |name: &str, default: &str| -> Result<Url, ScrapeError> {
            let raw = config
                .sources
                .get(name)
                .and_then(|o| o.api_url.as_deref())
                .unwrap_or(default);
            Url::parse(raw).map_err(|error| ScrapeError::InvalidSourceUrl {
                source_name: name.to_string(),
                url: raw.to_string(),
                error,
            })
        };
        let interval_for = |name: &str| config.source_min_interval(name);

        let sources = vec![
            SourceDescriptor::index(GoogleResearchStrategy::new(url_for(
                google_research::SOURCE_NAME,
                google_research::INDEX_URL,
            )?))
            .with_min_interval(interval_for(google_research::SOURCE_NAME)),
            SourceDescriptor::index(AllThingsDistributedStrategy::new(url_for(
                all_things_distributed::SOURCE_NAME,
                all_things_distributed::INDEX_URL,
            )?))
            .with_min_interval(interval_for(all_things_distributed::SOURCE_NAME)),
            SourceDescriptor::index(KleppmannStrategy::new(url_for(
                kleppmann::SOURCE_NAME,
                kleppmann::INDEX_URL,
            )?))
            .with_min_interval(interval_for(kleppmann::SOURCE_NAME)),
            SourceDescriptor::feed(LyftEngineeringStrategy::new(url_for(
                lyft_engineering::SOURCE_NAME,
                lyft_engineering::FEED_URL,
            )?))
            .with_min_interval(interval_for(lyft_engineering::SOURCE_NAME)),
            SourceDescriptor::feed(MetaEngineeringStrategy::new(
                url_for(meta_engineering::SOURCE_NAME, meta_engineering::FEED_URL)?,
                api_url_for(meta_engineering::SOURCE_NAME, meta_engineering::API_URL)?,
            ))
            .with_min_interval(interval_for(meta_engineering::SOURCE_NAME)),
        ];
        Ok(Self { sources })
    }

    /// Look up a source by exact, then case-insensitive, name.
    pub fn get(&self, name: &str) -> Option<&SourceDescriptor> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }
}

/// Fall back to [`UNTITLED`] when no title source matched.
pub(crate) fn title_or_untitled(title: Option<String>) -> String {
    title.unwrap_or_else(|| UNTITLED.to_string())
}
