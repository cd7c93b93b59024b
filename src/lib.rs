//! # Blog Harvest
//!
//! Harvests posts from a fixed set of engineering and research blogs and
//! normalizes each into a [`BlogEntry`] for downstream search.
//!
//! ## Architecture
//!
//! 1. **Discovery**: each source is read through an HTML index page, an
//!    RSS/Atom feed, or a feed followed by a paged JSON API
//! 2. **Fetching**: every request goes through one [`HttpFetcher`] session with
//!    per-host rate limiting, jitter, a cookie warm-up and retries
//! 3. **Extraction**: a per-source strategy turns pages and feed items into
//!    metadata with prioritized fallbacks
//! 4. **Emission**: entries are validated, deduplicated by URL and streamed by
//!    the [`ScrapeOrchestrator`]
//!
//! ```no_run
//! use blog_harvest::{HarvestConfig, ScrapeOrchestrator};
//! use futures::StreamExt;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = ScrapeOrchestrator::from_config(&HarvestConfig::default())?;
//! let mut entries = orchestrator.entries("Martin Kleppmann", Some(5))?;
//! while let Some(entry) = entries.next().await {
//!     println!("{} {}", entry.url, entry.title);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod outputs;
pub mod paginated;
pub mod rate_limit;
pub mod scrapers;
pub mod utils;

pub use config::{HarvestConfig, SourceOverride, load_config};
pub use dedup::EntryDeduplicator;
pub use error::{
    ApiError, ConfigError, FeedError, FetchError, FetchErrorKind, ScrapeError, ValidationError,
};
pub use feed::{FeedReader, ParsedFeed, RawFeedEntry};
pub use fetch::{FetchSettings, HttpFetcher};
pub use models::{
    BlogEntry, Channel, FetchResult, PipelineStage, PostMetadata, RunReport, SkipReason,
    SkippedItem, SourceSummary,
};
pub use orchestrator::{OrchestratorSettings, ScrapeEvent, ScrapeOrchestrator};
pub use paginated::{ApiEndpoint, ApiPage, PaginatedApiReader};
pub use rate_limit::RateLimiter;
pub use scrapers::{
    DiscoveryMode, FeedStrategy, IndexStrategy, SourceDescriptor, SourceRegistry, SourceStrategy,
};
