//! Error types for the harvesting pipeline.
//!
//! Errors are layered by the scope they abort:
//! - [`FetchError`]: one HTTP request (after retries) failed
//! - [`FeedError`] / [`ApiError`]: one feed document or one API page could not be used
//! - [`ValidationError`]: one extracted entry was unusable and is dropped
//! - [`ScrapeError`]: one source's pipeline cannot run at all
//! - [`ConfigError`]: the configuration file could not be loaded
//!
//! Nothing in this module is fatal to a whole run; the orchestrator turns each of
//! these into a logged skip or a per-source failure.

use thiserror::Error;

/// Coarse classification of a [`FetchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Http,
    Network,
}

/// Failure of a single fetch, returned once retries are exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The server answered with a non-success status (after redirects).
    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    /// Connection failure, invalid URL, body read failure or exhausted retries.
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
}

/// HTTP statuses that are worth retrying.
pub const TRANSIENT_STATUSES: [u16; 4] = [500, 502, 503, 504];

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout { .. } => FetchErrorKind::Timeout,
            FetchError::Http { .. } => FetchErrorKind::Http,
            FetchError::Network { .. } => FetchErrorKind::Network,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Http { url, .. }
            | FetchError::Network { url, .. } => url,
        }
    }

    /// Transient failures: timeouts, connection errors and 5xx gateway statuses.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Network { .. } => true,
            FetchError::Http { status, .. } => TRANSIENT_STATUSES.contains(status),
        }
    }

    /// Convert the last transient failure into the terminal error reported
    /// once the retry budget is spent.
    pub(crate) fn exhausted(self, retries: usize) -> FetchError {
        match self {
            FetchError::Http { url, status } => FetchError::Network {
                url,
                message: format!("max retries ({retries}) exceeded, last status {status}"),
            },
            other => other,
        }
    }
}

/// A feed document that could not be turned into entries.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("document is neither RSS ({rss}) nor Atom ({atom})")]
    Unparseable { rss: String, atom: String },

    #[error("feed has no entries")]
    Empty,

    #[error("feed is missing required channel fields (title or link)")]
    MissingChannelFields,
}

/// One page of a paginated JSON API that could not be used.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("page {page} is not a JSON post array: {source}")]
    Json {
        page: u32,
        #[source]
        source: serde_json::Error,
    },
}

/// An extracted entry that is dropped instead of emitted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entry has no URL")]
    EmptyUrl,

    #[error("entry {url} has no title")]
    MissingTitle { url: String },

    #[error("entry {url} has no content after cleaning")]
    EmptyContent { url: String },
}

/// Failure that aborts one source's pipeline (never the whole run).
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("invalid URL {url} for source {source_name}: {error}")]
    InvalidSourceUrl {
        source_name: String,
        url: String,
        #[source]
        error: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The configuration file could not be read or parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
