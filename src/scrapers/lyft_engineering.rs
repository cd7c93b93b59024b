//! Lyft Engineering, read from its Medium RSS feed.

use super::FeedStrategy;
use url::Url;

pub const SOURCE_NAME: &str = "Lyft Engineering";
pub const FEED_URL: &str = "https://medium.com/feed/lyft-engineering";

#[derive(Debug, Clone)]
pub struct LyftEngineeringStrategy {
    feed_url: Url,
}

impl LyftEngineeringStrategy {
    pub fn new(feed_url: Url) -> Self {
        Self { feed_url }
    }
}

impl FeedStrategy for LyftEngineeringStrategy {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn feed_url(&self) -> &Url {
        &self.feed_url
    }
}
