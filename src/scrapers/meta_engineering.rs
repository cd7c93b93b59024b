//! Meta Engineering: RSS feed first, then the WordPress REST API.
//!
//! The feed is validated strictly and its bodies carry WordPress boilerplate
//! (`Read More...`, `The post X appeared first on Engineering at Meta.`),
//! which is removed before entries are built.

use super::FeedStrategy;
use crate::paginated::ApiEndpoint;
use crate::utils::{clean_text, collapse_whitespace};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub const SOURCE_NAME: &str = "Meta Engineering";
pub const FEED_URL: &str = "https://code.facebook.com/posts/rss/";
pub const API_URL: &str = "https://engineering.fb.com/wp-json/wp/v2/posts";

const READ_MORE: &str = "Read More...";

static APPEARED_FIRST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"The post .*? appeared first on Engineering at Meta\.?").unwrap());

#[derive(Debug, Clone)]
pub struct MetaEngineeringStrategy {
    feed_url: Url,
    api: ApiEndpoint,
}

impl MetaEngineeringStrategy {
    pub fn new(feed_url: Url, api_url: Url) -> Self {
        Self {
            feed_url,
            api: ApiEndpoint::wordpress(api_url),
        }
    }
}

impl FeedStrategy for MetaEngineeringStrategy {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    fn strict_feed(&self) -> bool {
        true
    }

    fn clean_text(&self, raw: &str) -> String {
        let text = clean_text(raw).replace(READ_MORE, "");
        collapse_whitespace(&APPEARED_FIRST.replace_all(&text, ""))
    }

    fn paginated_api(&self) -> Option<&ApiEndpoint> {
        Some(&self.api)
    }
}
