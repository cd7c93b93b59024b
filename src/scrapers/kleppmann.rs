//! Martin Kleppmann's blog strategy.

use super::extract::{discover_links, first_text, parse_date_text, text_lines, title_tag};
use super::{IndexStrategy, title_or_untitled};
use crate::models::PostMetadata;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

pub const SOURCE_NAME: &str = "Martin Kleppmann";
pub const INDEX_URL: &str = "https://martin.kleppmann.com/";

const AUTHOR: &str = "Martin Kleppmann";
const DATE_FORMAT: &str = "%d %B %Y";

static ARCHIVE_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse("li.archive-item").unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse("div.date").unwrap());
static POST: Lazy<Selector> = Lazy::new(|| Selector::parse("div.post").unwrap());

#[derive(Debug, Clone)]
pub struct KleppmannStrategy {
    index_url: Url,
}

impl KleppmannStrategy {
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }
}

impl IndexStrategy for KleppmannStrategy {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn index_url(&self) -> &Url {
        &self.index_url
    }

    fn discover_links(&self, index_html: &str) -> Vec<String> {
        discover_links(index_html, &ARCHIVE_ITEM, &self.index_url)
    }

    fn extract_metadata(&self, post_html: &str, url: &str) -> PostMetadata {
        let document = Html::parse_document(post_html);

        let title = first_text(&document, &H1).or_else(|| title_tag(&document));
        let published_at =
            first_text(&document, &DATE).and_then(|d| parse_date_text(&d, DATE_FORMAT));
        let content = document
            .select(&POST)
            .next()
            .map(text_lines)
            .unwrap_or_default();

        PostMetadata {
            url: url.to_string(),
            title: title_or_untitled(title),
            content,
            author: Some(AUTHOR.to_string()),
            published_at,
            source_name: SOURCE_NAME.to_string(),
        }
    }
}
