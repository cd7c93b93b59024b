//! AllThingsDistributed (Werner Vogels) strategy.

use super::extract::{
    discover_links, first_text, json_ld_headline, meta_content, paragraphs, parse_date_text,
    parse_iso_datetime, title_tag,
};
use super::{IndexStrategy, title_or_untitled};
use crate::models::PostMetadata;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

pub const SOURCE_NAME: &str = "AllThingsDistributed";
pub const INDEX_URL: &str = "https://www.allthingsdistributed.com/articles.html";

const AUTHOR: &str = "Werner Vogels";
const VISIBLE_DATE_FORMAT: &str = "%B %d, %Y";
const TITLE_SEPARATOR: &str = " | ";

static BLOG_POST: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[itemprop="blogPost"]"#).unwrap());
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static ITEMPROP_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[itemprop="name"]"#).unwrap());
static PUBLISHED_TIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="article:published_time"]"#).unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static POST_CONTENT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.post-content").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

#[derive(Debug, Clone)]
pub struct AllThingsDistributedStrategy {
    index_url: Url,
}

impl AllThingsDistributedStrategy {
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }
}

impl IndexStrategy for AllThingsDistributedStrategy {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn index_url(&self) -> &Url {
        &self.index_url
    }

    fn discover_links(&self, index_html: &str) -> Vec<String> {
        discover_links(index_html, &BLOG_POST, &self.index_url)
    }

    fn extract_metadata(&self, post_html: &str, url: &str) -> PostMetadata {
        let document = Html::parse_document(post_html);

        // og:title, itemprop name, JSON-LD headline, h1, then <title> up to " | "
        let title = meta_content(&document, &OG_TITLE)
            .or_else(|| meta_content(&document, &ITEMPROP_NAME))
            .or_else(|| json_ld_headline(&document))
            .or_else(|| first_text(&document, &H1))
            .or_else(|| {
                title_tag(&document)
                    .and_then(|t| t.split(TITLE_SEPARATOR).next().map(|s| s.trim().to_string()))
                    .filter(|t| !t.is_empty())
            });

        let published_at = meta_content(&document, &PUBLISHED_TIME)
            .and_then(|raw| parse_iso_datetime(&raw))
            .or_else(|| {
                first_text(&document, &TIME).and_then(|t| parse_date_text(&t, VISIBLE_DATE_FORMAT))
            });

        let content = document
            .select(&ARTICLE)
            .next()
            .or_else(|| document.select(&POST_CONTENT).next())
            .map(|body| paragraphs(body, &PARAGRAPH))
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Utc};

    const POST_URL: &str = "https://www.allthingsdistributed.com/test-post";

    fn strategy() -> AllThingsDistributedStrategy {
        AllThingsDistributedStrategy::new(Url::parse(INDEX_URL).unwrap())
    }

    fn title_of(html: &str) -> String {
        strategy().extract_metadata(html, POST_URL).title
    }

    #[test]
    fn test_discover_links() {
        let html = r#"
            <html><body>
                <div itemprop="blogPost"><a href="/2024/01/test-post-1">Post 1</a></div>
                <div itemprop="blogPost"><a href="/2024/02/test-post-2">Post 2</a></div>
                <div class="not-a-blog-post"><a href="/about">About</a></div>
            </body></html>"#;
        assert_eq!(
            strategy().discover_links(html),
            vec![
                "https://www.allthingsdistributed.com/2024/01/test-post-1",
                "https://www.allthingsdistributed.com/2024/02/test-post-2"
            ]
        );
    }

    #[test]
    fn test_extract_metadata() {
        let html = r#"
            <html><body>
                <h1>Test Blog Post Title</h1>
                <time>April 09, 2024</time>
                <article>
                    <p>This is the first paragraph.</p>
                    <p>This is the second paragraph.</p>
                </article>
            </body></html>"#;
        let meta = strategy().extract_metadata(html, POST_URL);

        assert_eq!(meta.url, POST_URL);
        assert_eq!(meta.title, "Test Blog Post Title");
        assert_eq!(meta.author.as_deref(), Some("Werner Vogels"));
        assert_eq!(meta.source_name, "AllThingsDistributed");
        let date = meta.published_at.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 4, 9));
        assert_eq!(
            meta.content,
            "This is the first paragraph.\nThis is the second paragraph."
        );
    }

    #[test]
    fn test_extract_metadata_missing_fields() {
        let html = r#"
            <html><body>
                <h1>Test Title</h1>
                <div class="post-content"><p>Some content</p></div>
            </body></html>"#;
        let meta = strategy().extract_metadata(html, POST_URL);

        assert_eq!(meta.title, "Test Title");
        assert_eq!(meta.author.as_deref(), Some("Werner Vogels"));
        assert_eq!(meta.published_at, None);
        assert!(meta.content.contains("Some content"));
    }

    #[test]
    fn test_published_time_meta_preferred() {
        let html = r#"
            <html><head>
                <meta property="article:published_time" content="2023-11-02T08:00:00+00:00">
            </head><body><h1>T</h1><time>April 09, 2024</time></body></html>"#;
        assert_eq!(
            strategy().extract_metadata(html, POST_URL).published_at,
            Some(Utc.with_ymd_and_hms(2023, 11, 2, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_each_title_source() {
        let body = r#"<body><div class="post-content"><p>Some content</p></div></body>"#;
        assert_eq!(
            title_of(&format!(
                r#"<html><head><meta property="og:title" content="OG Title Test"></head>{body}</html>"#
            )),
            "OG Title Test"
        );
        assert_eq!(
            title_of(&format!(
                r#"<html><head><meta itemprop="name" content="Schema.org Title Test"></head>{body}</html>"#
            )),
            "Schema.org Title Test"
        );
        assert_eq!(
            title_of(&format!(
                r#"<html><head><script type="application/ld+json">{{ "headline": "JSON-LD Title Test" }}</script></head>{body}</html>"#
            )),
            "JSON-LD Title Test"
        );
        assert_eq!(
            title_of(&format!(
                "<html><head><title>Title Tag Test | All Things Distributed</title></head>{body}</html>"
            )),
            "Title Tag Test"
        );
        assert_eq!(title_of(&format!("<html>{body}</html>")), "Untitled");
    }

    #[test]
    fn test_title_priority() {
        let html = r#"
            <html><head>
                <meta property="og:title" content="OG Title">
                <meta itemprop="name" content="Schema.org Title">
                <script type="application/ld+json">{"headline": "JSON-LD Title"}</script>
                <title>Title Tag | All Things Distributed</title>
            </head><body>
                <h1>H1 Title</h1>
                <div class="post-content"><p>Some content</p></div>
            </body></html>"#;
        assert_eq!(title_of(html), "OG Title");

        let without_og = html.replace(r#"<meta property="og:title" content="OG Title">"#, "");
        assert_eq!(title_of(&without_og), "Schema.org Title");
    }
}
