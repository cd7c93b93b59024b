//! Google Research blog strategy.
//!
//! Index cards are `a.glue-card` anchors. Post pages carry a hero line such as
//! `March 15, 2024, Jane Doe, Research Scientist, Google Research`, which is
//! the fallback for both date and author.

use super::extract::{
    discover_links, first_attr, first_text, meta_content, paragraphs, parse_date_text,
    parse_iso_datetime, text_lines, title_tag,
};
use super::{IndexStrategy, title_or_untitled};
use crate::models::PostMetadata;
use crate::utils::collapse_whitespace;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

pub const SOURCE_NAME: &str = "Google Research";
pub const INDEX_URL: &str = "https://research.google/blog/";

const VISIBLE_DATE_FORMAT: &str = "%B %d, %Y";
const TITLE_SUFFIX: &str = " - Google Research";

static POST_CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("a.glue-card").unwrap());
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static HERO: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.basic-hero__description").unwrap());
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse(".author").unwrap());
static RICH_TEXT: Lazy<Selector> = Lazy::new(|| Selector::parse("div.rich-text").unwrap());
static INTRO: Lazy<Selector> = Lazy::new(|| Selector::parse("div.component-intro").unwrap());
static SUMMARY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.blog-summary__summary").unwrap());
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static HERO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z][a-z]+ \d{1,2}, \d{4})").unwrap());

#[derive(Debug, Clone)]
pub struct GoogleResearchStrategy {
    index_url: Url,
}

impl GoogleResearchStrategy {
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }
}

/// Date and author from the hero description line.
fn parse_hero(text: &str) -> (Option<DateTime<Utc>>, Option<String>) {
    let text = collapse_whitespace(text);
    let Some(found) = HERO_DATE.find(&text) else {
        return (None, None);
    };
    let Some(date) = parse_date_text(found.as_str(), VISIBLE_DATE_FORMAT) else {
        return (None, None);
    };
    let author = text[found.end()..]
        .trim()
        .trim_start_matches(',')
        .split(',')
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);
    (Some(date), author)
}

impl IndexStrategy for GoogleResearchStrategy {
    fn source_name(&self) -> &str {
        SOURCE_NAME
    }

    fn index_url(&self) -> &Url {
        &self.index_url
    }

    fn discover_links(&self, index_html: &str) -> Vec<String> {
        discover_links(index_html, &POST_CARD, &self.index_url)
    }

    fn extract_metadata(&self, post_html: &str, url: &str) -> PostMetadata {
        let document = Html::parse_document(post_html);

        let title = meta_content(&document, &OG_TITLE)
            .or_else(|| first_text(&document, &H1))
            .or_else(|| {
                title_tag(&document).map(|t| {
                    t.strip_suffix(TITLE_SUFFIX)
                        .map(str::to_string)
                        .unwrap_or(t)
                })
            });

        let (hero_date, hero_author) = first_text(&document, &HERO)
            .map(|hero| parse_hero(&hero))
            .unwrap_or((None, None));

        let published_at = first_attr(&document, &TIME, "datetime")
            .and_then(|dt| parse_iso_datetime(&dt))
            .or_else(|| {
                first_text(&document, &TIME)
                    .and_then(|t| parse_date_text(&t, VISIBLE_DATE_FORMAT))
            })
            .or(hero_date);

        let author = hero_author.or_else(|| first_text(&document, &AUTHOR));

        let mut sections: Vec<String> = [&*RICH_TEXT, &*INTRO, &*SUMMARY]
            .into_iter()
            .flat_map(|selector| document.select(selector).map(text_lines))
            .filter(|s| !s.is_empty())
            .collect();
        if sections.is_empty() {
            sections = document
                .select(&ARTICLE)
                .map(|article| paragraphs(article, &PARAGRAPH))
                .filter(|s| !s.is_empty())
                .collect();
        }

        PostMetadata {
            url: url.to_string(),
            title: title_or_untitled(title),
            content: sections.join("\n\n"),
            author,
            published_at,
            source_name: SOURCE_NAME.to_string(),
        }
    }
}
