//! Extraction helpers shared by the HTML strategies.
//!
//! Every helper returns `Option` (or an empty string) instead of failing, so a
//! strategy can chain them with `or_else` into its own fallback order.

use crate::utils::collapse_whitespace;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static A_HREF: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static JSON_LD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Collect one absolute link per `container` match.
///
/// A container that is itself an anchor contributes its own `href`; otherwise
/// its first descendant `a[href]` is used. Empty and unresolvable hrefs are
/// dropped.
pub fn discover_links(html: &str, container: &Selector, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for element in document.select(container) {
        let href = element
            .value()
            .attr("href")
            .or_else(|| {
                element
                    .select(&A_HREF)
                    .next()
                    .and_then(|a| a.value().attr("href"))
            })
            .map(str::trim)
            .filter(|h| !h.is_empty());

        let Some(href) = href else {
            continue;
        };
        match base.join(href) {
            Ok(resolved) => links.push(resolved.to_string()),
            Err(e) => debug!(href, error = %e, "Skipping unresolvable link"),
        }
    }
    links
}

/// Whitespace-normalized text of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Text nodes of an element, trimmed, one per line.
pub fn text_lines(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .join("\n")
}

/// Text of every `paragraph` match under `element`, one paragraph per line.
pub fn paragraphs(element: ElementRef<'_>, paragraph: &Selector) -> String {
    element
        .select(paragraph)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .join("\n")
}

/// Non-empty `content` attribute of the first match.
pub fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

/// Non-empty text of the first match.
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Non-empty value of `attr` on the first match carrying it.
pub fn first_attr(document: &Html, selector: &Selector, attr: &str) -> Option<String> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// The `<title>` text.
pub fn title_tag(document: &Html) -> Option<String> {
    first_text(document, &TITLE)
}

/// `headline` of the first JSON-LD block that has one.
///
/// Malformed JSON is skipped; arrays and `@graph` wrappers are searched.
pub fn json_ld_headline(document: &Html) -> Option<String> {
    document.select(&JSON_LD).find_map(|script| {
        let raw = script.text().collect::<String>();
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => headline_in(&value),
            Err(e) => {
                debug!(error = %e, "Ignoring malformed JSON-LD block");
                None
            }
        }
    })
}

fn headline_in(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => map
            .get("headline")
            .and_then(|h| h.as_str())
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(|| map.get("@graph").and_then(headline_in)),
        serde_json::Value::Array(items) => items.iter().find_map(headline_in),
        _ => None,
    }
}

/// Parse a visible date such as `April 09, 2024` with a site-specific format.
/// The result is midnight UTC of that day.
pub fn parse_date_text(text: &str, format: &str) -> Option<DateTime<Utc>> {
    let text = collapse_whitespace(text);
    NaiveDate::parse_from_str(&text, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Parse a machine-readable timestamp (RFC 3339, or a bare ISO date/time).
pub fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| parse_date_text(raw, "%Y-%m-%d"))
}
