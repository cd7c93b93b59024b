//! Paged JSON API reader (WordPress REST style).
//!
//! The endpoint is queried with `?page=N&per_page=M`; the total page count is
//! read from a response header (`X-WP-TotalPages` for WordPress). Pages are
//! walked forward while `page < total_pages` and `page < page_cap`, so one run
//! never reads more than `page_cap` pages regardless of what the server claims.

use crate::error::ApiError;
use crate::fetch::HttpFetcher;
use crate::models::PostMetadata;
use crate::utils::truncate_for_log;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{self, Stream};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Pages read per run unless configured otherwise.
pub const DEFAULT_PAGE_CAP: u32 = 5;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const WORDPRESS_TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

/// Where a source's paged API lives.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    pub url: Url,
    /// Response header carrying the total page count.
    pub total_pages_header: String,
}

impl ApiEndpoint {
    pub fn wordpress(url: Url) -> Self {
        Self {
            url,
            total_pages_header: WORDPRESS_TOTAL_PAGES_HEADER.to_string(),
        }
    }

    fn page_url(&self, page: u32, page_size: u32) -> String {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &page_size.to_string());
        url.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Embedded {
    #[serde(default)]
    pub author: Vec<EmbeddedAuthor>,
}

/// One post as returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawApiPost {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub title: Rendered,
    #[serde(default)]
    pub content: Rendered,
    #[serde(default)]
    pub excerpt: Rendered,
    /// `YYYY-MM-DDTHH:MM:SS` in UTC.
    pub date_gmt: Option<String>,
    /// Same format, site-local time.
    pub date: Option<String>,
    #[serde(rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

impl RawApiPost {
    /// Normalize into metadata, cleaning title and content with `clean`.
    pub fn into_metadata(self, source_name: &str, clean: impl Fn(&str) -> String) -> PostMetadata {
        let published_at = self
            .date_gmt
            .as_deref()
            .or(self.date.as_deref())
            .and_then(parse_wordpress_date);
        let body = if self.content.rendered.trim().is_empty() {
            &self.excerpt.rendered
        } else {
            &self.content.rendered
        };
        let author = self
            .embedded
            .as_ref()
            .and_then(|e| e.author.first())
            .map(|a| a.name.trim().to_string())
            .filter(|n| !n.is_empty());

        PostMetadata {
            url: self.link.trim().to_string(),
            title: clean(&self.title.rendered),
            content: clean(body),
            author,
            published_at,
            source_name: source_name.to_string(),
        }
    }
}

fn parse_wordpress_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

/// One fetched page.
#[derive(Debug, Clone)]
pub struct ApiPage {
    pub page: u32,
    pub total_pages: u32,
    pub posts: Vec<RawApiPost>,
    /// Array elements that did not deserialize as posts.
    pub malformed: usize,
}

/// Continue past `page`?
pub fn should_continue(page: u32, total_pages: u32, page_cap: u32) -> bool {
    page < total_pages && page < page_cap
}

#[derive(Debug)]
pub struct PaginatedApiReader {
    fetcher: Arc<HttpFetcher>,
    endpoint: ApiEndpoint,
    page_size: u32,
    page_cap: u32,
}

struct WalkState {
    next: u32,
    known_total: u32,
    done: bool,
}

impl PaginatedApiReader {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        endpoint: ApiEndpoint,
        page_size: u32,
        page_cap: u32,
    ) -> Self {
        Self {
            fetcher,
            endpoint,
            page_size: page_size.max(1),
            page_cap,
        }
    }

    /// Fetch one page.
    ///
    /// A missing or unparseable total-pages header is treated as "this is the
    /// last page".
    ///
    /// # Errors
    ///
    /// [`ApiError::Fetch`] if the request fails, [`ApiError::Json`] if the
    /// body is not a JSON array.
    #[instrument(level = "info", skip(self), fields(endpoint = %self.endpoint.url))]
    pub async fn fetch_page(&self, page: u32, page_size: u32) -> Result<ApiPage, ApiError> {
        let url = self.endpoint.page_url(page, page_size);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let result = self.fetcher.fetch(&url, Some(&headers)).await?;
        let total_pages = result
            .headers
            .get(self.endpoint.total_pages_header.as_str())
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(page);

        let values: Vec<serde_json::Value> =
            serde_json::from_str(&result.body).map_err(|source| {
                warn!(
                    page,
                    body_preview = %truncate_for_log(&result.body, 200),
                    "API page is not a post array"
                );
                ApiError::Json { page, source }
            })?;
        let mut posts = Vec::with_capacity(values.len());
        let mut malformed = 0;
        for value in values {
            match serde_json::from_value::<RawApiPost>(value) {
                Ok(post) => posts.push(post),
                Err(e) => {
                    malformed += 1;
                    warn!(page, error = %e, "Skipping malformed API post");
                }
            }
        }

        info!(page, total_pages, count = posts.len(), malformed, "Fetched API page");
        Ok(ApiPage {
            page,
            total_pages,
            posts,
            malformed,
        })
    }

    /// Lazily walk pages from 1 up to the cap.
    ///
    /// A failed page is yielded as an error and the walk continues if the last
    /// known page count allows it; a failure before any count is known ends it.
    pub fn pages(&self) -> impl Stream<Item = Result<ApiPage, ApiError>> + '_ {
        let initial = WalkState {
            next: 1,
            known_total: 1,
            done: self.page_cap == 0,
        };
        stream::unfold(initial, move |mut state| async move {
            if state.done {
                return None;
            }
            let page = state.next;
            let result = self.fetch_page(page, self.page_size).await;
            if let Ok(fetched) = &result {
                state.known_total = fetched.total_pages;
            }
            state.done = !should_continue(page, state.known_total, self.page_cap);
            state.next = page + 1;
            if state.done {
                debug!(page, total = state.known_total, cap = self.page_cap, "Pagination finished");
            }
            Some((result, state))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchSettings;
    use crate::rate_limit::RateLimiter;
    use crate::utils::clean_text;
    use chrono::TimeZone;
    use futures::StreamExt;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn reader(server: &MockServer, cap: u32) -> PaginatedApiReader {
        let fetcher =
            HttpFetcher::new(FetchSettings::immediate(), RateLimiter::new(Duration::ZERO)).unwrap();
        let url = Url::parse(&format!("{}/wp-json/wp/v2/posts", server.uri())).unwrap();
        PaginatedApiReader::new(Arc::new(fetcher), ApiEndpoint::wordpress(url), 2, cap)
    }

    fn post_json(n: u32) -> serde_json::Value {
        serde_json::json!({
            "link": format!("https://engineering.example.com/post-{n}"),
            "title": {"rendered": format!("Post {n}")},
            "content": {"rendered": format!("<p>Body {n}</p>")},
            "date_gmt": "2024-04-15T10:00:00"
        })
    }

    #[test]
    fn test_should_continue_respects_cap() {
        assert!(should_continue(1, 3, 5));
        assert!(!should_continue(3, 3, 5));
        assert!(!should_continue(5, 12, 5));
        assert!(should_continue(4, 12, 5));
    }

    #[test]
    fn test_page_url_has_query() {
        let endpoint = ApiEndpoint::wordpress(
            Url::parse("https://engineering.fb.com/wp-json/wp/v2/posts").unwrap(),
        );
        assert_eq!(
            endpoint.page_url(2, 20),
            "https://engineering.fb.com/wp-json/wp/v2/posts?page=2&per_page=20"
        );
    }

    #[test]
    fn test_into_metadata_cleans_and_parses() {
        let post: RawApiPost = serde_json::from_value(serde_json::json!({
            "link": "https://engineering.example.com/a",
            "title": {"rendered": "Scaling &amp; <em>things</em>"},
            "content": {"rendered": ""},
            "excerpt": {"rendered": "<p>Excerpt text</p>"},
            "date_gmt": "2024-04-15T10:00:00",
            "_embedded": {"author": [{"name": "Alex"}]}
        }))
        .unwrap();

        let meta = post.into_metadata("Example", clean_text);
        assert_eq!(meta.title, "Scaling & things");
        assert_eq!(meta.content, "Excerpt text");
        assert_eq!(meta.author.as_deref(), Some("Alex"));
        assert_eq!(
            meta.published_at,
            Some(Utc.with_ymd_and_hms(2024, 4, 15, 10, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_fetch_page_reads_total_and_skips_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "3")
                    .set_body_json(serde_json::json!([post_json(1), {"link": 42}])),
            )
            .mount(&server)
            .await;

        let page = reader(&server, 5).fetch_page(1, 2).await.unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.malformed, 1);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "12")
                    .set_body_json(serde_json::json!([post_json(1)])),
            )
            .mount(&server)
            .await;

        let reader = reader(&server, 5);
        let pages: Vec<_> = reader.pages().collect().await;
        assert_eq!(pages.len(), 5);
        assert_eq!(pages.last().unwrap().as_ref().unwrap().page, 5);
        assert_eq!(server.received_requests().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_total_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "2")
                    .set_body_json(serde_json::json!([post_json(1), post_json(2)])),
            )
            .mount(&server)
            .await;

        let reader = reader(&server, 5);
        let pages: Vec<_> = reader.pages().collect().await;
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_first_page_ends_walk() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let reader = reader(&server, 5);
        let pages: Vec<_> = reader.pages().collect().await;
        assert_eq!(pages.len(), 1);
        assert!(matches!(pages[0], Err(ApiError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_failed_middle_page_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/posts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "3")
                    .set_body_json(serde_json::json!([post_json(1)])),
            )
            .mount(&server)
            .await;

        let reader = reader(&server, 5);
        let pages: Vec<_> = reader.pages().collect().await;
        assert_eq!(pages.len(), 3);
        assert!(pages[0].is_ok());
        assert!(matches!(pages[1], Err(ApiError::Json { page: 2, .. })));
        assert!(pages[2].is_ok());
    }
}
