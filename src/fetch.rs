//! HTTP fetching with session continuity, jitter and exponential backoff.
//!
//! [`HttpFetcher`] wraps one `reqwest` client with a cookie store, so every
//! request made through the same fetcher shares cookies and keep-alive
//! connections. A top-level [`HttpFetcher::fetch`] call:
//!
//! 1. sleeps a random jitter (1–3 s by default) to avoid a machine-like cadence
//! 2. optionally issues a warm-up GET to pick up cookies
//! 3. issues the real GET, retrying transient failures with exponential backoff
//!
//! Every outbound request, retries included, first passes through the
//! [`RateLimiter`] keyed on the URL's host.
//!
//! # Retry Strategy
//!
//! - Up to 3 retries (4 attempts total)
//! - Backoff of 0.5 s, 1 s, 2 s
//! - Only timeouts, connection failures and HTTP 500/502/503/504 are retried

use crate::error::FetchError;
use crate::models::FetchResult;
use crate::rate_limit::RateLimiter;
use rand::{Rng, rng};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// Desktop browser user agent sent by default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Tunables for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// First backoff delay; doubles on every retry.
    pub backoff_base: Duration,
    /// Random pre-request delay range (inclusive).
    pub jitter_min: Duration,
    pub jitter_max: Duration,
    /// Issue a cookie-collecting GET before the real one.
    pub warm_up: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
            warm_up: true,
        }
    }
}

impl FetchSettings {
    /// No jitter, no warm-up and millisecond backoff.
    #[cfg(test)]
    pub(crate) fn immediate() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(1),
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
            warm_up: false,
            ..Self::default()
        }
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers
}

/// Shared HTTP session used by every pipeline of one orchestrator.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    rate_limiter: RateLimiter,
    settings: FetchSettings,
}

impl HttpFetcher {
    /// Build a fetcher with its own cookie-enabled client.
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized or the user agent is not
    /// a valid header value.
    pub fn new(
        settings: FetchSettings,
        rate_limiter: RateLimiter,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(settings.user_agent.as_str())
            .default_headers(browser_headers())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            rate_limiter,
            settings,
        })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch `url`, applying jitter, warm-up, rate limiting and retries.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Http`] immediately for non-retryable statuses (4xx, ...)
    /// - [`FetchError::Network`] once retries are exhausted on 5xx or connection errors
    /// - [`FetchError::Timeout`] once retries are exhausted on timeouts
    #[instrument(level = "info", skip(self, extra_headers))]
    pub async fn fetch(
        &self,
        url: &str,
        extra_headers: Option<&HeaderMap>,
    ) -> Result<FetchResult, FetchError> {
        let key = rate_limit_key(url)?;
        let total_t0 = Instant::now();

        self.jitter().await;
        if self.settings.warm_up {
            self.warm_up(&key, url, extra_headers).await;
        }

        let mut retries = 0usize;
        loop {
            self.rate_limiter.wait(&key).await;
            let attempt_t0 = Instant::now();
            match self.send_once(url, extra_headers).await {
                Ok(result) => {
                    debug!(
                        status = result.status,
                        final_url = %result.final_url,
                        bytes = result.body.len(),
                        retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "Fetched"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && retries < self.settings.max_retries => {
                    retries += 1;
                    let delay = self.backoff_delay(retries);
                    warn!(
                        attempt = retries,
                        max = self.settings.max_retries,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        ?delay,
                        error = %e,
                        "Fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    error!(
                        retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        error = %e,
                        "Fetch exhausted retries"
                    );
                    return Err(e.exhausted(retries));
                }
                Err(e) => {
                    warn!(error = %e, "Fetch failed without retry");
                    return Err(e);
                }
            }
        }
    }

    /// `base * 2^(retry - 1)`: 0.5 s, 1 s, 2 s with the default base.
    fn backoff_delay(&self, retry: usize) -> Duration {
        let exponent = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX).min(16);
        self.settings.backoff_base.saturating_mul(1 << exponent)
    }

    async fn jitter(&self) {
        let delay = self.jitter_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// Random pause in `jitter_min..=jitter_max`, zero when the range is empty.
    fn jitter_delay(&self) -> Duration {
        let (min, max) = (self.settings.jitter_min, self.settings.jitter_max);
        if max.is_zero() || max < min {
            return Duration::ZERO;
        }
        let ms: u64 = rng().random_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    /// Best-effort GET whose only purpose is to populate the cookie store.
    async fn warm_up(&self, key: &str, url: &str, extra_headers: Option<&HeaderMap>) {
        self.rate_limiter.wait(key).await;
        let mut request = self.client.get(url);
        if let Some(headers) = extra_headers {
            request = request.headers(headers.clone());
        }
        match request.send().await {
            Ok(resp) => debug!(status = resp.status().as_u16(), "Warm-up request done"),
            Err(e) => debug!(error = %e, "Warm-up request failed; continuing"),
        }
    }

    async fn send_once(
        &self,
        url: &str,
        extra_headers: Option<&HeaderMap>,
    ) -> Result<FetchResult, FetchError> {
        let mut request = self.client.get(url);
        if let Some(headers) = extra_headers {
            request = request.headers(headers.clone());
        }
        let response = request.send().await.map_err(|e| transport_error(url, &e))?;
        read_response(url, response).await
    }
}

async fn read_response(url: &str, response: Response) -> Result<FetchResult, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let final_url = response.url().to_string();
    let headers = response.headers().clone();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(url, &e))?;
    Ok(FetchResult {
        status: status.as_u16(),
        body,
        final_url,
        headers,
    })
}

fn transport_error(url: &str, e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

/// Requests are throttled per host.
fn rate_limit_key(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Network {
        url: url.to_string(),
        message: format!("invalid URL: {e}"),
    })?;
    let host = parsed.host_str().unwrap_or_default();
    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Host key used by the rate limiter for `url`, if it parses.
pub fn host_key(url: &str) -> Option<String> {
    rate_limit_key(url).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(settings: FetchSettings) -> HttpFetcher {
        HttpFetcher::new(settings, RateLimiter::new(Duration::ZERO)).unwrap()
    }

    #[test]
    fn test_jitter_delay_stays_in_range() {
        let fetcher = fetcher(FetchSettings {
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(30),
            ..FetchSettings::immediate()
        });
        for _ in 0..50 {
            let delay = fetcher.jitter_delay();
            assert!(delay >= Duration::from_millis(10), "{delay:?} below range");
            assert!(delay <= Duration::from_millis(30), "{delay:?} above range");
        }
    }

    #[tokio::test]
    async fn test_jitter_waits_before_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = fetcher(FetchSettings {
            jitter_min: Duration::from_millis(25),
            jitter_max: Duration::from_millis(40),
            ..FetchSettings::immediate()
        });
        let t0 = std::time::Instant::now();
        fetcher
            .fetch(&format!("{}/slow", server.uri()), None)
            .await
            .unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_empty_jitter_range_is_zero() {
        let fetcher = fetcher(FetchSettings::immediate());
        assert_eq!(fetcher.jitter_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let url = format!("{}/post", server.uri());
        let result = fetcher(FetchSettings::immediate()).fetch(&url, None).await.unwrap();
        assert_eq!(result.status, 200);
        assert_eq!(result.body, "<html>ok</html>");
        assert_eq!(result.final_url, url);
    }

    #[tokio::test]
    async fn test_retries_transient_status_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let settings = FetchSettings {
            backoff_base: Duration::from_millis(20),
            ..FetchSettings::immediate()
        };
        let t0 = std::time::Instant::now();
        let result = fetcher(settings)
            .fetch(&format!("{}/flaky", server.uri()), None)
            .await
            .unwrap();

        assert_eq!(result.body, "recovered");
        // Two backoff waits: 20 ms + 40 ms.
        assert!(t0.elapsed() >= Duration::from_millis(60));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(5)
            .mount(&server)
            .await;

        let err = fetcher(FetchSettings::immediate())
            .fetch(&format!("{}/down", server.uri()), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FetchErrorKind::Network);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 4, "one attempt plus exactly three retries");
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(FetchSettings::immediate())
            .fetch(&format!("{}/missing", server.uri()), None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FetchError::Http {
                url: format!("{}/missing", server.uri()),
                status: 404
            }
        );
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_warm_up_request_sets_cookies_for_real_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .and(header_matcher("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("real"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/post"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "session=abc; Path=/")
                    .set_body_string("warm-up"),
            )
            .mount(&server)
            .await;

        let settings = FetchSettings {
            warm_up: true,
            ..FetchSettings::immediate()
        };
        let result = fetcher(settings)
            .fetch(&format!("{}/post", server.uri()), None)
            .await
            .unwrap();

        assert_eq!(result.body, "real");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sends_browser_headers_and_extra_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header_matcher("accept-language", "en-US,en;q=0.9"))
            .and(header_matcher("x-test", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let mut extra = HeaderMap::new();
        extra.insert("x-test", HeaderValue::from_static("1"));
        let result = fetcher(FetchSettings::immediate())
            .fetch(&format!("{}/api", server.uri()), Some(&extra))
            .await
            .unwrap();
        assert_eq!(result.body, "[]");
    }

    #[tokio::test]
    async fn test_invalid_url_is_network_error() {
        let err = fetcher(FetchSettings::immediate())
            .fetch("not a url", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Network);
    }

    #[test]
    fn test_backoff_doubles() {
        let f = fetcher(FetchSettings::default());
        assert_eq!(f.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(f.backoff_delay(2), Duration::from_secs(1));
        assert_eq!(f.backoff_delay(3), Duration::from_secs(2));
    }

    #[test]
    fn test_host_key_includes_port() {
        assert_eq!(
            host_key("https://research.google/blog/").as_deref(),
            Some("research.google")
        );
        assert_eq!(
            host_key("http://127.0.0.1:8080/feed").as_deref(),
            Some("127.0.0.1:8080")
        );
        assert_eq!(host_key("::"), None);
    }
}
