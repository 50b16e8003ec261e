//! Page acquisition: a polite blocking HTTP client plus the fetcher traits
//! the job layer works against. The conversion pipeline never touches
//! reqwest directly; everything goes through `PageFetcher` / `ImageFetcher`
//! so tests can substitute canned pages.

use scraper::{ElementRef, Html, Selector};
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; webtome/0.1; +https://github.com/webtome)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 1;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 2] = [10, 30];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },
    #[error("Network error while fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} when fetching {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Failed to read response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("Selector '{selector}' matched nothing at {url}")]
    SelectorNotFound { selector: String, url: String },
    #[error("Menu '{selector}' at {url} contains no links")]
    NoMenuLinks { selector: String, url: String },
}

/// Produces raw page HTML for the pipeline. `close` releases the underlying
/// session and is called exactly once by the owning job, on every exit path.
pub trait PageFetcher {
    /// Fetch one page. With a selector, returns the inner HTML of the first
    /// match; without, the page body.
    fn fetch(&mut self, url: &str, content_selector: Option<&str>) -> Result<String, FetchError>;

    /// Fetch the page at `url` and return the absolute URLs of all links
    /// inside the first element matching `menu_selector`, deduplicated,
    /// document order preserved.
    fn fetch_links(&mut self, url: &str, menu_selector: &str) -> Result<Vec<String>, FetchError>;

    fn close(&mut self) {}
}

/// Fetches raw image bytes for embedding. Failures degrade to placeholders
/// at the emitter, so implementations should not retry aggressively.
pub trait ImageFetcher {
    fn get(&mut self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct HttpClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
}

impl HttpClient {
    /// Build a client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// GET with retries for transient failures: timeout, connection errors,
    /// HTTP 5xx, and HTTP 429. Other non-2xx statuses fail immediately.
    pub fn get_with_retry(
        &mut self,
        url: &str,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        let max_attempts = self.retry_count;
        let mut last_err: Option<FetchError> = None;
        for attempt in 0..max_attempts {
            self.wait_delay();
            match self.inner.get(url).send() {
                Ok(response) => {
                    self.last_request = Some(Instant::now());
                    let status = response.status();
                    let retryable_status = status.is_server_error() || status.as_u16() == 429;
                    if retryable_status && attempt < max_attempts - 1 {
                        last_err = Some(FetchError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        std::thread::sleep(backoff(status.as_u16() == 429, attempt));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(FetchError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect();
                    if retryable && attempt < max_attempts - 1 {
                        last_err = Some(FetchError::Network {
                            url: url.to_string(),
                            source: e,
                        });
                        std::thread::sleep(backoff(false, attempt));
                        continue;
                    }
                    return Err(FetchError::Network {
                        url: url.to_string(),
                        source: e,
                    });
                }
            }
        }
        Err(last_err.unwrap_or_else(|| FetchError::HttpStatus {
            status: 0,
            url: url.to_string(),
        }))
    }

    /// GET returning the body as text.
    pub fn get_text(&mut self, url: &str) -> Result<String, FetchError> {
        let response = self.get_with_retry(url)?;
        response.text().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })
    }

    /// GET returning the body as raw bytes.
    pub fn get_bytes(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get_with_retry(url)?;
        let bytes = response.bytes().map_err(|e| FetchError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

fn backoff(rate_limited: bool, attempt: u32) -> Duration {
    let table: &[u64] = if rate_limited {
        &BACKOFF_429_SECS
    } else {
        &DEFAULT_BACKOFF_SECS
    };
    let secs = table
        .get(attempt as usize)
        .copied()
        .unwrap_or_else(|| table.last().copied().unwrap_or(1));
    Duration::from_secs(secs)
}

/// Builder for HttpClient with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct HttpClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

impl HttpClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Delay between requests in seconds. Default 1.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Number of HTTP attempts for transient failures. Default 3.
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
        })
    }
}

/// `PageFetcher` over a live `HttpClient` session.
#[derive(Debug)]
pub struct HttpPageFetcher {
    client: HttpClient,
}

impl HttpPageFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch(&mut self, url: &str, content_selector: Option<&str>) -> Result<String, FetchError> {
        validate_url(url)?;
        let body = self.client.get_text(url)?;
        select_content(&body, url, content_selector)
    }

    fn fetch_links(&mut self, url: &str, menu_selector: &str) -> Result<Vec<String>, FetchError> {
        validate_url(url)?;
        let body = self.client.get_text(url)?;
        extract_menu_links(&body, url, menu_selector)
    }

    fn close(&mut self) {
        // Session state (cookies, delay bookkeeping) dies with the client.
        self.client.last_request = None;
    }
}

impl ImageFetcher for HttpClient {
    fn get(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        validate_url(url)?;
        self.get_bytes(url)
    }
}

fn validate_url(url: &str) -> Result<(), FetchError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        input: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(FetchError::InvalidUrl {
            input: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(())
}

fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|e| FetchError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Inner HTML of the first selector match, or the body when no selector is
/// given. A selector that matches nothing is an error; picking silently from
/// the whole page would hide a user typo.
fn select_content(
    body: &str,
    url: &str,
    content_selector: Option<&str>,
) -> Result<String, FetchError> {
    let document = Html::parse_document(body);
    let selector_str = content_selector.unwrap_or("body");
    let selector = parse_selector(selector_str)?;
    match document.select(&selector).next() {
        Some(el) => Ok(el.inner_html()),
        None if content_selector.is_none() => Ok(body.to_string()),
        None => Err(FetchError::SelectorNotFound {
            selector: selector_str.to_string(),
            url: url.to_string(),
        }),
    }
}

/// Absolute link targets inside the first menu match, deduplicated, document
/// order preserved. Non-http(s) targets (mailto, javascript) are skipped.
fn extract_menu_links(
    body: &str,
    url: &str,
    menu_selector: &str,
) -> Result<Vec<String>, FetchError> {
    let document = Html::parse_document(body);
    let selector = parse_selector(menu_selector)?;
    let menu = document
        .select(&selector)
        .next()
        .ok_or_else(|| FetchError::SelectorNotFound {
            selector: menu_selector.to_string(),
            url: url.to_string(),
        })?;
    let base = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        input: url.to_string(),
        reason: e.to_string(),
    })?;
    let mut links = Vec::new();
    for node in menu.descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        if el.value().name() != "a" {
            continue;
        }
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(target) = base.join(href) else {
            continue;
        };
        if target.scheme() != "http" && target.scheme() != "https" {
            continue;
        }
        let target = target.to_string();
        if !links.contains(&target) {
            links.push(target);
        }
    }
    if links.is_empty() {
        return Err(FetchError::NoMenuLinks {
            selector: menu_selector.to_string(),
            url: url.to_string(),
        });
    }
    Ok(links)
}
