//! HTTP fetching
//!
//! This module defines the [`Fetcher`] seam used by the workers and the
//! robots engine, and its default implementation on `reqwest`:
//! - Building HTTP clients with a descriptive user agent string
//! - Manual redirect handling (the `Location` is reported, not followed)
//! - Streaming body reads with a hard size cap
//! - Classification of oversize bodies vs. transport failures

use crate::config::{Config, UserAgentConfig};
use crate::CrawlError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// Failure to obtain a response body
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Body of {url} exceeds {limit} bytes (at least {size})")]
    PageTooLarge { url: String, size: u64, limit: u64 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },
}

impl From<FetchError> for CrawlError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::PageTooLarge { url, size, limit } => {
                CrawlError::PageTooLarge { url, size, limit }
            }
            FetchError::Timeout { url } => CrawlError::FetchFailure {
                url,
                reason: "timed out".to_string(),
            },
            FetchError::Transport { url, message } => CrawlError::FetchFailure {
                url,
                reason: message,
            },
        }
    }
}

/// A completed HTTP exchange
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// HTTP status code
    pub status_code: u16,

    /// Response headers, names lowercase
    pub headers: Vec<(String, String)>,

    /// Response body (empty for redirects)
    pub body: Vec<u8>,

    /// Absolute redirect target for 3xx responses carrying `Location`
    pub redirect_location: Option<String>,

    /// URL that produced this response
    pub fetched_url: String,
}

impl FetchResponse {
    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status_code)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Retrieves URLs for the crawler
///
/// Implementations must not follow redirects themselves: a 3xx response is
/// returned with `redirect_location` set so the caller can apply its own
/// dedup and robots rules to the target.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, reading at most `max_body` bytes of body
    async fn fetch(&self, url: &str, max_body: u64) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.crawler.request_timeout())?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, max_body: u64) -> Result<FetchResponse, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        let fetched_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        if status.is_redirection() {
            let redirect_location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| response.url().join(location).ok())
                .map(String::from);

            return Ok(FetchResponse {
                status_code: status.as_u16(),
                headers,
                body: Vec::new(),
                redirect_location,
                fetched_url,
            });
        }

        if let Some(length) = response.content_length() {
            if length > max_body {
                return Err(FetchError::PageTooLarge {
                    url: url.to_string(),
                    size: length,
                    limit: max_body,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(url, e))? {
            let size = (body.len() + chunk.len()) as u64;
            if size > max_body {
                return Err(FetchError::PageTooLarge {
                    url: url.to_string(),
                    size,
                    limit: max_body,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status_code: status.as_u16(),
            headers,
            body,
            redirect_location: None,
            fetched_url,
        })
    }
}
