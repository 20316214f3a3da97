//! robots.txt handling module
//!
//! This module fetches, parses, caches and evaluates robots.txt files.
//! Evaluation fails open: a robots.txt that cannot be fetched or read
//! allows everything, and is never confused with an explicit Disallow.

mod cache;
mod directives;
mod parser;
mod pattern;

pub use cache::DirectivesCache;
pub use directives::{HostDirectives, UserAgentDirectives};
pub use parser::parse_robots;
pub use pattern::{PathPattern, PathRule, RuleVerdict};

use pattern::normalize_escapes;

use crate::config::{Config, RobotsConfig};
use crate::crawler::{FetchError, Fetcher};
use crate::url::{host_key, WebUrl};
use crate::CrawlError;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Answers allow/deny questions from cached robots.txt directives
pub struct RobotsEngine {
    config: RobotsConfig,
    agent: String,
    fetcher: Arc<dyn Fetcher>,
    cache: DirectivesCache,
}

impl RobotsEngine {
    /// Creates an engine that fetches robots.txt through `fetcher`
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config: config.robots.clone(),
            agent: config.robots_agent(),
            fetcher,
            cache: DirectivesCache::new(config.robots.cache_size, config.robots.expiration()),
        }
    }

    /// Checks whether the crawler may fetch `url`
    ///
    /// Always true when robots handling is disabled, when the URL cannot
    /// be parsed, or when the host's robots.txt is unavailable.
    pub async fn allows(&self, url: &WebUrl) -> bool {
        if !self.config.enabled {
            return true;
        }

        match url.parsed() {
            Ok(parsed) => self.allows_url(&parsed).await,
            Err(e) => {
                tracing::warn!("Bad URL in robots.txt check {}: {}", url.url, e);
                true
            }
        }
    }

    /// Like [`allows`](Self::allows) for an already parsed URL
    pub async fn allows_url(&self, url: &Url) -> bool {
        if !self.config.enabled {
            return true;
        }

        let Some(directives) = self.directives_for(url).await else {
            return true;
        };

        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        directives.allows(&normalize_escapes(&target))
    }

    /// `Crawl-delay` governing this crawler on the URL's host
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        if !self.config.enabled {
            return None;
        }
        self.directives_for(url)
            .await
            .and_then(|directives| directives.crawl_delay())
    }

    /// Sitemap URLs declared in the host's robots.txt
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        match self.directives_for(url).await {
            Some(directives) => directives.sitemaps(),
            None => Vec::new(),
        }
    }

    /// Cached or freshly fetched directives for the URL's host
    pub async fn directives_for(&self, url: &Url) -> Option<Arc<HostDirectives>> {
        let host = host_key(url)?;
        let directives = self
            .cache
            .get_or_fetch(&host, || self.fetch_directives(url))
            .await;
        Some(directives)
    }

    /// Number of hosts currently cached
    pub fn cached_hosts(&self) -> usize {
        self.cache.len()
    }

    async fn fetch_directives(&self, url: &Url) -> HostDirectives {
        let robots_url = robots_url_for(url);

        match self.fetch_robots_body(&robots_url).await {
            Ok(Some(content)) => {
                let groups = parse_robots(&content);
                tracing::debug!("Parsed {} robots.txt groups from {}", groups.len(), robots_url);
                HostDirectives::new(groups, &self.agent, self.config.ignore_ua_discrimination)
            }
            Ok(None) => self.allow_all(),
            Err(e) => {
                // Missing server, refused connection, timeout: same as no robots.txt
                tracing::debug!("{}; allowing all", e);
                self.allow_all()
            }
        }
    }

    /// Fetches robots.txt text, following up to `max_redirects` hops
    ///
    /// # Returns
    ///
    /// * `Ok(Some(String))` - A readable robots.txt
    /// * `Ok(None)` - No usable robots.txt (non-200, non-text, oversized)
    /// * `Err(CrawlError::RobotsUnreachable)` - Transport failure
    async fn fetch_robots_body(&self, robots_url: &str) -> Result<Option<String>, CrawlError> {
        let mut current = robots_url.to_string();

        for hop in 0..=self.config.max_redirects {
            let response = match self.fetcher.fetch(&current, self.config.max_size).await {
                Ok(response) => response,
                Err(FetchError::PageTooLarge { size, limit, .. }) => {
                    tracing::warn!(
                        "robots.txt at {} is larger than {} bytes ({}), ignoring it",
                        current,
                        limit,
                        size
                    );
                    return Ok(None);
                }
                Err(e) => {
                    return Err(CrawlError::RobotsUnreachable {
                        host: robots_url.to_string(),
                        reason: e.to_string(),
                    })
                }
            };

            if response.is_redirect() {
                match response.redirect_location {
                    Some(location) if hop < self.config.max_redirects => {
                        tracing::trace!("robots.txt redirect {} -> {}", current, location);
                        current = location;
                        continue;
                    }
                    _ => {
                        tracing::debug!("Giving up on robots.txt redirects at {}", current);
                        return Ok(None);
                    }
                }
            }

            if response.status_code != 200 {
                tracing::debug!(
                    "Can't read robots.txt at {}: status {}",
                    current,
                    response.status_code
                );
                return Ok(None);
            }

            let content_type = response
                .content_type()
                .map(|ct| ct.to_lowercase())
                .unwrap_or_default();
            if content_type.is_empty()
                || content_type.starts_with("text/plain")
                || content_type.contains("html")
            {
                return Ok(Some(response.text()));
            }

            tracing::warn!(
                "Can't read robots.txt at {}: not plain text (content type {})",
                current,
                content_type
            );
            return Ok(None);
        }

        Ok(None)
    }

    fn allow_all(&self) -> HostDirectives {
        HostDirectives::allow_all(&self.agent, self.config.ignore_ua_discrimination)
    }
}

/// `scheme://host[:port]/robots.txt` for the URL's origin
fn robots_url_for(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port() {
        Some(port) => format!("{}://{}:{}/robots.txt", url.scheme(), host, port),
        None => format!("{}://{}/robots.txt", url.scheme(), host),
    }
}
