//! Crawl policy hooks
//!
//! The embedding application decides what to crawl and what to do with
//! fetched pages by implementing [`CrawlPolicy`]. Hooks run on the worker
//! that owns the URL. Every hook has a default, so an implementation only
//! overrides what it needs.

use crate::url::WebUrl;
use crate::CrawlError;
use async_trait::async_trait;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct Page {
    pub url: WebUrl,

    pub status_code: u16,

    pub content_type: Option<String>,

    /// Response headers, names lowercase
    pub headers: Vec<(String, String)>,

    pub body: Vec<u8>,

    pub title: Option<String>,

    /// Canonical outgoing links, in document order, without duplicates
    pub outgoing: Vec<WebUrl>,

    /// URL the response actually came from
    pub fetched_url: String,
}

impl Page {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Callbacks steering a crawl
#[async_trait]
pub trait CrawlPolicy: Send + Sync {
    /// Whether a discovered URL should be crawled
    ///
    /// `referrer` is the page the link was found on, `None` for seeds.
    fn should_visit(&self, referrer: Option<&WebUrl>, url: &WebUrl) -> bool {
        let _ = (referrer, url);
        true
    }

    /// Whether links found on `url` should be scheduled
    fn should_follow_links_in(&self, url: &WebUrl) -> bool {
        let _ = url;
        true
    }

    /// Processes a fetched page
    ///
    /// An error is reported through [`on_unhandled_error`](Self::on_unhandled_error)
    /// and stops the crawl when `halt-on-error` is set.
    async fn visit(&self, page: &Page) -> Result<(), CrawlError> {
        tracing::debug!("Visited {}", page.url);
        Ok(())
    }

    fn on_unexpected_status(&self, url: &WebUrl, status_code: u16, description: &str) {
        tracing::warn!(
            "Skipping {}: unexpected status {} ({})",
            url,
            status_code,
            description
        );
    }

    fn on_fetch_failure(&self, url: &WebUrl, error: &CrawlError) {
        tracing::warn!("Can't fetch {}: {}", url, error);
    }

    fn on_page_too_large(&self, url: &WebUrl, size: u64, limit: u64) {
        tracing::warn!(
            "Skipping {}: larger than {} bytes (at least {})",
            url,
            limit,
            size
        );
    }

    fn on_parse_failure(&self, url: &WebUrl, error: &CrawlError) {
        tracing::warn!("Can't parse {}: {}", url, error);
    }

    fn on_disallowed(&self, url: &WebUrl) {
        tracing::debug!("Ignoring {}: disallowed by robots.txt", url);
    }

    fn on_redirect(&self, url: &WebUrl, target: Option<&str>) {
        match target {
            Some(target) => tracing::debug!("Redirect {} -> {}", url, target),
            None => tracing::warn!("Redirect from {} without a Location header", url),
        }
    }

    fn on_unhandled_error(&self, url: Option<&WebUrl>, error: &CrawlError) {
        match url {
            Some(url) => tracing::error!("Unhandled error while processing {}: {}", url, error),
            None => tracing::error!("Unhandled error: {}", error),
        }
    }
}

/// Extensions of static assets the default policy does not crawl
const SKIPPED_EXTENSIONS: &[&str] = &[
    "css", "js", "bmp", "gif", "jpg", "jpeg", "png", "svg", "ico", "tif", "tiff", "webp", "mid",
    "mp2", "mp3", "mp4", "wav", "avi", "mov", "mpeg", "ram", "m4v", "pdf", "rm", "smil", "wmv",
    "swf", "wma", "zip", "rar", "gz", "tar", "7z", "woff", "woff2", "ttf", "eot",
];

/// Crawls everything except common static assets
#[derive(Debug, Clone, Default)]
pub struct DefaultPolicy;

impl DefaultPolicy {
    fn is_static_asset(path: &str) -> bool {
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((_, extension)) => {
                let extension = extension.to_lowercase();
                SKIPPED_EXTENSIONS.contains(&extension.as_str())
            }
            None => false,
        }
    }
}

#[async_trait]
impl CrawlPolicy for DefaultPolicy {
    fn should_visit(&self, _referrer: Option<&WebUrl>, url: &WebUrl) -> bool {
        !Self::is_static_asset(&url.path)
    }
}
