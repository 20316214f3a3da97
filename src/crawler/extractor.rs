//! Link extraction from fetched content
//!
//! The [`ContentExtractor`] seam turns a response body into outgoing
//! links. The default [`HtmlExtractor`] handles HTML with `scraper`:
//! - Links from `a`, `area`, `link`, `iframe`, `frame`, `img`, `embed`
//!   and `script` elements, in document order
//! - `<base href>` for relative resolution
//! - The page title
//!
//! Hrefs are returned as written in the document. Canonicalization
//! happens in the worker, against [`ParseData::base_url`].

use crate::CrawlError;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// One outgoing link found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// The raw `href`/`src` value
    pub href: String,

    /// Anchor text, or `alt` text for images
    pub anchor: Option<String>,

    /// Lowercase tag name of the source element
    pub tag: String,

    /// All attributes of the source element
    pub attributes: BTreeMap<String, String>,
}

/// Result of extracting a document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseData {
    pub title: Option<String>,

    pub links: Vec<ExtractedLink>,

    /// URL relative links resolve against: the `<base href>` when the
    /// document declares one, otherwise the URL it was fetched from
    pub base_url: String,
}

/// Extracts outgoing links from a response body
pub trait ContentExtractor: Send + Sync {
    /// # Arguments
    ///
    /// * `body` - The raw response body
    /// * `content_type` - The `Content-Type` header, if any
    /// * `context_url` - The URL the body was fetched from
    ///
    /// # Returns
    ///
    /// * `Ok(ParseData)` - Extracted links (empty for content without links)
    /// * `Err(CrawlError::ParseFailure)` - The body could not be processed
    fn extract(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        context_url: &str,
    ) -> Result<ParseData, CrawlError>;
}

/// Element/attribute pairs that carry links
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a", "href"),
    ("area", "href"),
    ("link", "href"),
    ("iframe", "src"),
    ("frame", "src"),
    ("img", "src"),
    ("embed", "src"),
    ("script", "src"),
];

/// [`ContentExtractor`] for HTML documents
#[derive(Debug, Clone, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_html(content_type: Option<&str>) -> bool {
        match content_type {
            None => true,
            Some(ct) => {
                let ct = ct.to_lowercase();
                ct.contains("html") || ct.starts_with("text/plain")
            }
        }
    }
}

impl ContentExtractor for HtmlExtractor {
    fn extract(
        &self,
        body: &[u8],
        content_type: Option<&str>,
        context_url: &str,
    ) -> Result<ParseData, CrawlError> {
        let context = Url::parse(context_url).map_err(|e| CrawlError::ParseFailure {
            url: context_url.to_string(),
            reason: format!("invalid context URL: {}", e),
        })?;

        if !Self::is_html(content_type) {
            tracing::trace!(
                "No links extracted from {} ({})",
                context_url,
                content_type.unwrap_or_default()
            );
            return Ok(ParseData {
                base_url: context.to_string(),
                ..ParseData::default()
            });
        }

        let html = String::from_utf8_lossy(body);
        let document = Html::parse_document(&html);

        let base_url = extract_base(&document, &context)?
            .unwrap_or_else(|| context.to_string());
        let title = extract_title(&document)?;
        let links = extract_links(&document, context_url)?;

        Ok(ParseData {
            title,
            links,
            base_url,
        })
    }
}

fn selector(css: &str, url: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css).map_err(|e| CrawlError::ParseFailure {
        url: url.to_string(),
        reason: format!("bad selector {}: {:?}", css, e),
    })
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Result<Option<String>, CrawlError> {
    let title_selector = selector("title", "")?;

    Ok(document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Resolves the first `<base href>` against the page URL
fn extract_base(document: &Html, context: &Url) -> Result<Option<String>, CrawlError> {
    let base_selector = selector("base[href]", context.as_str())?;

    Ok(document
        .select(&base_selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| context.join(href.trim()).ok())
        .map(String::from))
}

fn extract_links(document: &Html, context_url: &str) -> Result<Vec<ExtractedLink>, CrawlError> {
    let css = LINK_SOURCES
        .iter()
        .map(|(tag, attr)| format!("{}[{}]", tag, attr))
        .collect::<Vec<_>>()
        .join(", ");
    let link_selector = selector(&css, context_url)?;

    let mut links = Vec::new();
    for element in document.select(&link_selector) {
        let tag = element.value().name().to_lowercase();
        let Some(attr) = LINK_SOURCES
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, attr)| *attr)
        else {
            continue;
        };

        let Some(href) = element.value().attr(attr).map(str::trim) else {
            continue;
        };
        if !is_followable(href) {
            continue;
        }

        links.push(ExtractedLink {
            href: href.to_string(),
            anchor: anchor_text(&element, &tag),
            tag,
            attributes: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        });
    }

    Ok(links)
}

fn anchor_text(element: &ElementRef<'_>, tag: &str) -> Option<String> {
    let text = if tag == "img" {
        element.value().attr("alt").unwrap_or_default().to_string()
    } else {
        element.text().collect::<Vec<_>>().join(" ")
    };

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Rejects empty hrefs, same-page fragments and non-navigational schemes
fn is_followable(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let lower = href.to_lowercase();
    !["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}
