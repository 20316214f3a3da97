use crate::url::domain::{host_key, split_domain};
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Identifier assigned to a canonical URL at first discovery
///
/// Ids start at 1; 0 means "not yet scheduled".
pub type DocId = u64;

/// A canonical URL together with its crawl metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebUrl {
    /// Frontier-assigned id, 0 until scheduled
    pub doc_id: DocId,

    /// The canonical URL string
    pub url: String,

    /// Id of the page this link was found on (0 for seeds)
    pub parent_doc_id: DocId,

    /// URL of the page this link was found on
    pub parent_url: Option<String>,

    /// Link distance from the nearest seed
    pub depth: u32,

    /// Scheduling priority, lower values are claimed first
    pub priority: u8,

    /// Anchor text of the link
    pub anchor: Option<String>,

    /// Registrable domain, e.g. `example.co.uk`
    pub domain: String,

    /// Subdomain labels in front of the domain, e.g. `www`
    pub sub_domain: String,

    /// Path component of the URL
    pub path: String,

    /// HTML tag the link came from, e.g. `a` or `img`
    pub tag: Option<String>,

    /// Attributes of the source element
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl WebUrl {
    /// Builds a WebUrl from an already canonical URL string
    ///
    /// # Arguments
    ///
    /// * `canonical` - Output of [`crate::url::normalize_url`]
    ///
    /// # Returns
    ///
    /// * `Ok(WebUrl)` - Depth 0, priority 0, no parent
    /// * `Err(UrlError)` - The string is not an absolute URL with a host
    pub fn new(canonical: &str) -> Result<Self, UrlError> {
        let parsed = Url::parse(canonical).map_err(|e| UrlError::Parse(e.to_string()))?;
        let host = parsed.host_str().ok_or(UrlError::MissingDomain)?;
        let (domain, sub_domain) = split_domain(host);

        Ok(Self {
            doc_id: 0,
            url: canonical.to_string(),
            parent_doc_id: 0,
            parent_url: None,
            depth: 0,
            priority: 0,
            anchor: None,
            domain,
            sub_domain,
            path: parsed.path().to_string(),
            tag: None,
            attributes: BTreeMap::new(),
        })
    }

    /// Builds the WebUrl for a link discovered on `self`
    ///
    /// The child sits one level deeper and records `self` as its parent.
    pub fn child(&self, canonical: &str) -> Result<Self, UrlError> {
        let mut child = Self::new(canonical)?;
        child.parent_doc_id = self.doc_id;
        child.parent_url = Some(self.url.clone());
        child.depth = self.depth + 1;
        Ok(child)
    }

    /// Builds the WebUrl for a redirect target of `self`
    ///
    /// A redirect does not add a level: the target keeps `self`'s depth
    /// and priority.
    pub fn redirect_target(&self, canonical: &str) -> Result<Self, UrlError> {
        let mut target = Self::new(canonical)?;
        target.parent_doc_id = self.doc_id;
        target.parent_url = Some(self.url.clone());
        target.depth = self.depth;
        target.priority = self.priority;
        Ok(target)
    }

    /// Parses the canonical URL
    pub fn parsed(&self) -> Result<Url, UrlError> {
        Url::parse(&self.url).map_err(|e| UrlError::Parse(e.to_string()))
    }

    /// Returns the robots/politeness host key, see [`host_key`]
    pub fn host_key(&self) -> Option<String> {
        self.parsed().ok().as_ref().and_then(host_key)
    }
}

impl std::fmt::Display for WebUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}
