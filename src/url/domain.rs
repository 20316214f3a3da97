use std::net::IpAddr;
use url::Url;

/// Second-level labels that sit under a two-letter country code
/// (`example.co.uk`, `example.com.au`), making the registrable domain
/// three labels long.
const COUNTRY_SECOND_LEVELS: &[&str] = &[
    "ac", "co", "com", "edu", "go", "gov", "ne", "net", "or", "org",
];

/// Returns the key identifying a host for robots and politeness purposes
///
/// The key is the lowercase host, followed by `:port` when the URL uses a
/// non-default port. Two URLs with the same key share one robots.txt and
/// one politeness slot.
///
/// # Arguments
///
/// * `url` - The URL to extract the host key from
///
/// # Returns
///
/// * `Some(String)` - The host key
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_crawl::url::host_key;
///
/// let url = Url::parse("https://EXAMPLE.com/path").unwrap();
/// assert_eq!(host_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    if host.is_empty() {
        return None;
    }

    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Splits a host into its registrable domain and subdomain
///
/// `www.ics.uci.edu` splits into (`uci.edu`, `www.ics`), and
/// `news.bbc.co.uk` into (`bbc.co.uk`, `news`). IP literals and
/// single-label hosts are returned whole with an empty subdomain.
pub fn split_domain(host: &str) -> (String, String) {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return (host, String::new());
    }

    let labels: Vec<&str> = host.split('.').collect();
    let count = labels.len();
    if count <= 2 {
        return (host, String::new());
    }

    let tld = labels[count - 1];
    let second = labels[count - 2];
    let keep = if tld.len() == 2 && COUNTRY_SECOND_LEVELS.contains(&second) {
        3
    } else {
        2
    };

    if count <= keep {
        return (host, String::new());
    }

    (
        labels[count - keep..].join("."),
        labels[..count - keep].join("."),
    )
}
