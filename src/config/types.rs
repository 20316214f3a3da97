use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::time::Duration;

/// Upper bound for every millisecond timing setting (one day)
pub const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

/// Upper bound for `host-ttl` (one week)
pub const MAX_HOST_TTL_MS: u64 = 7 * MAX_TIMING_MS;

/// Upper bound for robots.txt `expiration-hours` (one year)
pub const MAX_ROBOTS_EXPIRATION_HOURS: i64 = 365 * 24;

/// Main configuration structure for a crawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// URLs the crawl starts from
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum link depth from the seeds, -1 for unlimited
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: i32,

    /// Maximum number of URLs ever scheduled, -1 for unlimited
    #[serde(rename = "max-pages-to-fetch", default = "default_max_pages")]
    pub max_pages_to_fetch: i64,

    /// Number of concurrent workers
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Number of URLs a worker claims at once
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Largest response body accepted (bytes)
    #[serde(rename = "max-download-size", default = "default_max_download_size")]
    pub max_download_size: u64,

    /// Whole-request timeout (milliseconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Schedule the target of 3xx responses
    #[serde(rename = "follow-redirects", default = "default_true")]
    pub follow_redirects: bool,

    /// Drop session-id query parameters during normalization
    #[serde(rename = "strip-session-ids", default = "default_true")]
    pub strip_session_ids: bool,

    /// Stop every worker when one hits an unexpected error
    #[serde(rename = "halt-on-error", default)]
    pub halt_on_error: bool,

    /// Mirror the frontier into the database so a crawl can resume
    #[serde(default)]
    pub resumable: bool,

    /// Pause after an empty claim before retrying (milliseconds)
    #[serde(rename = "empty-claim-sleep", default = "default_empty_claim_sleep")]
    pub empty_claim_sleep: u64,

    /// Longest a claim waits for work while URLs are still in flight (milliseconds)
    #[serde(rename = "claim-timeout", default = "default_claim_timeout")]
    pub claim_timeout: u64,

    /// Interval between supervisor checks (milliseconds)
    #[serde(rename = "monitor-interval", default = "default_monitor_interval")]
    pub monitor_interval: u64,

    /// Gap between the two idle observations that confirm completion (milliseconds)
    #[serde(rename = "termination-grace", default = "default_termination_grace")]
    pub termination_grace: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// How request spacing is keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolitenessMode {
    /// Each host has its own slot
    #[default]
    PerHost,
    /// One slot shared by every host
    Global,
}

/// Request spacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    #[serde(default = "default_politeness_delay")]
    pub delay: u64,

    #[serde(default)]
    pub mode: PolitenessMode,

    /// Hosts idle for longer than this are forgotten (milliseconds)
    #[serde(rename = "host-ttl", default = "default_host_ttl")]
    pub host_ttl: u64,

    /// Upper bound on tracked hosts
    #[serde(rename = "max-hosts", default = "default_max_hosts")]
    pub max_hosts: usize,

    /// Honor `Crawl-delay` from robots.txt when it exceeds `delay`
    #[serde(rename = "respect-crawl-delay", default = "default_true")]
    pub respect_crawl_delay: bool,

    /// Cap applied to robots.txt crawl delays (milliseconds)
    #[serde(rename = "max-crawl-delay", default = "default_max_crawl_delay")]
    pub max_crawl_delay: u64,
}

/// robots.txt handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RobotsConfig {
    /// Consult robots.txt at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Agent token matched against `User-agent` lines, defaults to the crawler name
    #[serde(rename = "agent-name", default)]
    pub agent_name: Option<String>,

    /// Let other agents' Allow rules override a wildcard Disallow
    #[serde(rename = "ignore-ua-discrimination", default)]
    pub ignore_ua_discrimination: bool,

    /// Number of hosts whose directives are cached
    #[serde(rename = "cache-size", default = "default_robots_cache_size")]
    pub cache_size: usize,

    /// Age after which cached directives are refetched (hours)
    #[serde(rename = "expiration-hours", default = "default_robots_expiration")]
    pub expiration_hours: i64,

    /// Largest robots.txt body read (bytes)
    #[serde(rename = "max-size", default = "default_robots_max_size")]
    pub max_size: u64,

    /// Redirect hops followed when fetching robots.txt
    #[serde(rename = "max-redirects", default = "default_robots_max_redirects")]
    pub max_redirects: usize,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

impl CrawlerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn empty_claim_sleep(&self) -> Duration {
        Duration::from_millis(self.empty_claim_sleep)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace)
    }

    /// Returns true if a URL at `depth` may be scheduled
    pub fn depth_allowed(&self, depth: u32) -> bool {
        self.max_depth < 0 || i64::from(depth) <= i64::from(self.max_depth)
    }
}

impl UserAgentConfig {
    /// Formats the HTTP `User-Agent` header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl PolitenessConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }

    pub fn host_ttl(&self) -> Duration {
        Duration::from_millis(self.host_ttl)
    }

    pub fn max_crawl_delay(&self) -> Duration {
        Duration::from_millis(self.max_crawl_delay)
    }
}

impl RobotsConfig {
    /// How long fetched robots.txt directives stay valid
    pub fn expiration(&self) -> ChronoDuration {
        ChronoDuration::hours(self.expiration_hours.clamp(1, MAX_ROBOTS_EXPIRATION_HOURS))
    }
}

impl Config {
    /// Agent token used for robots.txt group matching (lowercase)
    pub fn robots_agent(&self) -> String {
        self.robots
            .agent_name
            .clone()
            .unwrap_or_else(|| self.user_agent.crawler_name.clone())
            .to_lowercase()
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_pages_to_fetch: default_max_pages(),
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            max_download_size: default_max_download_size(),
            request_timeout: default_request_timeout(),
            follow_redirects: true,
            strip_session_ids: true,
            halt_on_error: false,
            resumable: false,
            empty_claim_sleep: default_empty_claim_sleep(),
            claim_timeout: default_claim_timeout(),
            monitor_interval: default_monitor_interval(),
            termination_grace: default_termination_grace(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "RippleCrawl".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/crawler".to_string(),
            contact_email: "crawler@example.com".to_string(),
        }
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            delay: default_politeness_delay(),
            mode: PolitenessMode::default(),
            host_ttl: default_host_ttl(),
            max_hosts: default_max_hosts(),
            respect_crawl_delay: true,
            max_crawl_delay: default_max_crawl_delay(),
        }
    }
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            agent_name: None,
            ignore_ua_discrimination: false,
            cache_size: default_robots_cache_size(),
            expiration_hours: default_robots_expiration(),
            max_size: default_robots_max_size(),
            max_redirects: default_robots_max_redirects(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_depth() -> i32 {
    -1
}

fn default_max_pages() -> i64 {
    -1
}

fn default_worker_count() -> usize {
    8
}

fn default_batch_size() -> usize {
    50
}

fn default_max_download_size() -> u64 {
    1_048_576
}

fn default_request_timeout() -> u64 {
    20_000
}

fn default_empty_claim_sleep() -> u64 {
    1_000
}

fn default_claim_timeout() -> u64 {
    1_000
}

fn default_monitor_interval() -> u64 {
    1_000
}

fn default_termination_grace() -> u64 {
    1_000
}

fn default_politeness_delay() -> u64 {
    200
}

fn default_host_ttl() -> u64 {
    60_000
}

fn default_max_hosts() -> usize {
    10_000
}

fn default_max_crawl_delay() -> u64 {
    30_000
}

fn default_robots_cache_size() -> usize {
    500
}

fn default_robots_expiration() -> i64 {
    24
}

fn default_robots_max_size() -> u64 {
    500_000
}

fn default_robots_max_redirects() -> usize {
    3
}

fn default_database_path() -> String {
    "./ripple-frontier.db".to_string()
}
