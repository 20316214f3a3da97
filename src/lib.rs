//! Ripple-Crawl: a polite, resumable web crawler core
//!
//! This crate implements the engine of a web crawler: a durable,
//! deduplicating frontier, a robots.txt directive engine, a per-host
//! politeness gate, URL canonicalization, and a worker pool whose
//! supervisor detects global completion and replaces dead workers.
//!
//! Fetching and content extraction are pluggable through the
//! [`crawler::Fetcher`] and [`crawler::ContentExtractor`] traits, and the
//! embedding application steers the crawl through [`crawler::CrawlPolicy`].

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod output;
pub mod politeness;
pub mod robots;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Invalid URL {href}: {reason}")]
    InvalidUrl { href: String, reason: String },

    #[error("robots.txt unreachable for {host}: {reason}")]
    RobotsUnreachable { host: String, reason: String },

    #[error("Page too large: {url} ({size} bytes, limit {limit})")]
    PageTooLarge { url: String, size: u64, limit: u64 },

    #[error("Fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("Parse failed for {url}: {reason}")]
    ParseFailure { url: String, reason: String },

    #[error("Worker {worker} stopped on fatal error: {reason}")]
    FatalWorker { worker: usize, reason: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl is shutting down")]
    ShuttingDown,

    #[error("Crawl has not been started")]
    NotStarted,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlController, CrawlPolicy, CrawlSummary, Page};
pub use frontier::Frontier;
pub use politeness::PolitenessGate;
pub use robots::RobotsEngine;
pub use url::{normalize_url, WebUrl};
