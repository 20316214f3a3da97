//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. A loaded [`Config`] is treated as immutable and shared by
//! reference (`Arc<Config>`) with every crawl component.
//!
//! # Example
//!
//! ```no_run
//! use ripple_crawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawler.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, PolitenessConfig, PolitenessMode, RobotsConfig, StorageConfig,
    UserAgentConfig, MAX_HOST_TTL_MS, MAX_ROBOTS_EXPIRATION_HOURS, MAX_TIMING_MS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
