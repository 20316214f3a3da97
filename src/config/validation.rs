use crate::config::types::{
    Config, CrawlerConfig, PolitenessConfig, RobotsConfig, StorageConfig, UserAgentConfig,
    MAX_HOST_TTL_MS, MAX_ROBOTS_EXPIRATION_HOURS, MAX_TIMING_MS,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_politeness_config(&config.politeness)?;
    validate_robots_config(&config.robots)?;
    validate_storage_config(&config.storage)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_depth < -1 {
        return Err(ConfigError::Validation(format!(
            "max_depth must be -1 (unlimited) or >= 0, got {}",
            config.max_depth
        )));
    }

    if config.max_pages_to_fetch < -1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_to_fetch must be -1 (unlimited) or >= 0, got {}",
            config.max_pages_to_fetch
        )));
    }

    if config.worker_count < 1 || config.worker_count > 256 {
        return Err(ConfigError::Validation(format!(
            "worker_count must be between 1 and 256, got {}",
            config.worker_count
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.max_download_size == 0 {
        return Err(ConfigError::Validation(
            "max_download_size must be > 0".to_string(),
        ));
    }

    if config.monitor_interval == 0 {
        return Err(ConfigError::Validation(
            "monitor_interval must be > 0".to_string(),
        ));
    }

    for (name, value) in [
        ("request_timeout", config.request_timeout),
        ("empty_claim_sleep", config.empty_claim_sleep),
        ("claim_timeout", config.claim_timeout),
        ("monitor_interval", config.monitor_interval),
        ("termination_grace", config.termination_grace),
    ] {
        check_at_most(name, value, MAX_TIMING_MS)?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates request spacing configuration
fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.max_hosts < 1 {
        return Err(ConfigError::Validation(format!(
            "politeness max_hosts must be >= 1, got {}",
            config.max_hosts
        )));
    }

    check_at_most("politeness delay", config.delay, MAX_TIMING_MS)?;
    check_at_most("politeness max_crawl_delay", config.max_crawl_delay, MAX_TIMING_MS)?;
    check_at_most("politeness host_ttl", config.host_ttl, MAX_HOST_TTL_MS)?;

    if config.host_ttl < config.delay {
        return Err(ConfigError::Validation(format!(
            "politeness host_ttl ({}ms) must not be shorter than delay ({}ms)",
            config.host_ttl, config.delay
        )));
    }

    Ok(())
}

/// Validates robots.txt configuration
fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.cache_size < 1 {
        return Err(ConfigError::Validation(format!(
            "robots cache_size must be >= 1, got {}",
            config.cache_size
        )));
    }

    if config.max_size == 0 {
        return Err(ConfigError::Validation(
            "robots max_size must be > 0".to_string(),
        ));
    }

    if !(1..=MAX_ROBOTS_EXPIRATION_HOURS).contains(&config.expiration_hours) {
        return Err(ConfigError::Validation(format!(
            "robots expiration_hours must be between 1 and {}, got {}",
            MAX_ROBOTS_EXPIRATION_HOURS, config.expiration_hours
        )));
    }

    if let Some(agent) = &config.agent_name {
        if agent.trim().is_empty() || agent.contains(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "robots agent_name must be a single non-empty token, got '{}'",
                agent
            )));
        }
    }

    Ok(())
}

/// Rejects millisecond settings above `max`
fn check_at_most(name: &str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be at most {}ms, got {}",
            name, max, value
        )));
    }
    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates seed URLs: absolute http(s) URLs with a host
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS",
                seed
            )));
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' has no host",
                seed
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_depth_and_page_limits() {
        let mut config = Config::default();
        config.crawler.max_depth = -2;
        assert!(validate(&config).is_err());

        config.crawler.max_depth = 0;
        config.crawler.max_pages_to_fetch = -5;
        assert!(validate(&config).is_err());

        config.crawler.max_pages_to_fetch = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_worker_count_bounds() {
        let mut config = Config::default();
        config.crawler.worker_count = 0;
        assert!(validate(&config).is_err());
        config.crawler.worker_count = 257;
        assert!(validate(&config).is_err());
        config.crawler.worker_count = 256;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_robots_limits() {
        let mut config = Config::default();
        config.robots.cache_size = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.robots.agent_name = Some("two words".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_upper_bounds() {
        let mut config = Config::default();
        config.robots.expiration_hours = i64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.politeness.delay = u64::MAX;
        config.politeness.host_ttl = u64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.politeness.max_crawl_delay = MAX_TIMING_MS + 1;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.crawler.claim_timeout = u64::MAX;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.politeness.delay = MAX_TIMING_MS;
        config.politeness.host_ttl = MAX_HOST_TTL_MS;
        config.robots.expiration_hours = MAX_ROBOTS_EXPIRATION_HOURS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_expiration_is_clamped() {
        let mut config = Config::default();
        config.robots.expiration_hours = i64::MAX;
        assert_eq!(
            config.robots.expiration(),
            chrono::Duration::hours(MAX_ROBOTS_EXPIRATION_HOURS)
        );
    }

    #[test]
    fn test_politeness_ttl_not_below_delay() {
        let mut config = Config::default();
        config.politeness.delay = 5_000;
        config.politeness.host_ttl = 1_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_seeds() {
        assert!(validate_seeds(&["https://example.com/".to_string()]).is_ok());
        assert!(validate_seeds(&["http://example.com/".to_string()]).is_ok());
        assert!(validate_seeds(&["ftp://example.com/".to_string()]).is_err());
        assert!(validate_seeds(&["example.com".to_string()]).is_err());
    }

    #[test]
    fn test_crawler_name() {
        let mut config = Config::default();
        config.user_agent.crawler_name = "bad name".to_string();
        assert!(validate(&config).is_err());
        config.user_agent.crawler_name = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("a@b@c.com").is_err());
    }
}
