//! Statistics generation from the frontier database
//!
//! This module reads a (possibly interrupted) crawl's persisted frontier
//! and displays where it stands.

use crate::storage::{stored_config_hash, KvStore, StorageError, StorageResult, Table};
use crate::url::WebUrl;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Frontier statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// URLs that were ever scheduled
    pub total_urls: u64,

    /// URLs waiting to be claimed
    pub pending: u64,

    /// URLs claimed when the crawl stopped
    pub in_flight: u64,

    /// URLs completed
    pub processed: u64,

    /// Distinct hosts among all scheduled URLs
    pub unique_hosts: u64,

    /// Unfinished URLs per depth
    pub unfinished_by_depth: BTreeMap<u32, u64>,

    /// Fingerprint of the config the frontier was built with
    pub config_hash: Option<String>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The frontier store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to read or decode the store
pub fn load_statistics(store: &dyn KvStore) -> StorageResult<CrawlStatistics> {
    let total_urls = store.count(Table::DocIds)?;
    let pending = store.count(Table::Pending)?;
    let in_flight = store.count(Table::InFlight)?;

    let mut hosts = HashSet::new();
    for (url, _) in store.batch_read(Table::DocIds, usize::MAX)? {
        let url = String::from_utf8(url)
            .map_err(|_| StorageError::Corrupt("doc id key is not UTF-8".to_string()))?;
        if let Some(host) = Url::parse(&url).ok().and_then(|u| u.host_str().map(String::from)) {
            hosts.insert(host);
        }
    }

    let mut unfinished_by_depth = BTreeMap::new();
    for table in [Table::Pending, Table::InFlight] {
        for (_, value) in store.batch_read(table, usize::MAX)? {
            let url: WebUrl = serde_json::from_slice(&value)?;
            *unfinished_by_depth.entry(url.depth).or_insert(0) += 1;
        }
    }

    Ok(CrawlStatistics {
        total_urls,
        pending,
        in_flight,
        processed: total_urls.saturating_sub(pending + in_flight),
        unique_hosts: hosts.len() as u64,
        unfinished_by_depth,
        config_hash: stored_config_hash(store)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Frontier Statistics ===\n");

    println!("Overview:");
    println!("  Total URLs scheduled: {}", stats.total_urls);
    println!("  Unique hosts: {}", stats.unique_hosts);
    if let Some(hash) = &stats.config_hash {
        println!("  Config hash: {}", hash);
    }
    println!();

    println!("URLs by State:");
    for (label, count) in [
        ("Processed", stats.processed),
        ("Pending", stats.pending),
        ("In flight", stats.in_flight),
    ] {
        let percentage = if stats.total_urls > 0 {
            (count as f64 / stats.total_urls as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    if !stats.unfinished_by_depth.is_empty() {
        println!("Unfinished URLs by Depth:");
        for (depth, count) in &stats.unfinished_by_depth {
            println!("  {}: {}", depth, count);
        }
        println!();
    }

    if stats.in_flight > 0 {
        println!(
            "{} URLs were in flight when the crawl stopped; they will be retried on resume.",
            stats.in_flight
        );
    }
}
