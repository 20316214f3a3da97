//! Output module for crawl reports
//!
//! This module handles:
//! - Printing the summary of a finished crawl
//! - Recording and displaying frontier statistics from the database

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::CrawlSummary;

/// Prints the summary of a finished crawl to stdout
///
/// # Arguments
///
/// * `summary` - Outcome returned by the controller
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    if summary.halted {
        println!("Status: halted after a fatal error");
    } else if summary.frontier.pending > 0 {
        println!("Status: stopped early");
    } else {
        println!("Status: completed");
    }
    println!("Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    println!("Pages:");
    println!("  Fetched: {}", summary.pages_fetched);
    println!("  Visited: {}", summary.pages_visited);
    println!("  Redirects: {}", summary.redirects);
    println!();

    let skipped = [
        ("Disallowed by robots.txt", summary.disallowed),
        ("Fetch failures", summary.fetch_failures),
        ("Too large", summary.pages_too_large),
        ("Parse failures", summary.parse_failures),
        ("Unexpected status", summary.unexpected_status),
        ("Unhandled errors", summary.unhandled_errors),
    ];
    if skipped.iter().any(|(_, count)| *count > 0) {
        println!("Skipped:");
        for (label, count) in skipped.iter().filter(|(_, count)| *count > 0) {
            println!("  {}: {}", label, count);
        }
        println!();
    }

    println!("Frontier:");
    println!("  Scheduled: {}", summary.frontier.scheduled);
    println!("  Processed: {}", summary.frontier.processed);
    println!("  Pending: {}", summary.frontier.pending);

    if summary.workers_respawned > 0 {
        println!();
        println!("Workers respawned: {}", summary.workers_respawned);
    }

    let rate = if summary.elapsed.as_secs_f64() > 0.0 {
        summary.pages_fetched as f64 / summary.elapsed.as_secs_f64()
    } else {
        0.0
    };
    println!();
    println!("Throughput: {:.2} pages/sec", rate);
}
