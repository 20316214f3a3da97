//! Ripple-Crawl main entry point
//!
//! This is the command-line interface for the Ripple-Crawl crawler core.

use anyhow::Context;
use clap::Parser;
use ripple_crawl::config::{load_config_with_hash, Config};
use ripple_crawl::crawler::{CrawlController, DefaultPolicy};
use ripple_crawl::output::{load_statistics, print_statistics, print_summary};
use ripple_crawl::storage::{clear_frontier, open_storage, record_config_hash, stored_config_hash};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ripple-Crawl: a polite, resumable web crawler
///
/// Ripple-Crawl crawls outward from a set of seed URLs while respecting
/// robots.txt and per-host rate limits. With `resumable` enabled an
/// interrupted crawl picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "ripple-crawl")]
#[command(version = "1.0.0")]
#[command(about = "A polite, resumable web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume an interrupted crawl (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, discarding the persisted frontier
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Number of workers, overriding `worker-count`
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Additional seed URL (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show frontier statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    config.seeds.extend(cli.seeds.iter().cloned());
    if let Some(workers) = cli.workers {
        config.crawler.worker_count = workers.max(1);
    }

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_crawl=info,warn"),
            1 => EnvFilter::new("ripple_crawl=debug,info"),
            2 => EnvFilter::new("ripple_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Ripple-Crawl Dry Run ===\n");

    let limit = |value: i64| {
        if value < 0 {
            "unlimited".to_string()
        } else {
            value.to_string()
        }
    };

    println!("Crawler Configuration:");
    println!("  Max depth: {}", limit(config.crawler.max_depth as i64));
    println!("  Max pages: {}", limit(config.crawler.max_pages_to_fetch));
    println!("  Workers: {}", config.crawler.worker_count);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Max download size: {} bytes", config.crawler.max_download_size);
    println!("  Follow redirects: {}", config.crawler.follow_redirects);
    println!("  Halt on error: {}", config.crawler.halt_on_error);
    println!("  Resumable: {}", config.crawler.resumable);

    println!("\nUser Agent:");
    println!("  Header: {}", config.user_agent.header_value());
    println!("  Robots agent: {}", config.robots_agent());

    println!("\nPoliteness:");
    println!("  Delay: {}ms", config.politeness.delay);
    println!("  Mode: {:?}", config.politeness.mode);
    println!(
        "  Respect crawl-delay: {} (max {}ms)",
        config.politeness.respect_crawl_delay, config.politeness.max_crawl_delay
    );

    println!("\nRobots:");
    println!("  Enabled: {}", config.robots.enabled);
    println!("  Expiration: {}h", config.robots.expiration_hours);

    if config.crawler.resumable {
        println!("\nStorage:");
        println!("  Database: {}", config.storage.database_path);
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows frontier statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = open_storage(Path::new(&config.storage.database_path))
        .with_context(|| format!("Failed to open {}", config.storage.database_path))?;
    let stats = load_statistics(&store).context("Failed to read frontier statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let mut controller = CrawlController::new(config.clone(), Arc::new(DefaultPolicy))
        .context("Failed to create crawler")?;

    if config.crawler.resumable {
        let path = Path::new(&config.storage.database_path);
        let store = open_storage(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        if fresh {
            tracing::info!("Starting fresh crawl (discarding previous frontier)");
            clear_frontier(&store).context("Failed to clear the frontier")?;
        } else {
            match stored_config_hash(&store)? {
                Some(previous) if previous != config_hash => {
                    tracing::warn!(
                        "Configuration changed since the frontier was written; resuming anyway"
                    );
                }
                Some(_) => tracing::info!("Resuming previous crawl"),
                None => {}
            }
        }
        record_config_hash(&store, config_hash)?;

        controller = controller
            .with_store(Arc::new(store))
            .context("Failed to restore the frontier")?;
    } else if fresh {
        tracing::debug!("--fresh has no effect without resumable mode");
    }

    for seed in &config.seeds {
        if let Err(e) = controller.add_seed(seed).await {
            tracing::warn!("Skipping seed {}: {}", seed, e);
        }
    }

    let shutdown = controller.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            shutdown.shutdown();
        }
    });

    let summary = controller
        .start(config.crawler.worker_count)
        .await
        .context("Crawl failed")?;
    print_summary(&summary);

    if summary.halted {
        anyhow::bail!("Crawl halted after a fatal error");
    }
    Ok(())
}
