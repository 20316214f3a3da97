//! Crawl controller - the public entry point of a crawl
//!
//! The [`CrawlController`] wires the frontier, robots engine, politeness
//! gate, fetcher, extractor and policy together, accepts seeds, and runs
//! the worker pool under a [`Monitor`](crate::crawler::monitor::Monitor)
//! that decides when the crawl is over.

use crate::config::Config;
use crate::crawler::extractor::{ContentExtractor, HtmlExtractor};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::monitor::Monitor;
use crate::crawler::policy::CrawlPolicy;
use crate::frontier::{Frontier, FrontierStats};
use crate::politeness::PolitenessGate;
use crate::robots::RobotsEngine;
use crate::storage::{KvStore, StorageResult};
use crate::url::{normalize_url_with, DocId, NormalizeOptions, WebUrl};
use crate::CrawlError;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Running totals of per-URL outcomes
#[derive(Debug, Default)]
pub struct CrawlCounters {
    pub fetched: AtomicU64,
    pub visited: AtomicU64,
    pub redirects: AtomicU64,
    pub disallowed: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub too_large: AtomicU64,
    pub parse_failures: AtomicU64,
    pub unexpected_status: AtomicU64,
    pub unhandled_errors: AtomicU64,
    pub respawned_workers: AtomicU64,
}

impl CrawlCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of a finished crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages_fetched: u64,
    pub pages_visited: u64,
    pub redirects: u64,
    pub disallowed: u64,
    pub fetch_failures: u64,
    pub pages_too_large: u64,
    pub parse_failures: u64,
    pub unexpected_status: u64,
    pub unhandled_errors: u64,
    pub workers_respawned: u64,
    /// Frontier counters when the crawl ended
    pub frontier: FrontierStats,
    pub elapsed: Duration,
    /// The crawl was stopped by a fatal error under `halt-on-error`
    pub halted: bool,
}

impl CrawlSummary {
    pub(crate) fn collect(shared: &CrawlShared, elapsed: Duration) -> Self {
        let counters = &shared.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        Self {
            pages_fetched: load(&counters.fetched),
            pages_visited: load(&counters.visited),
            redirects: load(&counters.redirects),
            disallowed: load(&counters.disallowed),
            fetch_failures: load(&counters.fetch_failures),
            pages_too_large: load(&counters.too_large),
            parse_failures: load(&counters.parse_failures),
            unexpected_status: load(&counters.unexpected_status),
            unhandled_errors: load(&counters.unhandled_errors),
            workers_respawned: load(&counters.respawned_workers),
            frontier: shared.frontier.stats(),
            elapsed,
            halted: shared.halted.load(Ordering::SeqCst),
        }
    }
}

/// State shared by the workers and the monitor of one crawl
pub(crate) struct CrawlShared {
    pub config: Arc<Config>,
    pub frontier: Arc<Frontier>,
    pub robots: Arc<RobotsEngine>,
    pub politeness: Arc<PolitenessGate>,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub policy: Arc<dyn CrawlPolicy>,
    pub counters: Arc<CrawlCounters>,
    pub normalize: NormalizeOptions,
    /// Workers currently holding a batch
    pub active: Arc<AtomicUsize>,
    pub cancel: CancellationToken,
    pub halted: AtomicBool,
}

/// Cloneable handle that stops a running crawl
#[derive(Clone)]
pub struct ShutdownHandle {
    frontier: Arc<Frontier>,
    cancel: CancellationToken,
}

impl ShutdownHandle {
    /// Cooperative stop: in-flight fetches finish, workers exit after
    /// their current URL and return the rest of their batch
    pub fn shutdown(&self) {
        tracing::info!("Shutting down crawl");
        self.frontier.shutdown();
        self.cancel.cancel();
    }
}

/// Entry point for running a crawl
pub struct CrawlController {
    config: Arc<Config>,
    policy: Arc<dyn CrawlPolicy>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn ContentExtractor>,
    frontier: Arc<Frontier>,
    robots: Arc<RobotsEngine>,
    politeness: Arc<PolitenessGate>,
    counters: Arc<CrawlCounters>,
    cancel: CancellationToken,
    started: AtomicBool,
    finished_tx: Mutex<Option<watch::Sender<Option<CrawlSummary>>>>,
    finished_rx: watch::Receiver<Option<CrawlSummary>>,
}

impl CrawlController {
    /// Creates a controller with the default HTTP fetcher and HTML extractor
    ///
    /// # Arguments
    ///
    /// * `config` - Validated crawl configuration
    /// * `policy` - Hooks steering the crawl
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlController)` - Ready to accept seeds
    /// * `Err(CrawlError::Http)` - The HTTP client could not be built
    pub fn new(config: Arc<Config>, policy: Arc<dyn CrawlPolicy>) -> Result<Self, CrawlError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config)?);
        let (finished_tx, finished_rx) = watch::channel(None);

        Ok(Self {
            frontier: Arc::new(Frontier::new(&config.crawler)),
            robots: Arc::new(RobotsEngine::new(&config, fetcher.clone())),
            politeness: Arc::new(PolitenessGate::new(&config.politeness)),
            extractor: Arc::new(HtmlExtractor::new()),
            counters: Arc::new(CrawlCounters::default()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            finished_tx: Mutex::new(Some(finished_tx)),
            finished_rx,
            fetcher,
            policy,
            config,
        })
    }

    /// Replaces the fetcher used for pages and robots.txt
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.robots = Arc::new(RobotsEngine::new(&self.config, fetcher.clone()));
        self.fetcher = fetcher;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Backs the frontier with `store`, restoring whatever it holds
    ///
    /// Must be called before any seed is added.
    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> StorageResult<Self> {
        self.frontier = Arc::new(Frontier::open(&self.config.crawler, store)?);
        Ok(self)
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            strip_session_ids: self.config.crawler.strip_session_ids,
        }
    }

    /// Adds a seed URL at depth 0
    ///
    /// # Returns
    ///
    /// * `Ok(Some(id))` - The seed was scheduled
    /// * `Ok(None)` - Already known, rejected by the policy or disallowed by robots.txt
    /// * `Err(CrawlError::InvalidUrl)` - The URL cannot be canonicalized
    pub async fn add_seed(&self, url: &str) -> Result<Option<DocId>, CrawlError> {
        let canonical = normalize_url_with(url, None, &self.normalize_options()).map_err(|e| {
            CrawlError::InvalidUrl {
                href: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let seed = WebUrl::new(&canonical)?;

        if !self.policy.should_visit(None, &seed) {
            tracing::info!("Policy rejected seed {}", canonical);
            return Ok(None);
        }

        if !self.robots.allows(&seed).await {
            tracing::info!("Robots.txt does not allow this seed: {}", canonical);
            return Ok(None);
        }

        let id = self.frontier.schedule(seed)?;
        match id {
            Some(id) => tracing::info!("Added seed {} as {}", canonical, id),
            None => tracing::debug!("Seed {} already known", canonical),
        }
        Ok(id)
    }

    /// Handle that can stop the crawl from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            frontier: self.frontier.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Stops the crawl, see [`ShutdownHandle::shutdown`]
    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }

    /// Starts `worker_count` workers and returns at once
    pub fn start_non_blocking(&self, worker_count: usize) -> Result<(), CrawlError> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("Crawl already started");
            return Ok(());
        }

        let finished_tx = self
            .finished_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CrawlError::ShuttingDown)?;

        let shared = Arc::new(CrawlShared {
            config: self.config.clone(),
            frontier: self.frontier.clone(),
            robots: self.robots.clone(),
            politeness: self.politeness.clone(),
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            policy: self.policy.clone(),
            counters: self.counters.clone(),
            normalize: self.normalize_options(),
            active: Arc::new(AtomicUsize::new(0)),
            cancel: self.cancel.clone(),
            halted: AtomicBool::new(false),
        });

        let worker_count = worker_count.max(1);
        tracing::info!(
            "Starting crawl with {} workers ({} URLs pending)",
            worker_count,
            self.frontier.stats().pending
        );

        let monitor = Monitor::start(shared, worker_count, finished_tx);
        tokio::spawn(monitor.run());
        Ok(())
    }

    /// Waits for the crawl started by [`start_non_blocking`](Self::start_non_blocking)
    pub async fn wait_until_finish(&self) -> Result<CrawlSummary, CrawlError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(CrawlError::NotStarted);
        }

        let mut finished = self.finished_rx.clone();
        let summary = finished
            .wait_for(|summary| summary.is_some())
            .await
            .map_err(|_| CrawlError::ShuttingDown)?
            .clone();

        summary.ok_or(CrawlError::ShuttingDown)
    }

    /// Runs the crawl to completion with `worker_count` workers
    pub async fn start(&self, worker_count: usize) -> Result<CrawlSummary, CrawlError> {
        self.start_non_blocking(worker_count)?;
        self.wait_until_finish().await
    }

    /// Whether the crawl has finished
    pub fn is_finished(&self) -> bool {
        self.finished_rx.borrow().is_some()
    }
}
