//! Crawl worker loop
//!
//! A worker repeatedly claims a batch from the frontier and, for each URL:
//! checks robots.txt, waits for its politeness slot, fetches, extracts
//! links, schedules the new ones, hands the page to the policy and marks
//! the URL complete. Per-URL failures are reported to the policy and never
//! end the loop.

use crate::crawler::controller::{CrawlCounters, CrawlShared};
use crate::crawler::extractor::ParseData;
use crate::crawler::fetcher::FetchError;
use crate::crawler::policy::Page;
use crate::url::{normalize_url_with, WebUrl};
use crate::CrawlError;
use reqwest::StatusCode;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// Why a worker stopped on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// The frontier had nothing left
    Exhausted,
    /// The crawl was shut down
    Cancelled,
}

/// URLs a worker currently holds, readable by the monitor
#[derive(Debug, Default)]
pub(crate) struct WorkerSlot {
    pub current: Option<WebUrl>,
    pub remaining: VecDeque<WebUrl>,
}

pub(crate) type SharedSlot = Arc<Mutex<WorkerSlot>>;

pub(crate) fn lock_slot(slot: &SharedSlot) -> MutexGuard<'_, WorkerSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts a worker as active for as long as it is held
struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn register(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: active.clone(),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct Worker {
    ordinal: usize,
    shared: Arc<CrawlShared>,
    slot: SharedSlot,
}

impl Worker {
    /// Spawns a worker task
    ///
    /// The worker counts as active from the moment this returns, so the
    /// monitor can't mistake a worker that hasn't been scheduled yet for
    /// an idle one.
    pub fn spawn(
        ordinal: usize,
        shared: Arc<CrawlShared>,
    ) -> (JoinHandle<Result<WorkerExit, CrawlError>>, SharedSlot) {
        let slot: SharedSlot = Arc::new(Mutex::new(WorkerSlot::default()));
        let guard = ActiveGuard::register(&shared.active);

        let worker = Worker {
            ordinal,
            shared,
            slot: slot.clone(),
        };
        (tokio::spawn(worker.run(guard)), slot)
    }

    async fn run(self, guard: ActiveGuard) -> Result<WorkerExit, CrawlError> {
        let mut guard = Some(guard);
        let cancel = self.shared.cancel.clone();
        let frontier = self.shared.frontier.clone();
        let crawler = &self.shared.config.crawler;

        tracing::debug!("Worker {} started", self.ordinal);

        loop {
            if cancel.is_cancelled() {
                return Ok(WorkerExit::Cancelled);
            }

            // Not active while waiting for work
            drop(guard.take());

            let batch = tokio::select! {
                _ = cancel.cancelled() => return Ok(WorkerExit::Cancelled),
                batch = frontier.claim(crawler.batch_size) => match batch {
                    Ok(batch) => batch,
                    Err(e) => {
                        let error = CrawlError::from(e);
                        return Err(self.escalate(None, error));
                    }
                },
            };

            if batch.is_empty() {
                if frontier.is_exhausted() || frontier.is_shutting_down() {
                    tracing::debug!("Worker {} found no more work", self.ordinal);
                    return Ok(WorkerExit::Exhausted);
                }

                tokio::select! {
                    _ = cancel.cancelled() => return Ok(WorkerExit::Cancelled),
                    _ = tokio::time::sleep(crawler.empty_claim_sleep()) => {}
                }
                continue;
            }

            guard = Some(ActiveGuard::register(&self.shared.active));
            tracing::trace!("Worker {} claimed {} URLs", self.ordinal, batch.len());
            lock_slot(&self.slot).remaining = batch.into();

            while let Some(url) = self.next_url() {
                if cancel.is_cancelled() {
                    self.release_held();
                    return Ok(WorkerExit::Cancelled);
                }

                let processed = self.process(&url).await;
                let completed = frontier
                    .complete(&url)
                    .map(|_| ())
                    .map_err(CrawlError::from);
                lock_slot(&self.slot).current = None;

                for error in [processed.err(), completed.err()].into_iter().flatten() {
                    CrawlCounters::bump(&self.shared.counters.unhandled_errors);
                    self.shared.policy.on_unhandled_error(Some(&url), &error);

                    if self.shared.config.crawler.halt_on_error {
                        self.release_held();
                        return Err(self.escalate(Some(&url), error));
                    }
                }
            }
        }
    }

    /// Moves the next batch entry into `current`
    fn next_url(&self) -> Option<WebUrl> {
        let mut slot = lock_slot(&self.slot);
        let next = slot.remaining.pop_front();
        slot.current = next.clone();
        next
    }

    /// Returns everything this worker still holds to the frontier
    fn release_held(&self) {
        let held: Vec<WebUrl> = {
            let mut slot = lock_slot(&self.slot);
            slot.current.take().into_iter().chain(slot.remaining.drain(..)).collect()
        };

        if held.is_empty() {
            return;
        }
        if let Err(e) = self.shared.frontier.release(&held) {
            tracing::error!("Worker {} could not release its batch: {}", self.ordinal, e);
        }
    }

    /// Turns an error into a worker-fatal one, stopping every worker
    /// when `halt-on-error` is set
    fn escalate(&self, url: Option<&WebUrl>, error: CrawlError) -> CrawlError {
        if url.is_none() {
            CrawlCounters::bump(&self.shared.counters.unhandled_errors);
            self.shared.policy.on_unhandled_error(None, &error);
        }

        if self.shared.config.crawler.halt_on_error {
            tracing::error!(
                "Worker {} hit a fatal error, halting the crawl: {}",
                self.ordinal,
                error
            );
            self.shared.halted.store(true, Ordering::SeqCst);
            self.shared.cancel.cancel();
        }

        CrawlError::FatalWorker {
            worker: self.ordinal,
            reason: error.to_string(),
        }
    }

    /// Handles one URL
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Processed, skipped or failed in a way the policy was told about
    /// * `Err(CrawlError)` - Unexpected failure (storage, or the policy's `visit`)
    async fn process(&self, url: &WebUrl) -> Result<(), CrawlError> {
        let shared = &self.shared;
        let counters = &shared.counters;
        let policy = &shared.policy;

        if !shared.robots.allows(url).await {
            CrawlCounters::bump(&counters.disallowed);
            policy.on_disallowed(url);
            return Ok(());
        }

        let Some(host) = url.host_key() else {
            tracing::debug!("Skipping {}: no host", url);
            return Ok(());
        };

        let crawl_delay = match (shared.config.politeness.respect_crawl_delay, url.parsed()) {
            (true, Ok(parsed)) => shared.robots.crawl_delay(&parsed).await,
            _ => None,
        };
        shared.politeness.await_turn(&host, crawl_delay).await;

        let max_size = shared.config.crawler.max_download_size;
        let response = match shared.fetcher.fetch(&url.url, max_size).await {
            Ok(response) => response,
            Err(FetchError::PageTooLarge { size, limit, .. }) => {
                CrawlCounters::bump(&counters.too_large);
                policy.on_page_too_large(url, size, limit);
                return Ok(());
            }
            Err(e) => {
                CrawlCounters::bump(&counters.fetch_failures);
                policy.on_fetch_failure(url, &CrawlError::from(e));
                return Ok(());
            }
        };

        if response.is_redirect() {
            return self.follow_redirect(url, response.redirect_location.as_deref());
        }

        if !response.is_success() {
            CrawlCounters::bump(&counters.unexpected_status);
            let description = StatusCode::from_u16(response.status_code)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("unknown status");
            policy.on_unexpected_status(url, response.status_code, description);
            return Ok(());
        }

        CrawlCounters::bump(&counters.fetched);
        let content_type = response.content_type().map(String::from);

        let data = match shared.extractor.extract(
            &response.body,
            content_type.as_deref(),
            &response.fetched_url,
        ) {
            Ok(data) => data,
            Err(e) => {
                CrawlCounters::bump(&counters.parse_failures);
                policy.on_parse_failure(url, &e);
                return Ok(());
            }
        };

        let outgoing = self.canonical_links(url, &data);

        if !policy.should_follow_links_in(url) {
            tracing::debug!("Not following links in {}", url);
        } else if !shared.config.crawler.depth_allowed(url.depth + 1) {
            tracing::debug!("Not following links in {}: depth limit", url);
        } else {
            let new_links: Vec<WebUrl> = outgoing
                .iter()
                .filter(|link| !shared.frontier.is_seen(&link.url))
                .filter(|link| policy.should_visit(Some(url), link))
                .cloned()
                .collect();
            let scheduled = shared.frontier.schedule_all(new_links)?;
            tracing::trace!("Scheduled {} new links from {}", scheduled.len(), url);
        }

        let page = Page {
            url: url.clone(),
            status_code: response.status_code,
            content_type,
            headers: response.headers,
            body: response.body,
            title: data.title,
            outgoing,
            fetched_url: response.fetched_url,
        };

        policy.visit(&page).await?;
        CrawlCounters::bump(&counters.visited);
        Ok(())
    }

    /// Canonical, deduplicated outgoing links of a page
    fn canonical_links(&self, url: &WebUrl, data: &ParseData) -> Vec<WebUrl> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for link in &data.links {
            let canonical =
                match normalize_url_with(&link.href, Some(&data.base_url), &self.shared.normalize) {
                    Ok(canonical) => canonical,
                    Err(e) => {
                        tracing::trace!("Dropping link {} on {}: {}", link.href, url, e);
                        continue;
                    }
                };
            if !seen.insert(canonical.clone()) {
                continue;
            }

            match url.child(&canonical) {
                Ok(mut child) => {
                    child.anchor = link.anchor.clone();
                    child.tag = Some(link.tag.clone());
                    child.attributes = link.attributes.clone();
                    links.push(child);
                }
                Err(e) => tracing::trace!("Dropping link {} on {}: {}", canonical, url, e),
            }
        }

        links
    }

    /// Schedules the target of a 3xx response at the same depth
    fn follow_redirect(&self, url: &WebUrl, location: Option<&str>) -> Result<(), CrawlError> {
        let shared = &self.shared;
        CrawlCounters::bump(&shared.counters.redirects);
        shared.policy.on_redirect(url, location);

        if !shared.config.crawler.follow_redirects {
            return Ok(());
        }
        let Some(location) = location else {
            return Ok(());
        };

        let canonical = match normalize_url_with(location, Some(&url.url), &shared.normalize) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::debug!("Ignoring redirect from {} to {}: {}", url, location, e);
                return Ok(());
            }
        };

        if shared.frontier.is_seen(&canonical) {
            tracing::debug!("Redirect target {} already seen", canonical);
            return Ok(());
        }

        let target = url.redirect_target(&canonical)?;
        if !shared.policy.should_visit(Some(url), &target) {
            tracing::debug!("Policy rejected redirect target {}", canonical);
            return Ok(());
        }

        shared.frontier.schedule(target)?;
        Ok(())
    }
}
