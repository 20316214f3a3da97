//! Worker supervision and crawl termination
//!
//! The monitor wakes every `monitor-interval` and:
//! - Replaces workers that panicked or died on an error, keeping their
//!   ordinal, after returning the URLs they held to the frontier. A panic
//!   halts the crawl instead when `halt-on-error` is set
//! - Restarts workers that exited for lack of work if work reappeared
//! - Declares the crawl finished once it sees no active worker and an
//!   exhausted frontier twice, `termination-grace` apart
//!
//! On finish or shutdown it stops the frontier, cancels the workers,
//! joins them and publishes the [`CrawlSummary`].

use crate::crawler::controller::{CrawlCounters, CrawlShared, CrawlSummary};
use crate::crawler::worker::{lock_slot, SharedSlot, Worker, WorkerExit};
use crate::CrawlError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

struct WorkerHandle {
    ordinal: usize,
    /// `None` once the worker has exited and was not replaced
    task: Option<JoinHandle<Result<WorkerExit, CrawlError>>>,
    slot: SharedSlot,
}

pub(crate) struct Monitor {
    shared: Arc<CrawlShared>,
    workers: Vec<WorkerHandle>,
    finished: watch::Sender<Option<CrawlSummary>>,
    started_at: Instant,
}

impl Monitor {
    /// Spawns `worker_count` workers with ordinals starting at 1
    pub fn start(
        shared: Arc<CrawlShared>,
        worker_count: usize,
        finished: watch::Sender<Option<CrawlSummary>>,
    ) -> Self {
        let workers = (1..=worker_count)
            .map(|ordinal| {
                let (task, slot) = Worker::spawn(ordinal, shared.clone());
                WorkerHandle {
                    ordinal,
                    task: Some(task),
                    slot,
                }
            })
            .collect();

        Self {
            shared,
            workers,
            finished,
            started_at: Instant::now(),
        }
    }

    pub async fn run(mut self) {
        let cancel = self.shared.cancel.clone();
        let grace = self.shared.config.crawler.termination_grace();
        let mut ticker = tokio::time::interval(self.shared.config.crawler.monitor_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => {}
            }

            self.check_workers().await;

            if cancel.is_cancelled() {
                if self.shared.halted.load(Ordering::SeqCst) {
                    tracing::error!("Crawl halted after a fatal worker error");
                } else {
                    tracing::info!("Crawl stopped before the frontier was exhausted");
                }
                break;
            }

            if self.is_idle() {
                tracing::debug!(
                    "No active workers and nothing left to crawl, confirming in {:?}",
                    grace
                );
                tokio::select! {
                    _ = tokio::time::sleep(grace) => {}
                    _ = cancel.cancelled() => continue,
                }

                if self.is_idle() {
                    tracing::info!("All workers idle and frontier exhausted, finishing crawl");
                    break;
                }
            }

            self.shared.politeness.evict_idle();
        }

        self.shared.frontier.shutdown();
        cancel.cancel();
        self.join_workers().await;

        let summary = CrawlSummary::collect(&self.shared, self.started_at.elapsed());
        tracing::info!(
            "Crawl finished in {:.1}s: {} pages fetched, {} visited, {} URLs scheduled",
            summary.elapsed.as_secs_f64(),
            summary.pages_fetched,
            summary.pages_visited,
            summary.frontier.scheduled
        );
        self.finished.send_replace(Some(summary));
    }

    fn is_idle(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst) == 0 && self.shared.frontier.is_exhausted()
    }

    async fn check_workers(&mut self) {
        for index in 0..self.workers.len() {
            let finished = self.workers[index]
                .task
                .as_ref()
                .map(|task| task.is_finished());
            match finished {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    if !self.shared.frontier.is_exhausted() {
                        tracing::debug!(
                            "Work reappeared, restarting worker {}",
                            self.workers[index].ordinal
                        );
                        self.respawn(index);
                    }
                    continue;
                }
            }

            let Some(task) = self.workers[index].task.take() else {
                continue;
            };
            let ordinal = self.workers[index].ordinal;

            match task.await {
                Ok(Ok(exit)) => {
                    tracing::debug!("Worker {} exited: {:?}", ordinal, exit);
                }
                Ok(Err(e)) => {
                    tracing::error!("Worker {} stopped: {}", ordinal, e);
                    self.recover(index);
                    self.replace_dead(index);
                }
                Err(e) => {
                    self.report_panic(index, &e);
                    self.recover(index);
                    if self.shared.config.crawler.halt_on_error {
                        tracing::error!("Worker {} panicked, halting the crawl", ordinal);
                        self.shared.halted.store(true, Ordering::SeqCst);
                        self.shared.cancel.cancel();
                    } else {
                        self.replace_dead(index);
                    }
                }
            }
        }
    }

    /// Tells the policy about a worker task that panicked
    fn report_panic(&self, index: usize, error: &JoinError) {
        let handle = &self.workers[index];
        tracing::error!("Worker {} died: {}", handle.ordinal, error);

        let current = lock_slot(&handle.slot).current.clone();
        let error = CrawlError::FatalWorker {
            worker: handle.ordinal,
            reason: error.to_string(),
        };
        CrawlCounters::bump(&self.shared.counters.unhandled_errors);
        self.shared.policy.on_unhandled_error(current.as_ref(), &error);
    }

    /// Settles the URLs a dead worker held
    ///
    /// The URL it was processing is completed without a retry; the rest of
    /// its batch goes back to pending.
    fn recover(&self, index: usize) {
        let handle = &self.workers[index];
        let (current, remaining) = {
            let mut slot = lock_slot(&handle.slot);
            let remaining: Vec<_> = slot.remaining.drain(..).collect();
            (slot.current.take(), remaining)
        };

        if let Some(url) = current {
            tracing::warn!("Abandoning {} held by worker {}", url, handle.ordinal);
            if let Err(e) = self.shared.frontier.complete(&url) {
                tracing::error!("Could not complete {}: {}", url, e);
            }
        }

        if !remaining.is_empty() {
            if let Err(e) = self.shared.frontier.release(&remaining) {
                tracing::error!(
                    "Could not release the batch of worker {}: {}",
                    handle.ordinal,
                    e
                );
            }
        }
    }

    fn replace_dead(&mut self, index: usize) {
        if self.respawn(index) {
            CrawlCounters::bump(&self.shared.counters.respawned_workers);
            tracing::info!("Respawned worker {}", self.workers[index].ordinal);
        }
    }

    /// Starts a fresh worker in `index`'s place unless the crawl is ending
    fn respawn(&mut self, index: usize) -> bool {
        if self.shared.cancel.is_cancelled() || self.shared.frontier.is_shutting_down() {
            return false;
        }

        let ordinal = self.workers[index].ordinal;
        let (task, slot) = Worker::spawn(ordinal, self.shared.clone());
        self.workers[index] = WorkerHandle {
            ordinal,
            task: Some(task),
            slot,
        };
        true
    }

    async fn join_workers(&mut self) {
        for index in 0..self.workers.len() {
            let Some(task) = self.workers[index].task.take() else {
                continue;
            };

            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::debug!("Worker {} ended with: {}", self.workers[index].ordinal, e),
                Err(e) => {
                    self.report_panic(index, &e);
                    self.recover(index);
                }
            }
        }
    }
}
