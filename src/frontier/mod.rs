//! The crawl frontier
//!
//! The [`Frontier`] owns every URL the crawl has ever seen:
//! - Deduplication by canonical URL, with one doc id per URL
//! - A priority ordered queue of pending URLs
//! - The set of URLs claimed by workers but not yet completed
//! - Optional mirroring of all of the above into a [`KvStore`] so an
//!   interrupted crawl can resume
//!
//! The in-memory indices are authoritative while the process runs. When a
//! store is attached, each mutation is committed to it before the
//! in-memory state changes, so the store never lags an acknowledged
//! schedule.

mod key;
mod queue;

pub use key::FrontierKey;

use crate::config::CrawlerConfig;
use crate::storage::{KvStore, StorageResult, Table, WriteOp};
use crate::url::{DocId, WebUrl};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use key::{doc_id_bytes, doc_id_from_bytes};
use queue::{key_of, WorkQueue};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Point-in-time frontier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    /// URLs that received a doc id
    pub scheduled: u64,
    /// URLs completed
    pub processed: u64,
    /// URLs waiting to be claimed
    pub pending: u64,
    /// URLs claimed and not yet completed
    pub in_flight: u64,
}

/// Deduplicating, priority ordered queue of URLs to crawl
pub struct Frontier {
    doc_ids: DashMap<String, DocId>,
    last_doc_id: AtomicU64,
    processed: AtomicU64,
    queue: Mutex<WorkQueue>,
    work_available: Notify,
    shutting_down: AtomicBool,
    store: Option<Arc<dyn KvStore>>,
    max_depth: i32,
    max_pages: i64,
    claim_timeout: Duration,
}

impl Frontier {
    /// Creates an empty, memory-only frontier
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            doc_ids: DashMap::new(),
            last_doc_id: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            queue: Mutex::new(WorkQueue::default()),
            work_available: Notify::new(),
            shutting_down: AtomicBool::new(false),
            store: None,
            max_depth: config.max_depth,
            max_pages: config.max_pages_to_fetch,
            claim_timeout: config.claim_timeout(),
        }
    }

    /// Opens a frontier backed by `store`, restoring any saved state
    ///
    /// URLs that were in flight when the previous run stopped are moved
    /// back to pending.
    ///
    /// # Arguments
    ///
    /// * `config` - Crawler limits
    /// * `store` - The store to restore from and mirror into
    ///
    /// # Returns
    ///
    /// * `Ok(Frontier)` - Restored frontier
    /// * `Err(StorageError)` - The store could not be read or holds corrupt records
    pub fn open(config: &CrawlerConfig, store: Arc<dyn KvStore>) -> StorageResult<Self> {
        let mut frontier = Self::new(config);

        let mut last_doc_id = 0;
        for (url, id) in store.batch_read(Table::DocIds, usize::MAX)? {
            let url = String::from_utf8(url).map_err(|_| {
                crate::storage::StorageError::Corrupt("doc id key is not UTF-8".to_string())
            })?;
            let id = doc_id_from_bytes(&id)?;
            last_doc_id = last_doc_id.max(id);
            frontier.doc_ids.insert(url, id);
        }

        let mut restored = WorkQueue::default();
        for (key, value) in store.batch_read(Table::Pending, usize::MAX)? {
            let key = FrontierKey::from_bytes(&key)?;
            let url: WebUrl = serde_json::from_slice(&value)?;
            restored.pending.insert(key, url);
        }

        let mut requeue = Vec::new();
        for (id, value) in store.batch_read(Table::InFlight, usize::MAX)? {
            let url: WebUrl = serde_json::from_slice(&value)?;
            requeue.push(WriteOp::delete(Table::InFlight, id));
            requeue.push(WriteOp::put(Table::Pending, key_of(&url).to_bytes(), value));
            restored.push(url);
        }

        let interrupted = requeue.len() / 2;
        store.commit(requeue)?;

        let unfinished = restored.pending.len() as u64;
        let processed = (frontier.doc_ids.len() as u64).saturating_sub(unfinished);

        tracing::info!(
            "Restored frontier: {} known URLs, {} pending ({} interrupted), {} processed",
            frontier.doc_ids.len(),
            unfinished,
            interrupted,
            processed
        );

        frontier.last_doc_id = AtomicU64::new(last_doc_id);
        frontier.processed = AtomicU64::new(processed);
        frontier.queue = Mutex::new(restored);
        frontier.store = Some(store);
        Ok(frontier)
    }

    fn queue(&self) -> MutexGuard<'_, WorkQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if a URL at `depth` may be scheduled
    fn depth_allowed(&self, depth: u32) -> bool {
        self.max_depth < 0 || i64::from(depth) <= i64::from(self.max_depth)
    }

    /// Takes the next doc id unless the page cap is reached
    fn reserve_doc_id(&self) -> Option<DocId> {
        let cap = self.max_pages;
        self.last_doc_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                if cap >= 0 && last >= cap as u64 {
                    None
                } else {
                    Some(last + 1)
                }
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Schedules a URL if its canonical form has never been seen
    ///
    /// Duplicates, URLs beyond the depth limit and URLs past the page cap
    /// are dropped without consuming a doc id.
    ///
    /// # Arguments
    ///
    /// * `url` - A URL whose `url` field is already canonical
    ///
    /// # Returns
    ///
    /// * `Ok(Some(id))` - The URL was new and is now pending under `id`
    /// * `Ok(None)` - The URL was dropped
    /// * `Err(StorageError)` - The store rejected the write; nothing was scheduled
    pub fn schedule(&self, mut url: WebUrl) -> StorageResult<Option<DocId>> {
        if !self.depth_allowed(url.depth) {
            tracing::debug!("Not scheduling {}: depth {} exceeds limit", url.url, url.depth);
            return Ok(None);
        }

        let id = match self.doc_ids.entry(url.url.clone()) {
            Entry::Occupied(_) => {
                tracing::trace!("Already seen: {}", url.url);
                return Ok(None);
            }
            Entry::Vacant(slot) => {
                let Some(id) = self.reserve_doc_id() else {
                    tracing::debug!("Not scheduling {}: page limit reached", url.url);
                    return Ok(None);
                };
                url.doc_id = id;

                if let Some(store) = &self.store {
                    let value = serde_json::to_vec(&url)?;
                    store.commit(vec![
                        WriteOp::put(Table::DocIds, url.url.as_bytes(), doc_id_bytes(id)),
                        WriteOp::put(Table::Pending, key_of(&url).to_bytes(), value),
                    ])?;
                }

                slot.insert(id);
                id
            }
        };

        tracing::trace!("Scheduled {} as {}", url.url, id);
        self.queue().push(url);
        self.work_available.notify_waiters();
        Ok(Some(id))
    }

    /// Schedules every URL, see [`schedule`](Self::schedule)
    ///
    /// # Returns
    ///
    /// The ids assigned to the URLs that were new
    pub fn schedule_all(&self, urls: Vec<WebUrl>) -> StorageResult<Vec<DocId>> {
        let mut ids = Vec::new();
        for url in urls {
            if let Some(id) = self.schedule(url)? {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Claims up to `max_count` pending URLs in `(priority, depth, id)` order
    ///
    /// When nothing is pending but URLs are still in flight, waits up to
    /// the claim timeout for other workers to schedule more. Returns an
    /// empty batch at once when the frontier is exhausted or shut down.
    pub async fn claim(&self, max_count: usize) -> StorageResult<Vec<WebUrl>> {
        let deadline = Instant::now() + self.claim_timeout;

        loop {
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shutting_down() {
                return Ok(Vec::new());
            }

            {
                let mut queue = self.queue();
                let batch = self.take_batch(&mut queue, max_count)?;
                if !batch.is_empty() {
                    return Ok(batch);
                }
                if queue.in_flight.is_empty() {
                    return Ok(Vec::new());
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    fn take_batch(&self, queue: &mut WorkQueue, max_count: usize) -> StorageResult<Vec<WebUrl>> {
        let peeked = queue.peek(max_count);
        if peeked.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(store) = &self.store {
            let mut ops = Vec::with_capacity(peeked.len() * 2);
            for (key, url) in &peeked {
                ops.push(WriteOp::delete(Table::Pending, key.to_bytes()));
                ops.push(WriteOp::put(
                    Table::InFlight,
                    doc_id_bytes(url.doc_id),
                    serde_json::to_vec(url)?,
                ));
            }
            store.commit(ops)?;
        }

        let keys: Vec<FrontierKey> = peeked.into_iter().map(|(key, _)| key).collect();
        Ok(queue.take(&keys))
    }

    /// Marks a claimed URL as done
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The URL was in flight and is now processed
    /// * `Ok(false)` - The URL was not in flight (already completed or never claimed)
    pub fn complete(&self, url: &WebUrl) -> StorageResult<bool> {
        let mut queue = self.queue();
        if !queue.in_flight.contains_key(&url.doc_id) {
            return Ok(false);
        }

        if let Some(store) = &self.store {
            store.delete(Table::InFlight, &doc_id_bytes(url.doc_id))?;
        }

        queue.in_flight.remove(&url.doc_id);
        self.processed.fetch_add(1, Ordering::SeqCst);

        if queue.is_exhausted() {
            // Wake claimers so they observe exhaustion without waiting out their timeout
            self.work_available.notify_waiters();
        }
        Ok(true)
    }

    /// Returns claimed URLs that were not processed to the pending queue
    ///
    /// # Returns
    ///
    /// How many URLs went back to pending
    pub fn release(&self, urls: &[WebUrl]) -> StorageResult<usize> {
        let mut queue = self.queue();

        let returned: Vec<&WebUrl> = urls
            .iter()
            .filter(|url| queue.in_flight.contains_key(&url.doc_id))
            .collect();
        if returned.is_empty() {
            return Ok(0);
        }

        if let Some(store) = &self.store {
            let mut ops = Vec::with_capacity(returned.len() * 2);
            for url in &returned {
                ops.push(WriteOp::delete(Table::InFlight, doc_id_bytes(url.doc_id)));
                ops.push(WriteOp::put(
                    Table::Pending,
                    key_of(url).to_bytes(),
                    serde_json::to_vec(url)?,
                ));
            }
            store.commit(ops)?;
        }

        let count = returned.len();
        for url in returned {
            if let Some(url) = queue.in_flight.remove(&url.doc_id) {
                queue.push(url);
            }
        }
        drop(queue);

        tracing::debug!("Released {} claimed URLs back to the frontier", count);
        self.work_available.notify_waiters();
        Ok(count)
    }

    /// True iff nothing is pending and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        self.queue().is_exhausted()
    }

    /// Releases blocked claimers; later claims return empty immediately
    pub fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Frontier shutting down");
        }
        self.work_available.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Doc id of a canonical URL, if it was ever scheduled
    pub fn doc_id(&self, url: &str) -> Option<DocId> {
        self.doc_ids.get(url).map(|id| *id)
    }

    pub fn is_seen(&self, url: &str) -> bool {
        self.doc_ids.contains_key(url)
    }

    pub fn stats(&self) -> FrontierStats {
        let queue = self.queue();
        FrontierStats {
            scheduled: self.doc_ids.len() as u64,
            processed: self.processed.load(Ordering::SeqCst),
            pending: queue.pending.len() as u64,
            in_flight: queue.in_flight.len() as u64,
        }
    }

    /// Whether this frontier mirrors into a store
    pub fn is_resumable(&self) -> bool {
        self.store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            claim_timeout: 50,
            ..CrawlerConfig::default()
        }
    }

    fn seed(url: &str) -> WebUrl {
        WebUrl::new(url).unwrap()
    }

    #[test]
    fn test_schedule_assigns_sequential_ids() {
        let frontier = Frontier::new(&config());
        assert_eq!(frontier.schedule(seed("http://a.com/1")).unwrap(), Some(1));
        assert_eq!(frontier.schedule(seed("http://a.com/2")).unwrap(), Some(2));
        assert_eq!(frontier.doc_id("http://a.com/2"), Some(2));
        assert_eq!(frontier.doc_id("http://a.com/3"), None);
    }

    #[test]
    fn test_duplicate_does_not_consume_id() {
        let frontier = Frontier::new(&config());
        frontier.schedule(seed("http://a.com/")).unwrap();
        assert_eq!(frontier.schedule(seed("http://a.com/")).unwrap(), None);
        assert_eq!(frontier.schedule(seed("http://b.com/")).unwrap(), Some(2));
        assert_eq!(frontier.stats().pending, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_duplicate_schedules_yield_one_id() {
        let frontier = Arc::new(Frontier::new(&config()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                frontier.schedule(seed("http://same.com/page")).unwrap()
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(id) = handle.await.unwrap() {
                winners.push(id);
            }
        }

        assert_eq!(winners, vec![1]);
        assert_eq!(frontier.stats().scheduled, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_claims_are_disjoint() {
        let frontier = Arc::new(Frontier::new(&config()));
        for i in 0..200 {
            frontier
                .schedule(seed(&format!("http://a.com/{}", i)))
                .unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let frontier = frontier.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                loop {
                    let batch = frontier.claim(7).await.unwrap();
                    if batch.is_empty() {
                        break;
                    }
                    mine.extend(batch.into_iter().map(|url| url.doc_id));
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        let unique: HashSet<DocId> = all.iter().copied().collect();
        assert_eq!(all.len(), 200);
        assert_eq!(unique.len(), 200);
    }

    #[tokio::test]
    async fn test_claim_order() {
        let frontier = Frontier::new(&config());

        let mut deep = seed("http://a.com/deep");
        deep.depth = 2;
        let mut low_priority = seed("http://a.com/low");
        low_priority.priority = 5;

        frontier.schedule(deep).unwrap();
        frontier.schedule(low_priority).unwrap();
        frontier.schedule(seed("http://a.com/first")).unwrap();
        frontier.schedule(seed("http://a.com/second")).unwrap();

        let order: Vec<String> = frontier
            .claim(10)
            .await
            .unwrap()
            .into_iter()
            .map(|url| url.url)
            .collect();

        assert_eq!(
            order,
            vec![
                "http://a.com/first",
                "http://a.com/second",
                "http://a.com/deep",
                "http://a.com/low",
            ]
        );
    }

    #[test]
    fn test_depth_cutoff() {
        let frontier = Frontier::new(&CrawlerConfig {
            max_depth: 1,
            ..config()
        });

        let root = seed("http://a.com/");
        let child = root.child("http://a.com/child").unwrap();
        let grandchild = child.child("http://a.com/grandchild").unwrap();

        assert!(frontier.schedule(root).unwrap().is_some());
        assert!(frontier.schedule(child).unwrap().is_some());
        assert_eq!(frontier.schedule(grandchild).unwrap(), None);
        assert!(!frontier.is_seen("http://a.com/grandchild"));
    }

    #[test]
    fn test_page_cap() {
        let frontier = Frontier::new(&CrawlerConfig {
            max_pages_to_fetch: 2,
            ..config()
        });

        assert!(frontier.schedule(seed("http://a.com/1")).unwrap().is_some());
        assert!(frontier.schedule(seed("http://a.com/2")).unwrap().is_some());
        assert_eq!(frontier.schedule(seed("http://a.com/3")).unwrap(), None);
        assert_eq!(frontier.stats().scheduled, 2);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent_and_exhausts() {
        let frontier = Frontier::new(&config());
        assert!(frontier.is_exhausted());

        frontier.schedule(seed("http://a.com/")).unwrap();
        assert!(!frontier.is_exhausted());

        let batch = frontier.claim(1).await.unwrap();
        assert!(!frontier.is_exhausted());

        assert!(frontier.complete(&batch[0]).unwrap());
        assert!(!frontier.complete(&batch[0]).unwrap());
        assert!(frontier.is_exhausted());

        let stats = frontier.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_completed_url_is_never_rescheduled() {
        let frontier = Frontier::new(&config());
        frontier.schedule(seed("http://a.com/")).unwrap();
        let batch = frontier.claim(1).await.unwrap();
        frontier.complete(&batch[0]).unwrap();

        assert_eq!(frontier.schedule(seed("http://a.com/")).unwrap(), None);
        assert!(frontier.claim(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_on_exhausted_frontier_returns_immediately() {
        let frontier = Frontier::new(&CrawlerConfig {
            claim_timeout: 10_000,
            ..config()
        });

        let start = std::time::Instant::now();
        assert!(frontier.claim(5).await.unwrap().is_empty());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_claim_waits_for_released_work() {
        let frontier = Arc::new(Frontier::new(&CrawlerConfig {
            claim_timeout: 5_000,
            ..config()
        }));
        frontier.schedule(seed("http://a.com/")).unwrap();
        let batch = frontier.claim(1).await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.claim(1).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(frontier.release(&batch).unwrap(), 1);

        let reclaimed = waiter.await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].url, "http://a.com/");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_releases_blocked_claim() {
        let frontier = Arc::new(Frontier::new(&CrawlerConfig {
            claim_timeout: 30_000,
            ..config()
        }));
        frontier.schedule(seed("http://a.com/")).unwrap();
        frontier.claim(1).await.unwrap();

        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move { frontier.claim(1).await.unwrap() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        frontier.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("claim should return after shutdown")
            .unwrap();
        assert!(result.is_empty());

        frontier.schedule(seed("http://b.com/")).unwrap();
        assert!(frontier.claim(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resume_restores_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frontier.db");

        {
            let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&path).unwrap());
            let frontier = Frontier::open(&config(), store).unwrap();
            assert!(frontier.is_resumable());

            for i in 1..=4 {
                frontier
                    .schedule(seed(&format!("http://a.com/{}", i)))
                    .unwrap();
            }
            let batch = frontier.claim(2).await.unwrap();
            frontier.complete(&batch[0]).unwrap();
            // batch[1] stays in flight, as if the process died mid-fetch
        }

        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&path).unwrap());
        let frontier = Frontier::open(&config(), store.clone()).unwrap();

        let stats = frontier.stats();
        assert_eq!(stats.scheduled, 4);
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(store.count(Table::InFlight).unwrap(), 0);

        // Ids continue after the highest restored id
        assert_eq!(frontier.schedule(seed("http://a.com/5")).unwrap(), Some(5));
        assert_eq!(frontier.schedule(seed("http://a.com/1")).unwrap(), None);

        let urls: Vec<String> = frontier
            .claim(10)
            .await
            .unwrap()
            .into_iter()
            .map(|url| url.url)
            .collect();
        assert_eq!(
            urls,
            vec!["http://a.com/2", "http://a.com/3", "http://a.com/4", "http://a.com/5"]
        );
    }
}
