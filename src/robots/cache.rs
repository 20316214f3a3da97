//! Per-host cache of robots.txt directives
//!
//! Entries expire after a fixed age and the cache holds at most
//! `capacity` hosts, evicting the least recently accessed one.

use crate::robots::directives::HostDirectives;
use chrono::Duration as ChronoDuration;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// One cached host; the cell is filled by the first lookup's fetch
struct CacheSlot {
    directives: OnceCell<Arc<HostDirectives>>,
    last_access: AtomicU64,
}

impl CacheSlot {
    fn new(tick: u64) -> Self {
        Self {
            directives: OnceCell::new(),
            last_access: AtomicU64::new(tick),
        }
    }
}

/// LRU cache of [`HostDirectives`] keyed by host
pub struct DirectivesCache {
    entries: DashMap<String, Arc<CacheSlot>>,
    capacity: usize,
    ttl: ChronoDuration,
    clock: AtomicU64,
}

impl DirectivesCache {
    pub fn new(capacity: usize, ttl: ChronoDuration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            clock: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    /// Returns the directives for `host`, running `fetch` when absent or expired
    ///
    /// Concurrent lookups of an uncached host wait on a single fetch.
    pub async fn get_or_fetch<F, Fut>(&self, host: &str, fetch: F) -> Arc<HostDirectives>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = HostDirectives>,
    {
        let fetched_here = AtomicBool::new(false);

        loop {
            let slot = self.slot_for(host);

            let directives = slot
                .directives
                .get_or_init(|| async {
                    fetched_here.store(true, Ordering::Relaxed);
                    Arc::new(fetch().await)
                })
                .await
                .clone();

            if fetched_here.load(Ordering::Relaxed) || !directives.is_expired(self.ttl) {
                return directives;
            }

            tracing::debug!("robots.txt for {} expired, refetching", host);
            self.entries
                .remove_if(host, |_, current| Arc::ptr_eq(current, &slot));
        }
    }

    /// Looks up or creates the slot for `host` and records the access
    fn slot_for(&self, host: &str) -> Arc<CacheSlot> {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;

        let slot = {
            let entry = self
                .entries
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(CacheSlot::new(tick)));
            entry.value().clone()
        };
        slot.last_access.store(tick, Ordering::Relaxed);

        self.enforce_capacity(host);
        slot
    }

    /// Evicts least recently accessed hosts until within capacity
    fn enforce_capacity(&self, keep: &str) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            match oldest {
                Some(host) => {
                    tracing::trace!("Evicting robots.txt cache entry for {}", host);
                    self.entries.remove(&host);
                }
                None => break,
            }
        }
    }
}
