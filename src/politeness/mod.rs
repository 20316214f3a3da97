//! Request spacing between fetches to the same host
//!
//! Every fetch first reserves a slot from the [`PolitenessGate`]. The
//! reservation is made inside the host's map entry, so two workers can
//! never receive slots closer together than the delay; the wait itself
//! happens after the entry is released, so hosts never block each other.

use crate::config::{PolitenessConfig, PolitenessMode};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Key used for every host in [`PolitenessMode::Global`]
const GLOBAL_KEY: &str = "*";

/// Last reserved slot of one host
#[derive(Debug, Clone, Copy)]
struct HostSlot {
    /// Start of the most recent reservation
    last_slot: Instant,
    /// Delay that applied to that reservation
    delay: Duration,
}

/// Per-host rate limiter
pub struct PolitenessGate {
    config: PolitenessConfig,
    hosts: DashMap<String, HostSlot>,
}

impl PolitenessGate {
    pub fn new(config: &PolitenessConfig) -> Self {
        Self {
            config: config.clone(),
            hosts: DashMap::new(),
        }
    }

    /// Number of hosts currently tracked
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Delay that applies given an optional robots.txt `Crawl-delay`
    pub fn effective_delay(&self, crawl_delay: Option<Duration>) -> Duration {
        let base = self.config.delay();
        match crawl_delay {
            Some(requested) if self.config.respect_crawl_delay => {
                base.max(requested.min(self.config.max_crawl_delay()))
            }
            _ => base,
        }
    }

    /// Waits until the caller may fetch from `host`
    ///
    /// # Arguments
    ///
    /// * `host` - Host key of the URL about to be fetched
    /// * `crawl_delay` - `Crawl-delay` from the host's robots.txt, if any
    ///
    /// # Returns
    ///
    /// How long the caller was held back
    pub async fn await_turn(&self, host: &str, crawl_delay: Option<Duration>) -> Duration {
        let delay = self.effective_delay(crawl_delay);
        let slot = self.reserve(host, delay);
        let now = Instant::now();

        if slot <= now {
            return Duration::ZERO;
        }

        let wait = slot - now;
        tracing::trace!("Waiting {:?} before fetching from {}", wait, host);
        tokio::time::sleep_until(slot).await;
        wait
    }

    /// Reserves the next free slot for `host` and returns its start
    fn reserve(&self, host: &str, delay: Duration) -> Instant {
        let key = match self.config.mode {
            PolitenessMode::PerHost => host.to_lowercase(),
            PolitenessMode::Global => GLOBAL_KEY.to_string(),
        };

        let now = Instant::now();
        let (slot, inserted) = {
            let mut inserted = false;
            let mut entry = self.hosts.entry(key.clone()).or_insert_with(|| {
                inserted = true;
                HostSlot {
                    last_slot: now,
                    delay,
                }
            });

            if !inserted {
                let earliest = entry.last_slot.checked_add(delay).unwrap_or(entry.last_slot);
                entry.last_slot = earliest.max(now);
                entry.delay = delay;
            }
            (entry.last_slot, inserted)
        };

        if inserted && self.hosts.len() > self.config.max_hosts {
            self.evict_oldest(&key);
        }

        slot
    }

    /// Forgets hosts whose last slot ended more than `host-ttl` ago
    ///
    /// A later request to a forgotten host is let through immediately.
    ///
    /// # Returns
    ///
    /// The number of hosts removed
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.host_ttl();
        let before = self.hosts.len();

        self.hosts.retain(|_, slot| {
            slot.last_slot
                .checked_add(slot.delay.saturating_add(ttl))
                .map_or(true, |idle_at| idle_at > now)
        });

        let evicted = before.saturating_sub(self.hosts.len());
        if evicted > 0 {
            tracing::debug!("Evicted {} idle hosts from politeness tracking", evicted);
        }
        evicted
    }

    fn evict_oldest(&self, keep: &str) {
        while self.hosts.len() > self.config.max_hosts {
            let oldest = self
                .hosts
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_slot)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(host) => {
                    self.hosts.remove(&host);
                }
                None => break,
            }
        }
    }
}
