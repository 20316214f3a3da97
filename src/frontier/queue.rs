use crate::frontier::key::FrontierKey;
use crate::url::{DocId, WebUrl};
use std::collections::{BTreeMap, HashMap};

/// In-memory pending and in-flight sets, guarded by the frontier's lock
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    pub pending: BTreeMap<FrontierKey, WebUrl>,
    pub in_flight: HashMap<DocId, WebUrl>,
}

impl WorkQueue {
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    /// First `max_count` pending entries in claim order
    pub fn peek(&self, max_count: usize) -> Vec<(FrontierKey, &WebUrl)> {
        self.pending
            .iter()
            .take(max_count)
            .map(|(key, url)| (*key, url))
            .collect()
    }

    /// Moves the given pending entries to in-flight
    pub fn take(&mut self, keys: &[FrontierKey]) -> Vec<WebUrl> {
        let mut batch = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(url) = self.pending.remove(key) {
                self.in_flight.insert(url.doc_id, url.clone());
                batch.push(url);
            }
        }
        batch
    }

    pub fn push(&mut self, url: WebUrl) {
        self.pending.insert(key_of(&url), url);
    }
}

/// Claim-order key of a scheduled URL
pub(crate) fn key_of(url: &WebUrl) -> FrontierKey {
    FrontierKey::new(url.priority, url.depth, url.doc_id)
}
