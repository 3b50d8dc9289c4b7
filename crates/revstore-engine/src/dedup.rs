//! Short-lived record of delivered watch events.
//!
//! Entries expire after a fixed TTL equal to the notifier's lookback
//! window. Nothing older than the window is re-read, so nothing older needs
//! to be remembered.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// TTL set of delivered event keys.
#[derive(Debug)]
pub struct DedupCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Whether `key` was recorded within the TTL.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|inserted| inserted.elapsed() < self.ttl)
    }

    pub fn insert(&self, key: String) {
        self.entries.insert(key, Instant::now());
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        self.entries
            .retain(|_, inserted| inserted.elapsed() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
