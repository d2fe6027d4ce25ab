//! Key → refresh record mapping.
//!
//! Written by the facade on every refreshing `set`, read by the scheduler on
//! every tick. DashMap shards the locks per key so neither side blocks the
//! other for long, and [`RefreshRegistry::due`] hands out a snapshot so no
//! lock is held while callbacks run.

use super::RefreshRecord;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Thread-safe registry of keys subscribed to background refresh.
///
/// Clones share the same records.
#[derive(Clone, Default)]
pub struct RefreshRegistry {
    records: Arc<DashMap<String, RefreshRecord>>,
    in_flight: Arc<DashSet<String>>,
    generations: Arc<AtomicU64>,
}

impl RefreshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `record.key`.
    ///
    /// The record gets a fresh generation, so refreshes started from the
    /// replaced record can tell they are stale. Returns `true` if a previous
    /// record was replaced.
    pub fn upsert(&self, mut record: RefreshRecord) -> bool {
        record.generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let key = record.key.clone();
        let replaced = self.records.insert(key.clone(), record).is_some();
        debug!(
            "Refresh record {} for key={}",
            if replaced { "updated" } else { "created" },
            key
        );
        replaced
    }

    pub fn remove(&self, key: &str) -> Option<RefreshRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    pub fn get(&self, key: &str) -> Option<RefreshRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Push the expiration of `refreshed` to `now + life_span` after a
    /// successful refresh.
    ///
    /// Only applies while `refreshed` is still the registered record. Returns
    /// `false` when the key was unsubscribed, flushed or re-registered by a
    /// newer `set` meanwhile, in which case nothing changes.
    pub fn renew(&self, refreshed: &RefreshRecord, now: Instant) -> bool {
        match self.records.get_mut(&refreshed.key) {
            Some(mut record) if record.generation == refreshed.generation => {
                let life_span = record.life_span;
                record.expires_at = now + life_span;
                true
            }
            _ => false,
        }
    }

    /// Whether a different record than `refreshed` is registered for its key.
    pub fn is_superseded(&self, refreshed: &RefreshRecord) -> bool {
        self.get(&refreshed.key)
            .is_some_and(|current| current.generation != refreshed.generation)
    }

    /// Snapshot of the records whose remaining lifetime is below `min_ttl`.
    pub fn due(&self, now: Instant, min_ttl: Duration) -> Vec<RefreshRecord> {
        self.records
            .iter()
            .filter(|r| r.is_due(now, min_ttl))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Mark `key` as being refreshed.
    ///
    /// Returns `None` if a refresh for the key is already running. The mark
    /// is dropped together with the returned guard.
    pub fn try_begin(&self, key: &str) -> Option<InFlightGuard> {
        if self.in_flight.insert(key.to_string()) {
            Some(InFlightGuard {
                key: key.to_string(),
                in_flight: Arc::clone(&self.in_flight),
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    /// Drop every record. Returns how many there were.
    pub fn clear(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Marks a key as having a refresh in progress until dropped.
pub struct InFlightGuard {
    key: String,
    in_flight: Arc<DashSet<String>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}
