//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! Stands in for a memcached server in tests and local development.

use super::CacheBackend;
use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stored value with its expiration.
struct StoredValue {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        StoredValue {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe async in-memory cache backend.
///
/// Clones share the same store, the way clients of one memcached server do.
///
/// # Example
///
/// ```no_run
/// use cache_refresh::backend::{InMemoryBackend, CacheBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("key1", b"\"value\"".to_vec(), Duration::from_secs(90)).await?;
///     assert!(backend.get("key1").await?.is_some());
///
///     // `add` refuses to overwrite
///     assert!(!backend.add("key1", b"1".to_vec(), Duration::from_secs(90)).await?);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    /// Create a new in-memory cache backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Drop the expired entry, if any
        self.store.remove_if(key, |_, v| v.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.store
            .insert(key.to_string(), StoredValue::new(value, ttl));
        debug!("✓ InMemory SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(value, ttl));
                    debug!("✓ InMemory ADD {} (replaced expired)", key);
                    Ok(true)
                } else {
                    debug!("✗ InMemory ADD {} -> NOT_STORED", key);
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl));
                debug!("✓ InMemory ADD {} (TTL: {:?})", key, ttl);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let results: Vec<Option<Vec<u8>>> = keys
            .iter()
            .map(|k| {
                self.store
                    .get(*k)
                    .filter(|entry| !entry.is_expired())
                    .map(|entry| entry.data.clone())
            })
            .collect();

        debug!("✓ InMemory MGET {} keys", keys.len());
        Ok(results)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn clear_all(&self) -> Result<()> {
        self.store.clear();
        warn!("⚠ InMemory FLUSH_ALL executed - all cache cleared!");
        Ok(())
    }
}
