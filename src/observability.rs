//! Metrics hooks for cache operations and background refresh.
//!
//! Implement [`CacheMetrics`] to feed your monitoring system:
//!
//! ```ignore
//! use cache_refresh::observability::CacheMetrics;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_hits").inc();
//!     }
//!     fn record_refresh(&self, _key: &str, _duration: Duration) {
//!         // counter!("cache_refreshes").inc();
//!     }
//! }
//!
//! let cache = CacheClient::with_metrics(backend, config, Box::new(PrometheusMetrics));
//! ```
//!
//! The default methods log via the `log` crate. [`NoOpMetrics`], the default
//! for a new client, drops everything.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a cache set operation.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Record a cache delete operation.
    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// Record an error.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }

    /// Record a background refresh that stored a new value.
    ///
    /// `duration` covers the refresh callback and the write.
    fn record_refresh(&self, key: &str, duration: Duration) {
        debug!("Cache REFRESH: {} took {:?}", key, duration);
    }

    /// Record a refresh callback failure.
    fn record_refresh_error(&self, key: &str, error: &str) {
        warn!("Cache REFRESH ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
    fn record_refresh(&self, _key: &str, _duration: Duration) {}
    fn record_refresh_error(&self, _key: &str, _error: &str) {}
}
