//! Background refresh of keys nearing expiration.
//!
//! A key stored with a [`RefreshCallback`] gets a [`RefreshRecord`] in the
//! [`RefreshRegistry`]. The [`RefreshScheduler`] wakes up every
//! `background_refresh_interval`, picks the records whose remaining lifetime
//! dropped below `background_refresh_min_ttl`, runs their callbacks and writes
//! the fresh values back with a renewed lifetime. The record then lives on
//! until it is unsubscribed or the cache is flushed.

pub mod registry;
pub mod scheduler;

pub use registry::{InFlightGuard, RefreshRegistry};
pub use scheduler::RefreshScheduler;

use crate::error::Result;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Future returned by a refresh callback.
pub type RefreshFuture = BoxFuture<'static, Result<Value>>;

/// Caller-supplied function producing a fresh value for a key.
///
/// Cloning is cheap; clones call the same function.
///
/// ```
/// use cache_refresh::RefreshCallback;
/// use serde_json::json;
///
/// let callback = RefreshCallback::new(|key: String| async move {
///     Ok(json!({ "key": key, "fresh": true }))
/// });
/// # let _ = callback;
/// ```
#[derive(Clone)]
pub struct RefreshCallback {
    func: Arc<dyn Fn(String) -> RefreshFuture + Send + Sync>,
}

impl RefreshCallback {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        RefreshCallback {
            func: Arc::new(move |key| func(key).boxed()),
        }
    }

    /// Invoke the callback for `key`.
    pub fn call(&self, key: &str) -> RefreshFuture {
        (self.func)(key.to_string())
    }

    /// Whether both handles wrap the same function.
    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &RefreshCallback) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for RefreshCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCallback").finish_non_exhaustive()
    }
}

/// Refresh bookkeeping for one key.
#[derive(Clone, Debug)]
pub struct RefreshRecord {
    pub key: String,
    /// When the value last written for this key expires on the server.
    pub expires_at: Instant,
    /// Lifetime reapplied on every refresh.
    pub life_span: Duration,
    pub callback: RefreshCallback,
    /// Assigned by [`RefreshRegistry::upsert`]; each registration gets a new one.
    pub generation: u64,
}

impl RefreshRecord {
    /// Record for a value written just now with lifetime `life_span`.
    pub fn new(key: impl Into<String>, life_span: Duration, callback: RefreshCallback) -> Self {
        RefreshRecord {
            key: key.into(),
            expires_at: Instant::now() + life_span,
            life_span,
            callback,
            generation: 0,
        }
    }

    /// Lifetime left at `now`; zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Whether the key should be refreshed on a tick happening at `now`.
    pub fn is_due(&self, now: Instant, min_ttl: Duration) -> bool {
        self.remaining(now) < min_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_refresh_callback_receives_key() {
        let callback = RefreshCallback::new(|key: String| async move { Ok(json!(key)) });

        let value = callback.call("one").await.expect("Callback failed");
        assert_eq!(value, json!("one"));

        let clone = callback.clone();
        assert!(clone.ptr_eq(&callback));
    }

    #[test]
    fn test_record_is_due() {
        let callback = RefreshCallback::new(|_key: String| async { Ok(json!(1)) });
        let record = RefreshRecord::new("key", Duration::from_secs(1), callback);
        let now = Instant::now();

        assert!(record.remaining(now) <= Duration::from_secs(1));
        assert!(record.is_due(now, Duration::from_secs(70)));
        assert!(!record.is_due(now, Duration::from_millis(1)));

        let later = now + Duration::from_secs(5);
        assert_eq!(record.remaining(later), Duration::ZERO);
        assert!(record.is_due(later, Duration::from_millis(1)));
    }
}
