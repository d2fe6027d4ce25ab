//! Key-value operations facade with background refresh.

use crate::backend::{CacheBackend, ServerEvent};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::key::{validate_key, DelKeys};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::refresh::{RefreshCallback, RefreshRecord, RefreshRegistry, RefreshScheduler};
use crate::serialization::{decode_or_raw, encode_or_raw, encode_value};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Options for [`CacheClient::set`].
///
/// ```
/// use cache_refresh::{RefreshCallback, SetOptions};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let options = SetOptions::default()
///     .with_lifetime(Duration::from_secs(300))
///     .with_refresh(RefreshCallback::new(|_key: String| async { Ok(json!("fresh")) }));
/// assert!(options.refresh.is_some());
/// ```
#[derive(Clone, Debug, Default)]
pub struct SetOptions {
    /// Lifetime of the entry. `None` or zero means the configured default.
    pub lifetime: Option<Duration>,

    /// Subscribe the key to background refresh with this callback.
    pub refresh: Option<RefreshCallback>,
}

impl SetOptions {
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_refresh(mut self, callback: RefreshCallback) -> Self {
        self.refresh = Some(callback);
        self
    }
}

/// A value passed to [`CacheClient::mset`].
#[derive(Clone, Debug, PartialEq)]
pub enum CacheValue {
    /// Stored with the batch lifetime.
    Plain(Value),
    /// Stored with its own lifetime, overriding the batch one.
    WithLifetime(Value, Duration),
}

impl CacheValue {
    pub fn value(&self) -> &Value {
        match self {
            CacheValue::Plain(value) | CacheValue::WithLifetime(value, _) => value,
        }
    }

    /// Lifetime for this entry: its own override, else the batch lifetime,
    /// else `default`. Zero durations count as unset.
    pub fn effective_lifetime(&self, batch: Option<Duration>, default: Duration) -> Duration {
        let own = match self {
            CacheValue::Plain(_) => None,
            CacheValue::WithLifetime(_, lifetime) => Some(*lifetime),
        };
        own.filter(|d| !d.is_zero())
            .or(batch.filter(|d| !d.is_zero()))
            .unwrap_or(default)
    }
}

impl From<Value> for CacheValue {
    fn from(value: Value) -> Self {
        CacheValue::Plain(value)
    }
}

/// Caching facade over a [`CacheBackend`].
///
/// Cheap to clone; clones share the backend, the refresh registry and the
/// scheduler. The refresh timer stops once the last clone is dropped.
///
/// Every method must be called from within a tokio runtime.
///
/// # Example
///
/// ```no_run
/// use cache_refresh::{backend::InMemoryBackend, CacheClient, CacheConfig, RefreshCallback, SetOptions};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # async fn example() -> cache_refresh::Result<()> {
/// let cache = CacheClient::new(InMemoryBackend::new(), CacheConfig::default());
///
/// cache.set("greeting", json!("hello"), SetOptions::default()).await?;
/// assert_eq!(cache.get("greeting").await?, Some(json!("hello")));
///
/// // Keep a hot key warm
/// let refresh = RefreshCallback::new(|_key: String| async { Ok(json!({"total": 42})) });
/// cache
///     .set(
///         "stats",
///         json!({"total": 41}),
///         SetOptions::default()
///             .with_lifetime(Duration::from_secs(120))
///             .with_refresh(refresh),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct CacheClient<B: CacheBackend> {
    inner: Arc<ClientInner<B>>,
}

impl<B: CacheBackend> Clone for CacheClient<B> {
    fn clone(&self) -> Self {
        CacheClient {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ClientInner<B: CacheBackend> {
    backend: B,
    config: CacheConfig,
    registry: RefreshRegistry,
    scheduler: RefreshScheduler,
    metrics: Box<dyn CacheMetrics>,
}

impl<B: CacheBackend> CacheClient<B> {
    /// Create a new client over `backend`.
    pub fn new(backend: B, config: CacheConfig) -> Self {
        Self::with_metrics(backend, config, Box::new(NoOpMetrics))
    }

    /// Create a new client with custom metrics.
    pub fn with_metrics(backend: B, config: CacheConfig, metrics: Box<dyn CacheMetrics>) -> Self {
        CacheClient {
            inner: Arc::new(ClientInner {
                backend,
                config,
                registry: RefreshRegistry::new(),
                scheduler: RefreshScheduler::new(),
                metrics,
            }),
        }
    }

    /// Store `value` only if `key` is absent.
    ///
    /// # Errors
    /// - `Error::CacheWriteError`: key already present, or the server failed
    /// - `Error::InvalidKey`: malformed key
    /// - `Error::SerializationError`: value could not be encoded
    pub async fn add(&self, key: &str, value: Value, lifetime: Option<Duration>) -> Result<()> {
        validate_key(key)?;
        let lifetime = self.inner.config.lifetime_or_default(lifetime);
        debug!("add() called with key={} lifetime={:?}", key, lifetime);

        let bytes = encode_value(&value)?;
        let timer = Instant::now();
        match self.inner.backend.add(key, bytes, lifetime).await {
            Ok(true) => {
                self.inner.metrics.record_set(key, timer.elapsed());
                debug!("add():success key={}", key);
                Ok(())
            }
            Ok(false) => {
                debug!("add(): key={} already exists", key);
                Err(Error::CacheWriteError(format!(
                    "Unable to add {}: key already exists",
                    key
                )))
            }
            Err(e) => {
                error!("add(): Unable to store {} to memcached, err: {}", key, e);
                self.inner.metrics.record_error(key, &e.to_string());
                Err(Error::CacheWriteError(format!(
                    "Unable to add {}: {}",
                    key, e
                )))
            }
        }
    }

    /// Fetch one key. A miss is `Ok(None)`, never an error.
    ///
    /// Stored text that isn't valid JSON comes back as a JSON string.
    ///
    /// # Errors
    /// - `Error::CacheReadError`: the server failed
    /// - `Error::InvalidKey`: malformed key
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        debug!("get() called with key={}", key);

        let timer = Instant::now();
        match self.inner.backend.get(key).await {
            Ok(Some(bytes)) if !bytes.is_empty() => {
                self.inner.metrics.record_hit(key, timer.elapsed());
                debug!("get():hit key={}", key);
                Ok(Some(decode_or_raw(key, &bytes)))
            }
            Ok(_) => {
                self.inner.metrics.record_miss(key, timer.elapsed());
                debug!("get():miss key={}", key);
                Ok(None)
            }
            Err(e) => {
                error!("Unable to get key={} from memcached, err: {}", key, e);
                self.inner.metrics.record_error(key, &e.to_string());
                Err(Error::CacheReadError(format!(
                    "Unable to get {}: {}",
                    key, e
                )))
            }
        }
    }

    /// Fetch several keys at once.
    ///
    /// Every requested key is in the result: `None` for misses, the decoded
    /// value otherwise. A value that fails to decode is logged and returned
    /// as its raw text instead of failing the batch.
    ///
    /// # Errors
    /// - `Error::CacheReadError`: the server failed
    /// - `Error::InvalidKey`: a malformed key
    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, Option<Value>>> {
        let keys: Vec<&str> = keys.iter().map(|k| k.as_ref()).collect();
        for key in &keys {
            validate_key(key)?;
        }
        debug!("mget() called with keys={:?}", keys);

        let timer = Instant::now();
        let values = self.inner.backend.mget(&keys).await.map_err(|e| {
            error!("mget(): Unable to get keys from memcached, err: {}", e);
            Error::CacheReadError(format!("Unable to get {} keys: {}", keys.len(), e))
        })?;

        let mut values = values.into_iter();
        let mut response = HashMap::with_capacity(keys.len());
        for key in keys {
            let value = values
                .next()
                .flatten()
                .filter(|bytes| !bytes.is_empty())
                .map(|bytes| decode_or_raw(key, &bytes));

            match value {
                Some(_) => self.inner.metrics.record_hit(key, timer.elapsed()),
                None => self.inner.metrics.record_miss(key, timer.elapsed()),
            }
            response.insert(key.to_string(), value);
        }

        Ok(response)
    }

    /// [`mget`](Self::mget) that hands `index` back untouched, so callers
    /// running several batches at once can tell the results apart.
    pub async fn mget_indexed<K: AsRef<str>, I>(
        &self,
        keys: &[K],
        index: I,
    ) -> (Result<HashMap<String, Option<Value>>>, I) {
        (self.mget(keys).await, index)
    }

    /// Store `value`, optionally subscribing the key to background refresh.
    ///
    /// With `options.refresh` set, the key is (re)registered with the given
    /// callback and lifetime, and the refresh scheduler is started if it
    /// isn't running. Without it an existing registration is left alone.
    ///
    /// # Errors
    /// - `Error::ConfigError`: refresh requested while the refresh settings
    ///   are invalid; nothing is written
    /// - `Error::CacheWriteError`: the server failed
    /// - `Error::InvalidKey`: malformed key
    /// - `Error::SerializationError`: value could not be encoded
    pub async fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<()> {
        validate_key(key)?;
        let bytes = encode_value(&value)?;
        self.inner
            .store(key, bytes, options.lifetime, options.refresh)
            .await
    }

    /// Store several values concurrently.
    ///
    /// Lifetime per entry: [`CacheValue::WithLifetime`] override, else
    /// `lifetime`, else the configured default. Entries that fail to encode
    /// are logged and stored as raw text.
    ///
    /// Resolves with the stored keys in input order, or with the first error
    /// to come back. Writes still in flight at that point are not cancelled.
    ///
    /// # Errors
    /// - `Error::CacheWriteError`: a write failed
    /// - `Error::InvalidKey`: a malformed key (checked before anything is written)
    pub async fn mset<K, V, I>(&self, entries: I, lifetime: Option<Duration>) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CacheValue>,
    {
        let entries: Vec<(String, CacheValue)> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        for (key, _) in &entries {
            validate_key(key)?;
        }

        let default = self.inner.config.default_lifetime;
        let handles = entries
            .into_iter()
            .map(|(key, entry)| {
                let lifetime = entry.effective_lifetime(lifetime, default);
                let bytes = encode_or_raw(&key, entry.value());
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    inner.store(&key, bytes, Some(lifetime), None).await?;
                    Ok(key)
                })
            })
            .collect();

        join_batch(handles).await
    }

    /// Delete one key or a batch of keys.
    ///
    /// Batches run concurrently with the same policy as [`mset`](Self::mset).
    /// Refresh registrations are not touched: a subscribed key comes back on
    /// the next refresh. Use [`unsubscribe`](Self::unsubscribe) first to stop
    /// that.
    ///
    /// # Errors
    /// - `Error::CacheDeleteError`: a delete failed
    /// - `Error::InvalidKey`: a malformed key (checked before anything is deleted)
    pub async fn del(&self, keys: impl Into<DelKeys>) -> Result<Vec<String>> {
        match keys.into() {
            DelKeys::One(key) => {
                self.inner.delete(&key).await?;
                Ok(vec![key])
            }
            DelKeys::Many(keys) => {
                for key in &keys {
                    validate_key(key)?;
                }
                debug!("del() called with {} keys", keys.len());

                let handles = keys
                    .into_iter()
                    .map(|key| {
                        let inner = Arc::clone(&self.inner);
                        tokio::spawn(async move {
                            inner.delete(&key).await?;
                            Ok(key)
                        })
                    })
                    .collect();

                join_batch(handles).await
            }
        }
    }

    /// Clear the cache server and stop background refresh.
    ///
    /// All refresh registrations are dropped; a later refreshing `set`
    /// starts the scheduler again. Refresh callbacks already running may
    /// still write their value after this returns.
    ///
    /// # Errors
    /// `Error::CacheFlushError` if the server failed.
    pub async fn flush(&self) -> Result<()> {
        debug!("flush() called");
        self.inner.scheduler.disable();
        let dropped = self.inner.registry.clear();
        if dropped > 0 {
            debug!("flush(): dropped {} refresh record(s)", dropped);
        }

        self.inner.backend.clear_all().await.map_err(|e| {
            error!("flush(): Unable to flush memcached, err: {}", e);
            Error::CacheFlushError(e.to_string())
        })
    }

    /// Subscribe `key` to background refresh without writing a value.
    ///
    /// The key is treated as expiring `lifetime` (or the default) from now.
    ///
    /// # Errors
    /// - `Error::ConfigError`: invalid refresh settings
    /// - `Error::InvalidKey`: malformed key
    pub fn subscribe(
        &self,
        key: &str,
        lifetime: Option<Duration>,
        callback: RefreshCallback,
    ) -> Result<()> {
        validate_key(key)?;
        if !self.inner.scheduler.is_enabled() {
            self.inner.config.validate()?;
        }

        let lifetime = self.inner.config.lifetime_or_default(lifetime);
        self.inner
            .registry
            .upsert(RefreshRecord::new(key, lifetime, callback));
        self.inner.ensure_refresh_enabled()
    }

    /// Stop refreshing `key`. Returns `false` if it wasn't subscribed.
    ///
    /// The cached value itself stays until it expires or is deleted.
    pub fn unsubscribe(&self, key: &str) -> bool {
        let removed = self.inner.registry.remove(key).is_some();
        if removed {
            debug!("unsubscribe(): key={} no longer refreshed", key);
        }
        removed
    }

    pub fn is_subscribed(&self, key: &str) -> bool {
        self.inner.registry.contains(key)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_refresh_enabled(&self) -> bool {
        self.inner.scheduler.is_enabled()
    }

    /// React to a server availability notification from the cache client.
    ///
    /// Downtime reports are logged. A server failure is returned as
    /// `Error::ServerDown` for the caller to act on; nothing is retried here.
    pub fn handle_server_event(&self, event: &ServerEvent) -> Result<()> {
        if event.is_fatal() {
            error!("{}", event);
            return Err(Error::ServerDown(event.to_string()));
        }

        warn!("{}", event);
        Ok(())
    }

    /// Whether the backend is reachable.
    ///
    /// # Errors
    /// Returns `Err` if the backend reports a failure.
    pub async fn health_check(&self) -> Result<bool> {
        self.inner.backend.health_check().await
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }
}

impl<B: CacheBackend> ClientInner<B> {
    async fn store(
        self: &Arc<Self>,
        key: &str,
        bytes: Vec<u8>,
        lifetime: Option<Duration>,
        refresh: Option<RefreshCallback>,
    ) -> Result<()> {
        let lifetime = self.config.lifetime_or_default(lifetime);
        debug!("set() called with key={}, lifetime={:?}", key, lifetime);

        // Bad refresh settings must fail before anything is written
        if refresh.is_some() && !self.scheduler.is_enabled() {
            self.config.validate()?;
        }

        let timer = Instant::now();
        if let Err(e) = self.backend.set(key, bytes, lifetime).await {
            error!("set(): Unable to store {} to memcached, err: {}", key, e);
            self.metrics.record_error(key, &e.to_string());
            return Err(Error::CacheWriteError(format!(
                "Unable to store {}: {}",
                key, e
            )));
        }
        self.metrics.record_set(key, timer.elapsed());
        debug!("set():success key={}", key);

        if let Some(callback) = refresh {
            self.registry
                .upsert(RefreshRecord::new(key, lifetime, callback));
            self.ensure_refresh_enabled()?;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        debug!("del() called with key={}", key);

        let timer = Instant::now();
        self.backend.delete(key).await.map_err(|e| {
            error!("del(): Unable to delete {} from memcached, err: {}", key, e);
            self.metrics.record_error(key, &e.to_string());
            Error::CacheDeleteError(format!("Unable to delete {}: {}", key, e))
        })?;

        self.metrics.record_delete(key, timer.elapsed());
        Ok(())
    }

    /// Start the scheduler if needed. The timer only holds a weak reference
    /// and stops once the client is gone.
    fn ensure_refresh_enabled(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        self.scheduler.enable(&self.config, move || match weak.upgrade() {
            Some(inner) => {
                inner.run_refresh_cycle();
                true
            }
            None => false,
        })?;
        Ok(())
    }

    /// One scheduler tick: spawn a refresh for every due key that isn't
    /// already being refreshed.
    fn run_refresh_cycle(self: &Arc<Self>) {
        let due = self
            .registry
            .due(Instant::now(), self.config.background_refresh_min_ttl);

        for record in due {
            let Some(guard) = self.registry.try_begin(&record.key) else {
                continue;
            };
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.refresh(record).await;
                drop(guard);
            });
        }
    }

    async fn refresh(&self, record: RefreshRecord) {
        let key = record.key.as_str();
        let timer = Instant::now();

        let value = match record.callback.call(key).await {
            Ok(value) => value,
            Err(e) => {
                // Record untouched, retried on the next tick
                warn!("Background refresh failed for key={}, err: {}", key, e);
                self.metrics.record_refresh_error(key, &e.to_string());
                return;
            }
        };

        // A refreshing set landed while the callback ran; its value wins
        if self.registry.is_superseded(&record) {
            debug!("Background refresh for key={} superseded by a newer set", key);
            return;
        }

        let bytes = encode_or_raw(key, &value);
        if let Err(e) = self.backend.set(key, bytes, record.life_span).await {
            warn!("Background refresh could not store key={}, err: {}", key, e);
            self.metrics.record_refresh_error(key, &e.to_string());
            return;
        }

        if self.registry.renew(&record, Instant::now()) {
            debug!("Background refresh stored key={}", key);
        } else {
            debug!(
                "Background refresh stored key={} after it was unsubscribed or replaced",
                key
            );
        }
        self.metrics.record_refresh(key, timer.elapsed());
    }
}

/// Wait for a batch of spawned operations.
///
/// Results come back in spawn order. The first error wins; remaining tasks
/// are detached, not aborted.
async fn join_batch(handles: Vec<JoinHandle<Result<String>>>) -> Result<Vec<String>> {
    let mut done: Vec<Option<String>> = vec![None; handles.len()];
    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .enumerate()
        .map(|(index, handle)| async move { (index, handle.await) })
        .collect();

    while let Some((index, joined)) = pending.next().await {
        match joined {
            Ok(Ok(key)) => done[index] = Some(key),
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(Error::Other(format!("Batch task failed: {}", e))),
        }
    }

    Ok(done.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, ServerEventKind};
    use serde_json::json;

    fn client() -> CacheClient<InMemoryBackend> {
        CacheClient::new(InMemoryBackend::new(), CacheConfig::default())
    }

    #[derive(Clone)]
    struct FailingBackend;

    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::BackendError("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
            Err(Error::BackendError("connection refused".to_string()))
        }

        async fn add(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<bool> {
            Err(Error::BackendError("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<()> {
            Err(Error::BackendError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_get_absent_key_is_none() {
        let cache = client();
        assert_eq!(cache.get("key").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = client();
        cache
            .set(
                "key",
                json!("value"),
                SetOptions::default().with_lifetime(Duration::from_secs(1)),
            )
            .await
            .expect("Failed to set");

        assert_eq!(
            cache.get("key").await.expect("Failed to get"),
            Some(json!("value"))
        );
    }

    #[tokio::test]
    async fn test_set_stores_json_text() {
        let cache = client();
        cache
            .set("key", json!({"a": 1}), SetOptions::default())
            .await
            .expect("Failed to set");

        let raw = cache
            .backend()
            .get("key")
            .await
            .expect("Failed to get")
            .expect("Value missing");
        assert_eq!(raw, br#"{"a":1}"#.to_vec());
    }

    #[tokio::test]
    async fn test_get_raw_text_is_returned_as_string() {
        let cache = client();
        cache
            .backend()
            .set("key", b"value".to_vec(), Duration::from_secs(5))
            .await
            .expect("Failed to set");

        assert_eq!(
            cache.get("key").await.expect("Failed to get"),
            Some(json!("value"))
        );
    }

    #[tokio::test]
    async fn test_get_empty_value_is_none() {
        let cache = client();
        cache
            .backend()
            .set("key", Vec::new(), Duration::from_secs(5))
            .await
            .expect("Failed to set");

        assert_eq!(cache.get("key").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_add_refuses_existing_key() {
        let cache = client();
        cache
            .add("key", json!(1), None)
            .await
            .expect("First add should succeed");

        let result = cache.add("key", json!(2), None).await;
        assert!(matches!(result, Err(Error::CacheWriteError(_))));
        assert_eq!(cache.get("key").await.expect("Failed to get"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let cache = client();
        let result = cache.set("bad key", json!(1), SetOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidKey(_))));

        let result = cache.del(vec!["ok", ""]).await;
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_mget_mixed_keys() {
        let cache = client();
        cache
            .set("a", json!("v1"), SetOptions::default())
            .await
            .expect("Failed to set");
        cache
            .set("b", json!({"n": 2}), SetOptions::default())
            .await
            .expect("Failed to set");

        let response = cache.mget(&["a", "b", "c"]).await.expect("Failed to mget");
        assert_eq!(response.len(), 3);
        assert_eq!(response["a"], Some(json!("v1")));
        assert_eq!(response["b"], Some(json!({"n": 2})));
        assert_eq!(response["c"], None);
    }

    #[tokio::test]
    async fn test_mget_indexed_returns_index() {
        let cache = client();
        let (result, index) = cache.mget_indexed(&["a"], 7usize).await;
        assert_eq!(index, 7);
        assert_eq!(result.expect("Failed to mget")["a"], None);
    }

    #[tokio::test]
    async fn test_mset_then_mget() {
        let cache = client();
        let stored = cache
            .mset(vec![("a", json!("v1")), ("b", json!("v2"))], None)
            .await
            .expect("Failed to mset");
        assert_eq!(stored, vec!["a".to_string(), "b".to_string()]);

        let response = cache
            .mget(&["a", "b", "c"])
            .await
            .expect("Failed to mget");
        assert_eq!(response["a"], Some(json!("v1")));
        assert_eq!(response["b"], Some(json!("v2")));
        assert_eq!(response["c"], None);
    }

    #[tokio::test]
    async fn test_mset_per_entry_lifetime() {
        let cache = client();
        cache
            .mset(
                vec![
                    ("short", CacheValue::WithLifetime(json!(1), Duration::from_millis(20))),
                    ("long", CacheValue::Plain(json!(2))),
                ],
                Some(Duration::from_secs(60)),
            )
            .await
            .expect("Failed to mset");

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("short").await.expect("Failed to get"), None);
        assert_eq!(cache.get("long").await.expect("Failed to get"), Some(json!(2)));
    }

    #[test]
    fn test_cache_value_effective_lifetime() {
        let default = Duration::from_secs(90);
        let batch = Some(Duration::from_secs(30));

        let plain = CacheValue::from(json!(1));
        assert_eq!(plain.effective_lifetime(None, default), default);
        assert_eq!(plain.effective_lifetime(batch, default), Duration::from_secs(30));

        let own = CacheValue::WithLifetime(json!(1), Duration::from_secs(5));
        assert_eq!(own.effective_lifetime(batch, default), Duration::from_secs(5));

        let zero = CacheValue::WithLifetime(json!(1), Duration::ZERO);
        assert_eq!(zero.effective_lifetime(batch, default), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_del_single_and_batch() {
        let cache = client();
        cache
            .mset(vec![("a", json!(1)), ("b", json!(2)), ("c", json!(3))], None)
            .await
            .expect("Failed to mset");

        let deleted = cache.del("a").await.expect("Failed to del");
        assert_eq!(deleted, vec!["a".to_string()]);

        let deleted = cache.del(["b", "c"]).await.expect("Failed to del");
        assert_eq!(deleted, vec!["b".to_string(), "c".to_string()]);

        let response = cache.mget(&["a", "b", "c"]).await.expect("Failed to mget");
        assert!(response.values().all(Option::is_none));
    }

    #[tokio::test]
    async fn test_backend_failures_map_to_operation_errors() {
        let cache = CacheClient::new(FailingBackend, CacheConfig::default());

        assert!(matches!(
            cache.get("key").await,
            Err(Error::CacheReadError(_))
        ));
        assert!(matches!(
            cache.mget(&["key"]).await,
            Err(Error::CacheReadError(_))
        ));
        assert!(matches!(
            cache.set("key", json!(1), SetOptions::default()).await,
            Err(Error::CacheWriteError(_))
        ));
        assert!(matches!(
            cache.add("key", json!(1), None).await,
            Err(Error::CacheWriteError(_))
        ));
        assert!(matches!(
            cache.mset(vec![("a", json!(1)), ("b", json!(2))], None).await,
            Err(Error::CacheWriteError(_))
        ));
        assert!(matches!(
            cache.del(["a", "b"]).await,
            Err(Error::CacheDeleteError(_))
        ));
        assert!(matches!(cache.flush().await, Err(Error::CacheFlushError(_))));
    }

    #[tokio::test]
    async fn test_refreshing_set_with_failing_backend_does_not_subscribe() {
        let cache = CacheClient::new(FailingBackend, CacheConfig::default());
        let refresh = RefreshCallback::new(|_key: String| async { Ok(json!(1)) });

        let result = cache
            .set("key", json!(0), SetOptions::default().with_refresh(refresh))
            .await;

        assert!(matches!(result, Err(Error::CacheWriteError(_))));
        assert!(!cache.is_subscribed("key"));
        assert!(!cache.is_refresh_enabled());
    }

    #[tokio::test]
    async fn test_flush_clears_everything() {
        let cache = client();
        cache
            .mset(vec![("a", json!(1)), ("b", json!(2))], None)
            .await
            .expect("Failed to mset");

        cache.flush().await.expect("Failed to flush");

        let response = cache.mget(&["a", "b"]).await.expect("Failed to mget");
        assert_eq!(response["a"], None);
        assert_eq!(response["b"], None);
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let cache = client();
        let refresh = RefreshCallback::new(|_key: String| async { Ok(json!(1)) });

        cache
            .subscribe("key", Some(Duration::from_secs(3600)), refresh)
            .expect("Failed to subscribe");
        assert!(cache.is_subscribed("key"));
        assert!(cache.is_refresh_enabled());
        assert_eq!(cache.subscription_count(), 1);

        assert!(cache.unsubscribe("key"));
        assert!(!cache.unsubscribe("key"));
        assert_eq!(cache.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_set_without_refresh_keeps_subscription() {
        let cache = client();
        let refresh = RefreshCallback::new(|_key: String| async { Ok(json!(1)) });

        cache
            .set(
                "key",
                json!(0),
                SetOptions::default()
                    .with_lifetime(Duration::from_secs(3600))
                    .with_refresh(refresh),
            )
            .await
            .expect("Failed to set");
        cache
            .set("key", json!(5), SetOptions::default())
            .await
            .expect("Failed to set");

        assert!(cache.is_subscribed("key"));
    }

    #[tokio::test]
    async fn test_handle_server_event() {
        let cache = client();

        let soft = ServerEvent::new(
            "localhost:11211",
            ServerEventKind::Reconnecting {
                total_downtime: Duration::from_millis(250),
            },
        );
        assert!(cache.handle_server_event(&soft).is_ok());

        let fatal = ServerEvent::new(
            "localhost:11211",
            ServerEventKind::Failure {
                messages: vec!["connection reset".to_string()],
            },
        );
        assert!(matches!(
            cache.handle_server_event(&fatal),
            Err(Error::ServerDown(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let cache = client();
        let other = cache.clone();

        cache
            .set("key", json!(true), SetOptions::default())
            .await
            .expect("Failed to set");
        assert_eq!(other.get("key").await.expect("Failed to get"), Some(json!(true)));
        assert!(Arc::ptr_eq(&cache.inner, &other.inner));
        assert!(other.health_check().await.expect("Failed health check"));
    }

    #[tokio::test]
    async fn test_late_refresh_keeps_newer_set() {
        let config = CacheConfig::default().with_refresh_interval(Duration::from_millis(1));
        let cache = CacheClient::new(InMemoryBackend::new(), config);

        let gate = Arc::new(tokio::sync::Notify::new());
        let waiting = Arc::clone(&gate);
        let slow = RefreshCallback::new(move |_key: String| {
            let waiting = Arc::clone(&waiting);
            async move {
                waiting.notified().await;
                Ok(json!("stale"))
            }
        });
        let fresh = RefreshCallback::new(|_key: String| async { Ok(json!("fresh")) });

        cache
            .set(
                "key",
                json!("initial"),
                SetOptions::default()
                    .with_lifetime(Duration::from_secs(1))
                    .with_refresh(slow),
            )
            .await
            .expect("Failed to set");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.inner.registry.try_begin("key").is_none());

        cache
            .set(
                "key",
                json!("user"),
                SetOptions::default()
                    .with_lifetime(Duration::from_secs(3600))
                    .with_refresh(fresh.clone()),
            )
            .await
            .expect("Failed to set");

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let record = cache.inner.registry.get("key").expect("Record missing");
        assert_eq!(record.life_span, Duration::from_secs(3600));
        assert!(record.callback.ptr_eq(&fresh));
        assert!(record.remaining(Instant::now()) > Duration::from_secs(3500));
        assert_eq!(cache.get("key").await.expect("Failed to get"), Some(json!("user")));
    }
}
