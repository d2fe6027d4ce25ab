//! Cache client adapters.
//!
//! A [`CacheBackend`] is the only component that talks to the cache server.
//! Connection pooling, server selection and wire protocol are its business;
//! the facade only sees the async operations below.

use crate::error::Result;
use std::fmt;
use std::future::Future;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "memcached")]
pub mod memcached;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedBackend, MemcachedConfig};

/// Trait for cache client adapters.
///
/// **IMPORTANT:** All methods use `&self` instead of `&mut self` to allow concurrent access.
/// Implementations should use interior mutability or a connection pool.
///
/// Values are opaque bytes here. The facade always hands over UTF-8 JSON text.
///
/// Methods return `Send` futures so the refresh scheduler can drive them from
/// spawned tasks. Implementations can still be written with `async fn`.
pub trait CacheBackend: Send + Sync + Clone + 'static {
    /// Retrieve value from cache by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found in cache
    /// - `Ok(None)` - Cache miss (key not found)
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store value in cache with the given TTL, overwriting any previous value.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Store value only if the key is absent.
    ///
    /// # Returns
    /// - `Ok(true)` - Value stored
    /// - `Ok(false)` - Key already present, nothing written
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn add(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove value from cache. Deleting an absent key is not an error.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Bulk get operation.
    ///
    /// Default implementation calls `get()` for each key.
    /// Override for batch efficiency (e.g., memcached multi-get).
    /// The result has one slot per requested key, in request order.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    fn mget(&self, keys: &[&str]) -> impl Future<Output = Result<Vec<Option<Vec<u8>>>>> + Send {
        async move {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                results.push(self.get(key).await?);
            }
            Ok(results)
        }
    }

    /// Health check - verify backend is accessible.
    ///
    /// # Errors
    /// Returns `Err` if backend is not accessible
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }

    /// Clear every entry on the server.
    ///
    /// # Errors
    /// Returns `Err` if operation is not implemented or fails
    fn clear_all(&self) -> impl Future<Output = Result<()>> + Send {
        async {
            Err(crate::error::Error::NotImplemented(
                "clear_all not implemented for this backend".to_string(),
            ))
        }
    }
}

/// Notification about a cache server's availability.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerEvent {
    /// Server location, e.g. `cache1:11211`.
    pub server: String,
    pub kind: ServerEventKind,
}

/// What happened to the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEventKind {
    /// Server is gone and will not come back. Fatal for the caller.
    Failure { messages: Vec<String> },
    /// A reconnect attempt is underway.
    Reconnecting { total_downtime: Duration },
    /// Connection trouble that has not yet taken the server out.
    Issue { total_downtime: Duration },
    /// Server is back.
    Reconnect { total_downtime: Duration },
    /// Server was dropped from the pool.
    Remove { total_downtime: Duration },
}

impl ServerEvent {
    pub fn new(server: impl Into<String>, kind: ServerEventKind) -> Self {
        ServerEvent {
            server: server.into(),
            kind,
        }
    }

    /// Whether the event means the server is permanently down.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ServerEventKind::Failure { .. })
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ServerEventKind::Failure { messages } => write!(
                f,
                "Memcached server {} went down due to: {}",
                self.server,
                messages.join(",")
            ),
            ServerEventKind::Reconnecting { total_downtime }
            | ServerEventKind::Issue { total_downtime }
            | ServerEventKind::Reconnect { total_downtime }
            | ServerEventKind::Remove { total_downtime } => write!(
                f,
                "Total downtime caused by server {}: {}ms",
                self.server,
                total_downtime.as_millis()
            ),
        }
    }
}
