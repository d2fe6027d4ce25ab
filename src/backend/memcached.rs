//! Memcached cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use async_memcached::{AsciiProtocol, Status};
use deadpool_memcached::{Manager, Object, Pool};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default Memcached connection pool size.
/// Formula: (CPU cores × 2) + 1
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Configuration for Memcached backend.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211", "cache2:11211"]
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Memcached backend with connection pooling and async operations.
///
/// # Example
///
/// ```no_run
/// # use cache_refresh::backend::{MemcachedBackend, MemcachedConfig};
/// # use cache_refresh::{CacheClient, CacheConfig, SetOptions};
/// # async fn example() -> cache_refresh::Result<()> {
/// let backend = MemcachedBackend::new(MemcachedConfig {
///     servers: vec!["localhost:11211".to_string()],
///     ..Default::default()
/// })
/// .await?;
///
/// let cache = CacheClient::new(backend, CacheConfig::default());
/// cache.set("key", "value".into(), SetOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedBackend {
    pool: Pool,
}

impl MemcachedBackend {
    /// Create new Memcached backend from configuration.
    ///
    /// Only the first server of the list is used; the pool manager talks to a
    /// single address.
    ///
    /// # Errors
    /// Returns `Err` if no server is configured or pool creation fails
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        if config.servers.len() > 1 {
            warn!(
                "Memcached backend uses {} only, ignoring {} other server(s)",
                addr,
                config.servers.len() - 1
            );
        }

        let manager = Manager::new(addr.clone());

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached backend connected to {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedBackend { pool })
    }

    /// Create from server address directly.
    ///
    /// Pool size is determined by:
    /// 1. `MEMCACHED_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn from_server(addr: String) -> Result<Self> {
        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let config = MemcachedConfig {
            servers: vec![addr],
            pool_size,
            ..Default::default()
        };
        Self::new(config).await
    }

    async fn connection(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            Error::BackendError(format!("Failed to get Memcached connection: {}", e))
        })
    }
}

/// Longest exptime memcached reads as relative; anything above is a Unix timestamp.
const MAX_RELATIVE_TTL_SECS: u64 = 60 * 60 * 24 * 30;

/// Convert a lifetime to a memcached exptime.
///
/// Whole seconds, with sub-second lifetimes rounded up so they never turn into
/// "no expiry". Lifetimes over 30 days become an absolute Unix timestamp,
/// clamped to the 32-bit range the server parses.
fn ttl_secs(ttl: Duration) -> i64 {
    let secs = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0))
        .max(1);
    if secs <= MAX_RELATIVE_TTL_SECS {
        return secs as i64;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    now.saturating_add(secs).min(i32::MAX as u64) as i64
}

impl CacheBackend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        match conn.get(key).await {
            Ok(Some(value)) => {
                debug!("✓ Memcached GET {} -> HIT", key);
                Ok(value.data)
            }
            Ok(None) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.set(key, value.as_slice(), Some(ttl_secs(ttl)), None)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Memcached SET failed for key {}: {}", key, e))
            })?;

        debug!("✓ Memcached SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;

        match conn
            .add(key, value.as_slice(), Some(ttl_secs(ttl)), None)
            .await
        {
            Ok(()) => {
                debug!("✓ Memcached ADD {} (TTL: {:?})", key, ttl);
                Ok(true)
            }
            Err(async_memcached::Error::Protocol(Status::NotStored)) => {
                debug!("✗ Memcached ADD {} -> NOT_STORED", key);
                Ok(false)
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached ADD failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        match conn.delete(key).await {
            Ok(()) => {
                debug!("✓ Memcached DELETE {}", key);
                Ok(())
            }
            Err(async_memcached::Error::Protocol(Status::NotFound)) => {
                debug!("✓ Memcached DELETE {} (absent)", key);
                Ok(())
            }
            Err(e) => Err(Error::BackendError(format!(
                "Memcached DELETE failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection().await?;

        // get_multi may report "not found" when none of the keys exist
        let values = match conn.get_multi(keys).await {
            Ok(vals) => vals,
            Err(e) => {
                if e.to_string().contains("not found") {
                    debug!("✓ Memcached MGET {} keys (all miss)", keys.len());
                    return Ok(vec![None; keys.len()]);
                }
                return Err(Error::BackendError(format!("Memcached MGET failed: {}", e)));
            }
        };

        let mut value_map = std::collections::HashMap::with_capacity(values.len());
        for value in values {
            let key_str = String::from_utf8_lossy(&value.key).to_string();
            if let Some(data) = value.data {
                value_map.insert(key_str, data);
            }
        }

        // Preserve input order and handle missing keys
        let results = keys
            .iter()
            .map(|key| value_map.remove(*key))
            .collect::<Vec<_>>();

        debug!("✓ Memcached MGET {} keys (batch operation)", keys.len());
        Ok(results)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(mut conn) => match conn.get("__health_check__").await {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            },
            Err(_) => Ok(false),
        }
    }

    async fn clear_all(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.flush_all()
            .await
            .map_err(|e| Error::BackendError(format!("Memcached FLUSH_ALL failed: {}", e)))?;

        warn!("⚠ Memcached FLUSH_ALL executed - all cache cleared!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcached_config_default() {
        let config = MemcachedConfig::default();
        assert_eq!(config.servers, vec!["localhost:11211".to_string()]);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ttl_secs_rounding() {
        assert_eq!(ttl_secs(Duration::from_secs(90)), 90);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_secs(Duration::from_millis(1)), 1);
        assert_eq!(ttl_secs(Duration::ZERO), 1);
        assert_eq!(
            ttl_secs(Duration::from_secs(MAX_RELATIVE_TTL_SECS)),
            MAX_RELATIVE_TTL_SECS as i64
        );
    }

    #[test]
    fn test_ttl_secs_long_lifetimes_are_absolute() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Clock before epoch")
            .as_secs() as i64;
        let days_31 = Duration::from_secs(60 * 60 * 24 * 31);

        let exptime = ttl_secs(days_31);
        assert!(exptime >= now + days_31.as_secs() as i64);
        assert!(exptime <= i32::MAX as i64);

        assert_eq!(ttl_secs(Duration::MAX), i32::MAX as i64);
    }

    #[tokio::test]
    async fn test_memcached_backend_no_servers_error() {
        let config = MemcachedConfig {
            servers: vec![],
            ..Default::default()
        };

        let result = MemcachedBackend::new(config).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    // Integration tests - require running memcached server
    // Run with: cargo test --features memcached -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_memcached_backend_add_and_delete() {
        let backend = MemcachedBackend::from_server("localhost:11211".to_string())
            .await
            .expect("Failed to create backend");

        backend
            .delete("unit_add_key")
            .await
            .expect("Failed to delete");
        assert!(backend
            .add("unit_add_key", b"1".to_vec(), Duration::from_secs(10))
            .await
            .expect("Failed to add"));
        assert!(!backend
            .add("unit_add_key", b"2".to_vec(), Duration::from_secs(10))
            .await
            .expect("Failed to add"));

        backend
            .delete("unit_add_key")
            .await
            .expect("Failed to delete");
        assert_eq!(backend.get("unit_add_key").await.expect("Failed to get"), None);
    }
}
