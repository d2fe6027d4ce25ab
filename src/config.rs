//! Facade configuration.
//!
//! ```
//! use cache_refresh::CacheConfig;
//! use std::time::Duration;
//!
//! let config = CacheConfig::default()
//!     .with_default_lifetime(Duration::from_secs(300))
//!     .with_refresh_interval(Duration::from_secs(30))
//!     .with_refresh_min_ttl(Duration::from_secs(45));
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Lifetime applied when `add`/`set`/`mset` get none.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(90);

/// How often the scheduler scans for keys to refresh.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(60_000);

/// Keys with less remaining lifetime than this get refreshed.
pub const DEFAULT_REFRESH_MIN_TTL: Duration = Duration::from_millis(70_000);

/// Configuration for [`CacheClient`](crate::CacheClient).
///
/// Serializes with durations in milliseconds; missing fields take their
/// defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime used when an operation doesn't specify one (or specifies zero).
    #[serde(rename = "default_lifetime_ms", with = "duration_ms")]
    pub default_lifetime: Duration,

    /// Enforce `background_refresh_interval <= background_refresh_min_ttl`
    /// when the scheduler is enabled.
    pub background_refresh_interval_check: bool,

    /// Period of the refresh scheduler.
    #[serde(rename = "background_refresh_interval_ms", with = "duration_ms")]
    pub background_refresh_interval: Duration,

    /// Remaining-lifetime threshold under which a key is refreshed.
    /// Should not be shorter than `background_refresh_interval`.
    #[serde(rename = "background_refresh_min_ttl_ms", with = "duration_ms")]
    pub background_refresh_min_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            default_lifetime: DEFAULT_LIFETIME,
            background_refresh_interval_check: true,
            background_refresh_interval: DEFAULT_REFRESH_INTERVAL,
            background_refresh_min_ttl: DEFAULT_REFRESH_MIN_TTL,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable:
    ///
    /// - `CACHE_DEFAULT_LIFETIME` (seconds)
    /// - `CACHE_REFRESH_INTERVAL_CHECK` (`true`/`false`)
    /// - `CACHE_REFRESH_INTERVAL_MS`
    /// - `CACHE_REFRESH_MIN_TTL_MS`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("CACHE_DEFAULT_LIFETIME") {
            config.default_lifetime = Duration::from_secs(secs);
        }
        if let Some(check) = env_parse::<bool>("CACHE_REFRESH_INTERVAL_CHECK") {
            config.background_refresh_interval_check = check;
        }
        if let Some(ms) = env_parse::<u64>("CACHE_REFRESH_INTERVAL_MS") {
            config.background_refresh_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("CACHE_REFRESH_MIN_TTL_MS") {
            config.background_refresh_min_ttl = Duration::from_millis(ms);
        }

        config
    }

    /// Parse a JSON configuration document.
    ///
    /// ```
    /// use cache_refresh::CacheConfig;
    /// use std::time::Duration;
    ///
    /// let config = CacheConfig::from_json(r#"{"background_refresh_interval_ms": 500}"#)?;
    /// assert_eq!(config.background_refresh_interval, Duration::from_millis(500));
    /// assert_eq!(config.default_lifetime, Duration::from_secs(90));
    /// # Ok::<(), cache_refresh::Error>(())
    /// ```
    ///
    /// # Errors
    /// `Error::ConfigError` if the document is malformed. The values are not
    /// validated here, see [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid cache configuration: {}", e)))
    }

    pub fn with_default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn with_refresh_interval_check(mut self, enabled: bool) -> Self {
        self.background_refresh_interval_check = enabled;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.background_refresh_interval = interval;
        self
    }

    pub fn with_refresh_min_ttl(mut self, min_ttl: Duration) -> Self {
        self.background_refresh_min_ttl = min_ttl;
        self
    }

    /// Check the settings the refresh scheduler depends on.
    ///
    /// # Errors
    /// `Error::ConfigError` if the interval is zero, or if interval checking
    /// is on and the interval exceeds the min TTL.
    pub fn validate(&self) -> Result<()> {
        if self.background_refresh_interval.is_zero() {
            return Err(Error::ConfigError(
                "backgroundRefreshInterval must be greater than zero".to_string(),
            ));
        }

        if self.background_refresh_interval_check
            && self.background_refresh_interval > self.background_refresh_min_ttl
        {
            return Err(Error::ConfigError(format!(
                "BACKGROUND_REFRESH_INTERVAL_EXCEPTION: backgroundRefreshInterval ({:?}) cannot be greater than backgroundRefreshMinTtl ({:?})",
                self.background_refresh_interval, self.background_refresh_min_ttl
            )));
        }

        Ok(())
    }

    /// Resolve an optional lifetime: `None` and zero both mean "default".
    pub fn lifetime_or_default(&self, lifetime: Option<Duration>) -> Duration {
        lifetime
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_lifetime)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}
