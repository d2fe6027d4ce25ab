//! Error types for the caching facade.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the caching facade.
///
/// Every facade operation returns `Result<T>`. I/O failures against the cache
/// server are surfaced as-is and never retried internally. Serialization
/// failures inside batch operations are logged and do not abort the batch.
#[derive(Debug, Clone)]
pub enum Error {
    /// Storing a value failed (`add`, `set`, `mset`).
    ///
    /// Common causes:
    /// - `add` on a key that already exists
    /// - Memcached unreachable or rejecting the write
    CacheWriteError(String),

    /// Reading a value failed (`get`, `mget`).
    CacheReadError(String),

    /// Deleting a value failed (`del`).
    CacheDeleteError(String),

    /// Flushing the cache server failed (`flush`).
    CacheFlushError(String),

    /// Key is not usable as a cache key.
    ///
    /// Memcached keys must be non-empty, at most 250 bytes, and free of
    /// whitespace and control characters.
    InvalidKey(String),

    /// Converting a value to its JSON text form failed.
    SerializationError(String),

    /// Parsing JSON text read back from the cache failed.
    DeserializationError(String),

    /// A refresh callback reported a failure.
    ///
    /// The refresh record is left untouched and retried on the next tick.
    RefreshError(String),

    /// Low-level backend failure (connection pool, protocol).
    ///
    /// The facade wraps these into the operation-specific variants above.
    BackendError(String),

    /// A cache server went down for good.
    ///
    /// **Recovery:** none at this layer, the caller decides.
    ServerDown(String),

    /// Invalid configuration.
    ///
    /// Raised when background refresh is enabled with
    /// `background_refresh_interval > background_refresh_min_ttl` while
    /// interval checking is on.
    ConfigError(String),

    /// Operation not supported by the backend.
    NotImplemented(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CacheWriteError(msg) => write!(f, "Cache write error: {}", msg),
            Error::CacheReadError(msg) => write!(f, "Cache read error: {}", msg),
            Error::CacheDeleteError(msg) => write!(f, "Cache delete error: {}", msg),
            Error::CacheFlushError(msg) => write!(f, "Cache flush error: {}", msg),
            Error::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::RefreshError(msg) => write!(f, "Refresh error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ServerDown(msg) => write!(f, "Server down: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether this error came from talking to the cache server.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::CacheWriteError(_)
                | Error::CacheReadError(_)
                | Error::CacheDeleteError(_)
                | Error::CacheFlushError(_)
                | Error::BackendError(_)
                | Error::ServerDown(_)
        )
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_eof() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
