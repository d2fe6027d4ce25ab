//! # cache-refresh
//!
//! An async memcached facade that keeps hot keys warm in the background.
//!
//! ## Features
//!
//! - **Plain cache operations:** `add`, `get`, `mget`, `set`, `mset`, `del`, `flush`
//! - **JSON values:** anything `serde_json` can represent, stored as JSON text
//! - **Background refresh:** keys stored with a refresh callback are recomputed
//!   shortly before they expire, so readers never see the miss
//! - **Backend Agnostic:** in-memory for tests, memcached behind the `memcached` feature
//! - **Production Ready:** logging via `log`, pluggable metrics, typed errors
//!
//! ## Quick Start
//!
//! ```no_run
//! use cache_refresh::{
//!     backend::InMemoryBackend, CacheClient, CacheConfig, RefreshCallback, SetOptions,
//! };
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> cache_refresh::Result<()> {
//! let cache = CacheClient::new(InMemoryBackend::new(), CacheConfig::from_env());
//!
//! // Plain set/get
//! cache.set("user:1", json!({"name": "Ada"}), SetOptions::default()).await?;
//! let user = cache.get("user:1").await?;
//!
//! // Batch operations
//! cache.mset(vec![("a", json!(1)), ("b", json!(2))], None).await?;
//! let values = cache.mget(&["a", "b", "missing"]).await?;
//! assert_eq!(values["missing"], None);
//!
//! // Refreshed in the background before it expires
//! let refresh = RefreshCallback::new(|key: String| async move {
//!     Ok(json!({ "key": key, "recomputed": true }))
//! });
//! cache
//!     .set(
//!         "report",
//!         json!({ "recomputed": false }),
//!         SetOptions::default()
//!             .with_lifetime(Duration::from_secs(120))
//!             .with_refresh(refresh),
//!     )
//!     .await?;
//!
//! // Stop refreshing, then remove
//! cache.unsubscribe("report");
//! cache.del("report").await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```
//!
//! `del` leaves refresh subscriptions alone: a deleted key that is still
//! subscribed is written again by the next refresh.

#[macro_use]
extern crate log;

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod observability;
pub mod refresh;
pub mod serialization;

// Re-exports for convenience
pub use backend::{CacheBackend, ServerEvent, ServerEventKind};
pub use client::{CacheClient, CacheValue, SetOptions};
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use key::DelKeys;
pub use refresh::{RefreshCallback, RefreshRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
