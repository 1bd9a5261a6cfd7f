//! Response cache for expensive generated content.
//!
//! [`ResponseCache`] guards generation calls whose output is stable per key
//! (a date's mass readings, a saint write-up, a scripture study). Callers
//! always follow check → generate on miss → persist → populate; a read never
//! triggers generation.
//!
//! The cache is a latency optimization only. Backend errors and slow backends
//! degrade to a miss (on `get`) or a skipped write (on `set`) and are logged.
//! Keys are global, not per-user; see [`keys`] for the formats.
//!
//! Backends implement [`CacheBackend`]:
//! - [`memory::InMemoryCache`]: process-local moka cache, bounded by entry count
//! - [`sqlite::SqliteCache`]: `response_cache` table, shared by every process
//!   using the same database file

pub mod keys;
pub mod memory;
pub mod sqlite;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::clock::Clock;
use crate::config::CacheConfig;

/// Default time-to-live for cached content.
pub const DEFAULT_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// Upper bound on a single backend call before it is treated as a miss.
const BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

/// `now + ttl`, or an error when the TTL does not fit a timestamp.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| anyhow!("cache ttl out of range: {}s", ttl.as_secs()))
}

/// Generic TTL key-value store. Expired entries must read as absent.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value`, resetting expiry to now + `ttl`. Last writer wins.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()>;

    async fn clear(&self, key: &str) -> Result<()>;
}

/// Fail-soft front for an optional [`CacheBackend`].
#[derive(Clone)]
pub struct ResponseCache {
    backend: Option<Arc<dyn CacheBackend>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Stored value for `key`, or `None` on miss, expiry, or backend failure.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let backend = self.backend.as_ref()?;
        match tokio::time::timeout(BACKEND_TIMEOUT, backend.get(key)).await {
            Ok(Ok(Some(value))) => {
                tracing::debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(Ok(None)) => {
                tracing::debug!(key = %key, "cache miss");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
            Err(_) => {
                tracing::warn!(key = %key, "cache read timed out, treating as miss");
                None
            }
        }
    }

    /// Like [`get`](Self::get), decoding into `T`. A value of the wrong shape is a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached value has unexpected shape");
                None
            }
        }
    }

    /// Store with the default TTL.
    pub async fn set(&self, key: &str, value: Value) {
        self.set_with_ttl(key, value, self.ttl).await
    }

    pub async fn set_with_ttl(&self, key: &str, value: Value, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        match tokio::time::timeout(BACKEND_TIMEOUT, backend.set(key, &value, ttl)).await {
            Ok(Ok(())) => tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache populated"),
            Ok(Err(e)) => tracing::warn!(key = %key, error = %e, "cache write failed"),
            Err(_) => tracing::warn!(key = %key, "cache write timed out"),
        }
    }

    pub async fn clear(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.clear(key).await {
            tracing::warn!(key = %key, error = %e, "cache clear failed");
        }
    }
}

/// Build the configured cache. `enabled = false` yields [`ResponseCache::disabled`].
pub fn create_cache(
    config: &CacheConfig,
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
) -> Result<ResponseCache> {
    if !config.enabled {
        tracing::info!("response cache disabled");
        return Ok(ResponseCache::disabled());
    }

    let backend: Arc<dyn CacheBackend> = match config.backend.as_str() {
        "memory" => Arc::new(memory::InMemoryCache::new(clock, config.max_entries)),
        "sqlite" => Arc::new(sqlite::SqliteCache::new(db, clock)),
        other => anyhow::bail!("unknown cache backend: {other}. Supported: memory, sqlite"),
    };
    tracing::info!(backend = %config.backend, ttl_hours = config.ttl_hours, "response cache ready");
    Ok(ResponseCache::new(backend, config.ttl()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use serde_json::json;

    struct Broken;

    #[async_trait]
    impl CacheBackend for Broken {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            anyhow::bail!("connection refused")
        }
        async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn clear(&self, _key: &str) -> Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    struct Hanging;

    #[async_trait]
    impl CacheBackend for Hanging {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Some(json!("too late")))
        }
        async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
        async fn clear(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_outage_degrades_to_miss() {
        let cache = ResponseCache::new(Arc::new(Broken), DEFAULT_TTL);
        cache.set("saint:2025-07-14", json!("text")).await;
        assert_eq!(cache.get("saint:2025-07-14").await, None);
        cache.clear("saint:2025-07-14").await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_degrades_to_miss() {
        let cache = ResponseCache::new(Arc::new(Hanging), DEFAULT_TTL);
        assert_eq!(cache.get("k").await, None);
        cache.set("k", json!(1)).await;
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = ResponseCache::disabled();
        assert!(!cache.is_enabled());
        cache.set("k", json!("v")).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn get_as_treats_wrong_shape_as_miss() {
        let backend = memory::InMemoryCache::new(Arc::new(SystemClock), 10);
        let cache = ResponseCache::new(Arc::new(backend), DEFAULT_TTL);
        cache.set("k", json!({"not": "a string"})).await;
        assert_eq!(cache.get_as::<String>("k").await, None);
        cache.set("k", json!("plain")).await;
        assert_eq!(cache.get_as::<String>("k").await.as_deref(), Some("plain"));
    }

    #[test]
    fn expiry_rejects_oversized_ttl() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, Duration::from_secs(60)).unwrap(), now + chrono::Duration::seconds(60));
        assert!(expiry_after(now, Duration::from_secs(u64::MAX)).is_err());
        assert!(expiry_after(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn create_cache_rejects_overflowing_ttl_hours() {
        let db = Arc::new(Mutex::new(crate::db::open_memory_database().unwrap()));
        let config = CacheConfig {
            ttl_hours: u64::MAX,
            ..Default::default()
        };
        assert!(create_cache(&config, db, Arc::new(SystemClock)).is_err());
    }

    #[test]
    fn create_cache_honours_config() {
        let db = Arc::new(Mutex::new(crate::db::open_memory_database().unwrap()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut config = CacheConfig::default();
        assert!(create_cache(&config, db.clone(), clock.clone()).unwrap().is_enabled());

        config.backend = "memory".into();
        assert!(create_cache(&config, db.clone(), clock.clone()).unwrap().is_enabled());

        config.enabled = false;
        assert!(!create_cache(&config, db.clone(), clock.clone()).unwrap().is_enabled());

        config.enabled = true;
        config.backend = "redis".into();
        assert!(create_cache(&config, db, clock).is_err());
    }
}
