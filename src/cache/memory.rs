//! Process-local cache backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;

use super::{expiry_after, CacheBackend};
use crate::clock::Clock;

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Duration,
    expires_at: DateTime<Utc>,
}

/// Physical eviction follows each entry's own TTL, reset on overwrite.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// moka-backed cache bounded by `max_entries`.
///
/// Logical expiry is checked against the injected [`Clock`] on every read, so
/// a simulated clock decides what is stale; moka handles size-based eviction
/// and drops entries once their TTL has passed in real time.
pub struct InMemoryCache {
    entries: Cache<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries.max(1) as u64)
            .expire_after(EntryTtl)
            .build();
        Self { entries, clock }
    }

    /// Entry count after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some(entry) = self.entries.get(key).await else {
            return Ok(None);
        };
        if entry.expires_at > self.clock.now() {
            Ok(Some(entry.value))
        } else {
            self.entries.invalidate(key).await;
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let expires_at = expiry_after(self.clock.now(), ttl)?;
        self.entries
            .insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    ttl,
                    expires_at,
                },
            )
            .await;
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
