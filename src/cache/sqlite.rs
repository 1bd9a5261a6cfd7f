//! Cache backend stored in the `response_cache` table.
//!
//! Expiry timestamps are written as fixed-width UTC RFC 3339 strings so they
//! compare correctly as text in [`purge_expired`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::CacheBackend;
use crate::clock::Clock;

pub struct SqliteCache {
    db: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteCache {
    pub fn new(db: Arc<Mutex<Connection>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|e| anyhow!("db lock poisoned: {e}"))?;
            f(&conn)
        })
        .await
        .map_err(|e| anyhow!("db task failed: {e}"))?
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Read a live entry. Expired rows are left for [`purge_expired`].
pub fn get_entry(conn: &Connection, key: &str, now: DateTime<Utc>) -> Result<Option<Value>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT value, expires_at FROM response_cache WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((value, expires_at)) = row else {
        return Ok(None);
    };
    let expires_at = DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&Utc);
    if expires_at <= now {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&value)?))
}

pub fn set_entry(
    conn: &Connection,
    key: &str,
    value: &Value,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO response_cache (key, value, expires_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        params![key, serde_json::to_string(value)?, timestamp(expires_at)],
    )?;
    Ok(())
}

/// Delete every entry expired at `now`. Returns the number of rows removed.
pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let n = conn.execute(
        "DELETE FROM response_cache WHERE expires_at <= ?1",
        params![timestamp(now)],
    )?;
    Ok(n)
}

#[async_trait]
impl CacheBackend for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = self.clock.now();
        let key = key.to_string();
        self.with_conn(move |conn| get_entry(conn, &key, now)).await
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let expires_at = super::expiry_after(self.clock.now(), ttl)?;
        let key = key.to_string();
        let value = value.clone();
        self.with_conn(move |conn| set_entry(conn, &key, &value, expires_at))
            .await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM response_cache WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn setup() -> (Arc<ManualClock>, Arc<Mutex<Connection>>, SqliteCache) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let db = Arc::new(Mutex::new(crate::db::open_memory_database().unwrap()));
        let cache = SqliteCache::new(db.clone(), clock.clone());
        (clock, db, cache)
    }

    #[tokio::test]
    async fn round_trip_and_expiry() {
        let (clock, _, cache) = setup();
        let key = "2025-07-14:First Reading";
        cache.set(key, &json!("Exodus 1:8-14"), Duration::from_secs(3600)).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap(), Some(json!("Exodus 1:8-14")));

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(cache.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let (_, _, cache) = setup();
        cache.set("k", &json!("a"), Duration::from_secs(60)).await.unwrap();
        cache.set("k", &json!("b"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("b")));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_rows() {
        let (clock, db, cache) = setup();
        cache.set("short", &json!(1), Duration::from_secs(10)).await.unwrap();
        cache.set("long", &json!(2), Duration::from_secs(1000)).await.unwrap();
        clock.advance(chrono::Duration::seconds(10));

        let removed = purge_expired(&db.lock().unwrap(), clock.now()).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.get("long").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn oversized_ttl_is_an_error() {
        let (_, _, cache) = setup();
        assert!(cache.set("k", &json!("v"), Duration::from_secs(u64::MAX)).await.is_err());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_removes_entry() {
        let (_, _, cache) = setup();
        cache.set("k", &json!("v"), Duration::from_secs(60)).await.unwrap();
        cache.clear("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
