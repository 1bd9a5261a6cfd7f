//! Per-user pastoral memory tracker.
//!
//! [`PastoralMemoryTracker`] wires extraction to the durable store. Updates to
//! one user's record are serialized by a per-user async lock and written
//! conditionally on the row version; version conflicts (another process
//! sharing the database file) are retried by re-reading and re-merging.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use rusqlite::Connection;

use super::extract;
use super::store::{self, MemoryStoreError};
use super::types::{PastoralMemory, Theme};
use crate::clock::Clock;
use crate::llm::TextClassifier;

#[derive(Clone)]
pub struct PastoralMemoryTracker {
    db: Arc<Mutex<Connection>>,
    classifier: Arc<dyn TextClassifier>,
    clock: Arc<dyn Clock>,
    /// Per-user write locks. Entries are dropped once no task holds them.
    locks: Arc<UserLocks>,
    timeout: Duration,
    max_retries: u32,
}

impl PastoralMemoryTracker {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        classifier: Arc<dyn TextClassifier>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            db,
            classifier,
            clock,
            locks: Arc::new(DashMap::new()),
            timeout,
            max_retries,
        }
    }

    /// Classify free text into themes. Never fails; see [`extract::extract_themes`].
    pub async fn extract_themes(&self, text: &str) -> Vec<Theme> {
        extract::extract_themes(self.classifier.as_ref(), text, self.timeout).await
    }

    /// Merge `new_themes` into the user's record and return the resulting themes.
    ///
    /// An empty batch is a read: no record is created or touched.
    pub async fn merge_and_store(&self, user_id: &str, new_themes: &[Theme]) -> Result<Vec<Theme>> {
        if new_themes.is_empty() {
            return self.current_themes(user_id).await;
        }

        let slot = self.user_slot(user_id);
        let _guard = slot.lock().await;

        let mut attempt = 0;
        loop {
            match self.merge_once(user_id, new_themes).await {
                Err(MergeFailure::Store(e)) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(user_id = %user_id, attempt, error = %e, "retrying pastoral memory merge");
                }
                Err(MergeFailure::Store(e)) => return Err(anyhow!(e)),
                Err(MergeFailure::Task(e)) => return Err(e),
                Ok(record) => return Ok(record.themes.iter().collect()),
            }
        }
    }

    /// Extract themes from `text`, merge them, and return the user's themes
    /// for prompt construction.
    ///
    /// Persistence failures are logged and swallowed; the freshly extracted
    /// themes are returned in that case so the reply can still be personalised.
    pub async fn analyze_and_store(&self, user_id: &str, text: &str) -> Vec<Theme> {
        let extracted = self.extract_themes(text).await;
        match self.merge_and_store(user_id, &extracted).await {
            Ok(themes) => themes,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "pastoral memory update failed");
                extracted
            }
        }
    }

    /// Clear the user's themes ("fresh start").
    pub async fn reset(&self, user_id: &str) -> Result<()> {
        let slot = self.user_slot(user_id);
        let guard = slot.lock().await;

        let db = Arc::clone(&self.db);
        let now = self.clock.now();
        let user = user_id.to_string();
        let result = tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = db.lock().map_err(|e| anyhow!("db lock poisoned: {e}"))?;
            store::reset_themes(&conn, &user, now)?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("db task failed: {e}"))
        .and_then(|r| r);

        drop(guard);
        drop(slot);

        if result.is_ok() {
            tracing::info!(user_id = %user_id, "pastoral memory reset");
        }
        result
    }

    /// The stored record, if any.
    pub async fn record(&self, user_id: &str) -> Result<Option<PastoralMemory>> {
        let db = Arc::clone(&self.db);
        let user = user_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<PastoralMemory>> {
            let conn = db.lock().map_err(|e| anyhow!("db lock poisoned: {e}"))?;
            Ok(store::get_record(&conn, &user)?)
        })
        .await
        .map_err(|e| anyhow!("db task failed: {e}"))?
    }

    pub async fn current_themes(&self, user_id: &str) -> Result<Vec<Theme>> {
        Ok(self
            .record(user_id)
            .await?
            .map(|r| r.themes.iter().collect())
            .unwrap_or_default())
    }

    async fn merge_once(
        &self,
        user_id: &str,
        new_themes: &[Theme],
    ) -> std::result::Result<PastoralMemory, MergeFailure> {
        let db = Arc::clone(&self.db);
        let now = self.clock.now();
        let user = user_id.to_string();
        let themes = new_themes.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| MergeFailure::Task(anyhow!("db lock poisoned: {e}")))?;
            store::merge_and_store(&mut conn, &user, &themes, now).map_err(MergeFailure::Store)
        })
        .await
        .map_err(|e| MergeFailure::Task(anyhow!("db task failed: {e}")))?
    }

    /// The user's lock slot. Its map entry is removed when the last slot for
    /// the user is dropped, including when the caller is cancelled mid-wait.
    fn user_slot(&self, user_id: &str) -> UserSlot {
        let mutex = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        UserSlot {
            locks: Arc::clone(&self.locks),
            user_id: user_id.to_string(),
            mutex,
        }
    }
}

type UserLocks = DashMap<String, Arc<tokio::sync::Mutex<()>>>;

struct UserSlot {
    locks: Arc<UserLocks>,
    user_id: String,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl UserSlot {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.mutex.lock().await
    }
}

impl Drop for UserSlot {
    fn drop(&mut self) {
        // Two references left: the map's and ours.
        self.locks
            .remove_if(&self.user_id, |_, l| Arc::strong_count(l) == 2);
    }
}

enum MergeFailure {
    Store(MemoryStoreError),
    Task(anyhow::Error),
}
