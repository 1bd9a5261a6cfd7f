//! Durable store for pastoral memory records.
//!
//! One row per user in `pastoral_memory`. Writes are conditional on the row
//! `version` so a writer holding a stale copy gets
//! [`MemoryStoreError::Conflict`] instead of silently dropping another
//! writer's themes. [`merge_and_store`] runs the whole read-merge-write in a
//! single `IMMEDIATE` transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::types::{PastoralMemory, Theme, ThemeWindow};

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("pastoral memory for {user_id} was modified concurrently")]
    Conflict { user_id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid themes column: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl MemoryStoreError {
    /// Conflicts and lock timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryStoreError>;

/// Load the record for `user_id`, if one exists.
pub fn get_record(conn: &Connection, user_id: &str) -> Result<Option<PastoralMemory>> {
    let row = conn
        .query_row(
            "SELECT themes, updated_at, version FROM pastoral_memory WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(themes, updated_at, version)| {
        Ok(PastoralMemory {
            user_id: user_id.to_string(),
            themes: serde_json::from_str(&themes)?,
            updated_at,
            version,
        })
    })
    .transpose()
}

/// Write `record` if the stored row still has `record.version`.
///
/// Version 0 means "not stored yet" and inserts. Returns the stored record
/// with its new version and timestamp.
pub fn upsert_record(
    conn: &Connection,
    record: &PastoralMemory,
    now: DateTime<Utc>,
) -> Result<PastoralMemory> {
    let themes = serde_json::to_string(&record.themes)?;
    let updated_at = now.to_rfc3339();

    let changed = if record.version == 0 {
        conn.execute(
            "INSERT INTO pastoral_memory (user_id, themes, updated_at, version) VALUES (?1, ?2, ?3, 1) \
             ON CONFLICT(user_id) DO NOTHING",
            params![record.user_id, themes, updated_at],
        )?
    } else {
        conn.execute(
            "UPDATE pastoral_memory SET themes = ?1, updated_at = ?2, version = version + 1 \
             WHERE user_id = ?3 AND version = ?4",
            params![themes, updated_at, record.user_id, record.version],
        )?
    };

    if changed == 0 {
        return Err(MemoryStoreError::Conflict {
            user_id: record.user_id.clone(),
        });
    }

    Ok(PastoralMemory {
        user_id: record.user_id.clone(),
        themes: record.themes.clone(),
        updated_at,
        version: record.version + 1,
    })
}

/// Delete the record for `user_id`. Returns `true` if a row was removed.
pub fn delete_record(conn: &Connection, user_id: &str) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM pastoral_memory WHERE user_id = ?1",
        params![user_id],
    )?;
    Ok(n > 0)
}

/// Load, merge `new_themes`, and conditionally write back in one transaction.
///
/// A missing record starts empty. When nothing changes the stored row is
/// left alone (and no row is created) and the current record is returned.
pub fn merge_and_store(
    conn: &mut Connection,
    user_id: &str,
    new_themes: &[Theme],
    now: DateTime<Utc>,
) -> Result<PastoralMemory> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut record = get_record(&tx, user_id)?.unwrap_or_else(|| PastoralMemory::empty(user_id));
    let changed = record.themes.merge(new_themes.iter().copied());
    if !changed {
        tx.commit()?;
        return Ok(record);
    }

    let stored = upsert_record(&tx, &record, now)?;
    tx.commit()?;

    tracing::debug!(
        user_id = %user_id,
        themes = ?stored.themes.as_slice(),
        version = stored.version,
        "pastoral memory merged"
    );
    Ok(stored)
}

/// Clear a user's themes ("fresh start"). Creates an empty record if none exists.
pub fn reset_themes(conn: &Connection, user_id: &str, now: DateTime<Utc>) -> Result<()> {
    let empty = serde_json::to_string(&ThemeWindow::new())?;
    conn.execute(
        "INSERT INTO pastoral_memory (user_id, themes, updated_at, version) VALUES (?1, ?2, ?3, 1) \
         ON CONFLICT(user_id) DO UPDATE SET themes = excluded.themes, updated_at = excluded.updated_at, \
         version = pastoral_memory.version + 1",
        params![user_id, empty, now.to_rfc3339()],
    )?;
    Ok(())
}
