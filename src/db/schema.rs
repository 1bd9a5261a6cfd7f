//! SQL DDL for all rysen tables.
//!
//! Defines `pastoral_memory`, `response_cache`, the conversation log
//! (`chat_sessions`, `messages`), moderation/feedback tables, the durable
//! `mass_readings` store, and `schema_meta`. All DDL uses `IF NOT EXISTS` for
//! idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements (schema version 1).
const SCHEMA_SQL: &str = r#"
-- One row per user; themes is a JSON array of at most three labels
CREATE TABLE IF NOT EXISTS pastoral_memory (
    user_id TEXT PRIMARY KEY,
    themes TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);

-- Generated-content cache, globally keyed
CREATE TABLE IF NOT EXISTS response_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_cache_expires ON response_cache(expires_at);

CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    topic TEXT NOT NULL DEFAULT 'chat',
    summary TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON chat_sessions(user_id);

-- Append-only conversation log
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    chat_session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
    sender TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(chat_session_id);

CREATE TABLE IF NOT EXISTS feedback (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    user_email TEXT,
    reaction TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS flagged_responses (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL,
    text TEXT NOT NULL,
    user_email TEXT,
    reviewed INTEGER NOT NULL DEFAULT 0,
    review_notes TEXT,
    created_at TEXT NOT NULL
);

-- Durable copy of daily mass readings; the cache is never the only copy
CREATE TABLE IF NOT EXISTS mass_readings (
    date TEXT PRIMARY KEY,
    season TEXT NOT NULL DEFAULT '',
    season_week TEXT NOT NULL DEFAULT '',
    year TEXT NOT NULL DEFAULT '',
    saint TEXT NOT NULL DEFAULT '',
    first TEXT NOT NULL DEFAULT '',
    psalm TEXT NOT NULL DEFAULT '',
    second TEXT NOT NULL DEFAULT '',
    gospel TEXT NOT NULL DEFAULT ''
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
