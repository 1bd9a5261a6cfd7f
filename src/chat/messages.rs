//! Conversation log: sessions, append-only messages, feedback and flags.
//!
//! Messages are only ever appended; their order is insertion order. A user
//! message is written (and committed) before the reply to it is generated.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Sender label for generated replies.
pub const AI_SENDER: &str = "ai";

/// Maximum characters of conversation context handed to a prompt.
pub const CONTEXT_CHAR_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub summary: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_session_id: String,
    pub sender: String,
    pub text: String,
    #[serde(rename = "timestamp")]
    pub created_at: String,
}

/// Rows removed by [`delete_user_data`].
#[derive(Debug, Default, Serialize)]
pub struct DeletedUserData {
    pub sessions: usize,
    pub messages: usize,
    pub feedback: usize,
    pub flagged: usize,
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        topic: row.get(2)?,
        summary: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        chat_session_id: row.get(1)?,
        sender: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn create_session(
    conn: &Connection,
    user_id: &str,
    topic: &str,
    now: DateTime<Utc>,
) -> Result<ChatSession> {
    let session = ChatSession {
        id: uuid::Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        topic: if topic.is_empty() { "chat" } else { topic }.to_string(),
        summary: None,
        created_at: timestamp(now),
    };
    conn.execute(
        "INSERT INTO chat_sessions (id, user_id, topic, summary, created_at) VALUES (?1, ?2, ?3, NULL, ?4)",
        params![session.id, session.user_id, session.topic, session.created_at],
    )?;
    Ok(session)
}

/// A session, only if it belongs to `user_id`.
pub fn get_session(conn: &Connection, session_id: &str, user_id: &str) -> Result<Option<ChatSession>> {
    Ok(conn
        .query_row(
            "SELECT id, user_id, topic, summary, created_at FROM chat_sessions WHERE id = ?1 AND user_id = ?2",
            params![session_id, user_id],
            session_from_row,
        )
        .optional()?)
}

/// The user's `chat` sessions created after `since`, newest first.
pub fn list_sessions(conn: &Connection, user_id: &str, since: DateTime<Utc>) -> Result<Vec<ChatSession>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, topic, summary, created_at FROM chat_sessions \
         WHERE user_id = ?1 AND topic = 'chat' AND created_at > ?2 ORDER BY created_at DESC",
    )?;
    let sessions = stmt
        .query_map(params![user_id, timestamp(since)], session_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

pub fn append_message(
    conn: &Connection,
    session_id: &str,
    sender: &str,
    text: &str,
    now: DateTime<Utc>,
) -> Result<Message> {
    let message = Message {
        id: uuid::Uuid::now_v7().to_string(),
        chat_session_id: session_id.to_string(),
        sender: sender.to_string(),
        text: text.to_string(),
        created_at: timestamp(now),
    };
    conn.execute(
        "INSERT INTO messages (id, chat_session_id, sender, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id,
            message.chat_session_id,
            message.sender,
            message.text,
            message.created_at
        ],
    )?;
    Ok(message)
}

/// All messages of a session in insertion order.
pub fn session_messages(conn: &Connection, session_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_session_id, sender, text, created_at FROM messages \
         WHERE chat_session_id = ?1 ORDER BY rowid",
    )?;
    let messages = stmt
        .query_map(params![session_id], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// The last `n` messages of a session, oldest first.
pub fn recent_messages(conn: &Connection, session_id: &str, n: usize) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_session_id, sender, text, created_at FROM messages \
         WHERE chat_session_id = ?1 ORDER BY rowid DESC LIMIT ?2",
    )?;
    let mut messages = stmt
        .query_map(params![session_id, n as i64], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    messages.reverse();
    Ok(messages)
}

/// Join message texts with newlines, capped at [`CONTEXT_CHAR_LIMIT`] characters.
pub fn context_from_messages(messages: &[Message]) -> String {
    let joined = messages
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    joined.chars().take(CONTEXT_CHAR_LIMIT).collect()
}

pub fn flag_message(
    conn: &Connection,
    message_id: &str,
    text: &str,
    user_email: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO flagged_responses (id, message_id, text, user_email, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, message_id, text, user_email, timestamp(now)],
    )?;
    Ok(id)
}

/// Record a reaction. `"flag"` also copies the message into `flagged_responses`.
pub fn add_feedback(
    conn: &mut Connection,
    message_id: &str,
    user_email: Option<&str>,
    reaction: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO feedback (id, message_id, user_email, reaction, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::now_v7().to_string(),
            message_id,
            user_email,
            reaction,
            timestamp(now)
        ],
    )?;

    if reaction == "flag" {
        let text: Option<String> = tx
            .query_row(
                "SELECT text FROM messages WHERE id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        flag_message(&tx, message_id, text.as_deref().unwrap_or(""), user_email, now)?;
    }

    tx.commit()?;
    Ok(())
}

/// Remove every session of `user_id` with its messages, feedback and flags.
pub fn delete_user_data(conn: &mut Connection, user_id: &str) -> Result<DeletedUserData> {
    let tx = conn.transaction()?;
    let in_user_messages = "SELECT m.id FROM messages m JOIN chat_sessions s ON s.id = m.chat_session_id \
                            WHERE s.user_id = ?1";

    let feedback = tx.execute(
        &format!("DELETE FROM feedback WHERE message_id IN ({in_user_messages})"),
        params![user_id],
    )?;
    let flagged = tx.execute(
        &format!("DELETE FROM flagged_responses WHERE message_id IN ({in_user_messages})"),
        params![user_id],
    )?;
    let messages = tx.execute(
        "DELETE FROM messages WHERE chat_session_id IN (SELECT id FROM chat_sessions WHERE user_id = ?1)",
        params![user_id],
    )?;
    let sessions = tx.execute("DELETE FROM chat_sessions WHERE user_id = ?1", params![user_id])?;
    tx.commit()?;

    tracing::info!(user_id = %user_id, sessions, messages, "user data deleted");
    Ok(DeletedUserData {
        sessions,
        messages,
        feedback,
        flagged,
    })
}
