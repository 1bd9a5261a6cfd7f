//! Tagged interpretation of raw chat completions.
//!
//! Chat prompts ask the model for `{"answer": ..., "follow_ups": [...]}`.
//! [`GeneratedReply::parse`] decides once, where the raw text enters the
//! system, whether that shape was honoured; downstream code never re-parses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratedReply {
    Structured {
        answer: String,
        follow_ups: Vec<String>,
    },
    PlainText {
        text: String,
    },
}

#[derive(Deserialize)]
struct StructuredPayload {
    answer: String,
    #[serde(default)]
    follow_ups: Vec<String>,
}

impl GeneratedReply {
    pub fn parse(raw: &str) -> Self {
        let trimmed = strip_code_fence(raw.trim());
        match serde_json::from_str::<StructuredPayload>(trimmed) {
            Ok(payload) if !payload.answer.trim().is_empty() => GeneratedReply::Structured {
                answer: payload.answer.trim().to_string(),
                follow_ups: payload
                    .follow_ups
                    .into_iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
            },
            _ => GeneratedReply::PlainText {
                text: raw.trim().to_string(),
            },
        }
    }

    /// The text shown to (and stored for) the user.
    pub fn text(&self) -> &str {
        match self {
            GeneratedReply::Structured { answer, .. } => answer,
            GeneratedReply::PlainText { text } => text,
        }
    }

    pub fn follow_ups(&self) -> &[String] {
        match self {
            GeneratedReply::Structured { follow_ups, .. } => follow_ups,
            GeneratedReply::PlainText { .. } => &[],
        }
    }
}

/// Models sometimes wrap JSON in a ```json fence despite being told not to.
pub fn strip_code_fence(s: &str) -> &str {
    s.strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(s)
}
