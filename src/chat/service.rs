//! Request orchestration for the companion.
//!
//! [`ChatService`] owns the collaborators (database, cache, pastoral memory,
//! generator, classifier) and runs each request flow. Every flow persists the
//! user's message before any generation starts, and appends the reply only
//! after generation succeeds. Theme tracking and caching never fail a
//! request; generation failures and timeouts do.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::messages::{self, ChatSession, DeletedUserData, Message, AI_SENDER};
use super::prompt::{self, UserProfile};
use super::readings::{self, CachedMassReadings, MassReadings};
use crate::cache::{keys, ResponseCache};
use crate::clock::Clock;
use crate::config::LlmConfig;
use crate::llm::{with_timeout, GeneratedReply, GenerationParams, LlmError, TextClassifier, TextGenerator};
use crate::memory::{PastoralMemoryTracker, Theme};

/// Reply sent when moderation flags a chat message.
pub const MODERATION_FALLBACK: &str = "This sounds like a heavy burden. Speaking with a trusted priest or \
counselor can offer guidance and support. Is there another concern you'd like to explore together?";

/// Messages of recent conversation supplied to the chat prompt.
const CONTEXT_MESSAGES: usize = 3;

/// Sessions older than this are not listed.
const SESSION_LIST_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Model names and the generation deadline used by the request flows.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub chat_model: String,
    pub reading_model: String,
    pub generation_timeout: Duration,
}

impl From<&LlmConfig> for ServiceOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            chat_model: config.chat_model.clone(),
            reading_model: config.reading_model.clone(),
            generation_timeout: config.timeout(),
        }
    }
}

fn default_sender() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub chat_session_id: String,
    pub user_id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaintRequest {
    pub chat_session_id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    pub text: String,
    pub saint_name: String,
    #[serde(default)]
    pub avatar_name: String,
    pub date_str: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptureRequest {
    pub chat_session_id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    pub text: String,
    pub date: String,
    pub reading_title: String,
    pub scripture_reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BibleStudyRequest {
    pub chat_session_id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    pub text: String,
    pub date: String,
    pub reading_title: String,
    pub scripture_reference: String,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub message_id: String,
    #[serde(default)]
    pub user_email: Option<String>,
    pub reaction: String,
}

/// The appended reply message as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub id: String,
    pub sender: String,
    pub text: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_ups: Option<Vec<String>>,
}

impl ChatReply {
    fn from_message(message: Message, follow_ups: Option<Vec<String>>) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            text: message.text,
            timestamp: message.created_at,
            follow_ups,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionWithMessages {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<Message>,
}

pub struct ChatService {
    db: Arc<Mutex<Connection>>,
    cache: ResponseCache,
    tracker: PastoralMemoryTracker,
    generator: Arc<dyn TextGenerator>,
    classifier: Arc<dyn TextClassifier>,
    clock: Arc<dyn Clock>,
    options: ServiceOptions,
}

impl ChatService {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        cache: ResponseCache,
        tracker: PastoralMemoryTracker,
        generator: Arc<dyn TextGenerator>,
        classifier: Arc<dyn TextClassifier>,
        clock: Arc<dyn Clock>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            db,
            cache,
            tracker,
            generator,
            classifier,
            clock,
            options,
        }
    }

    pub fn tracker(&self) -> &PastoralMemoryTracker {
        &self.tracker
    }

    async fn with_db<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().map_err(|e| anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow!("db task failed: {e}"))?
    }

    async fn append(&self, session_id: &str, sender: &str, text: &str) -> Result<Message> {
        let now = self.clock.now();
        let (session_id, sender, text) = (session_id.to_string(), sender.to_string(), text.to_string());
        Ok(self
            .with_db(move |conn| messages::append_message(conn, &session_id, &sender, &text, now))
            .await?)
    }

    async fn generate(&self, prompt: &str, params: GenerationParams) -> Result<String> {
        let started = std::time::Instant::now();
        let result = with_timeout(
            self.options.generation_timeout,
            self.generator.generate(prompt, &params),
        )
        .await;
        match &result {
            Ok(text) => tracing::debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                chars = text.len(),
                "generation complete"
            ),
            Err(e) => tracing::error!(error = %e, "generation failed"),
        }
        Ok(result?)
    }

    /// Moderation fails open: an unavailable classifier lets the message through.
    async fn is_flagged(&self, text: &str) -> bool {
        match with_timeout(self.options.generation_timeout, self.classifier.is_flagged(text)).await {
            Ok(flagged) => flagged,
            Err(e) => {
                tracing::warn!(error = %e, "moderation check failed, continuing");
                false
            }
        }
    }

    /// Counsel flow: moderation, theme tracking, contextual generation.
    pub async fn send_message(&self, req: NewMessage) -> Result<ChatReply> {
        let user_msg = self.append(&req.chat_session_id, &req.sender, &req.text).await?;

        if self.is_flagged(&req.text).await {
            tracing::info!(session_id = %req.chat_session_id, "message flagged by moderation");
            let now = self.clock.now();
            let (message_id, text, email) = (user_msg.id.clone(), req.text.clone(), req.user_email.clone());
            let flagged = self
                .with_db(move |conn| messages::flag_message(conn, &message_id, &text, email.as_deref(), now))
                .await;
            if let Err(e) = flagged {
                tracing::warn!(message_id = %user_msg.id, error = %e, "could not record flagged message");
            }
            let reply = self
                .append(&req.chat_session_id, AI_SENDER, MODERATION_FALLBACK)
                .await?;
            return Ok(ChatReply::from_message(reply, Some(Vec::new())));
        }

        let themes = self.tracker.analyze_and_store(&req.user_id, &req.text).await;
        let context = self.conversation_context(&req.chat_session_id).await;

        let prompt = prompt::chat_prompt(&req.profile, &themes, &context, &req.text);
        let params = GenerationParams::default()
            .with_model(&self.options.chat_model)
            .with_system(prompt::SYSTEM_PROMPT)
            .with_temperature(req.profile.temperature());
        let raw = self.generate(&prompt, params).await?;
        let reply = GeneratedReply::parse(&raw);
        if matches!(reply, GeneratedReply::PlainText { .. }) {
            tracing::warn!(session_id = %req.chat_session_id, "reply was not structured JSON");
        }

        let ai_msg = self.append(&req.chat_session_id, AI_SENDER, reply.text()).await?;
        Ok(ChatReply::from_message(ai_msg, Some(reply.follow_ups().to_vec())))
    }

    /// Prayer-intention flow: theme tracking, then a prayer the user can say.
    pub async fn prayer_message(&self, req: NewMessage) -> Result<ChatReply> {
        self.append(&req.chat_session_id, &req.sender, &req.text).await?;
        let themes: Vec<Theme> = self.tracker.analyze_and_store(&req.user_id, &req.text).await;

        let prompt = prompt::prayer_prompt(&req.profile, &themes, &req.text);
        let params = GenerationParams::default()
            .with_model(&self.options.chat_model)
            .with_system(prompt::SYSTEM_PROMPT)
            .with_temperature(req.profile.temperature());
        let text = self.generate(&prompt, params).await?;

        let ai_msg = self.append(&req.chat_session_id, AI_SENDER, &text).await?;
        Ok(ChatReply::from_message(ai_msg, None))
    }

    /// Context is best-effort; a read failure yields an empty context.
    async fn conversation_context(&self, session_id: &str) -> String {
        let id = session_id.to_string();
        match self
            .with_db(move |conn| messages::recent_messages(conn, &id, CONTEXT_MESSAGES))
            .await
        {
            Ok(recent) => messages::context_from_messages(&recent),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "could not load conversation context");
                String::new()
            }
        }
    }

    pub async fn saint_reading(&self, req: SaintRequest) -> Result<ChatReply> {
        let key = keys::saint(&req.date_str);
        let params = GenerationParams::default()
            .with_model(&self.options.reading_model)
            .with_system(prompt::SYSTEM_PROMPT)
            .with_temperature(0.7)
            .with_max_tokens(600);
        let prompt = prompt::saint_prompt(&req.saint_name, &req.avatar_name);
        self.cached_reading(&req.chat_session_id, &req.sender, &req.text, &key, &prompt, params)
            .await
    }

    pub async fn scripture_reading(&self, req: ScriptureRequest) -> Result<ChatReply> {
        let key = keys::scripture(&req.date, &req.reading_title);
        let params = GenerationParams::default()
            .with_model(&self.options.chat_model)
            .with_system(prompt::SYSTEM_PROMPT)
            .with_temperature(0.5);
        let prompt = prompt::scripture_prompt(&req.reading_title, &req.scripture_reference);
        self.cached_reading(&req.chat_session_id, &req.sender, &req.text, &key, &prompt, params)
            .await
    }

    pub async fn bible_study(&self, req: BibleStudyRequest) -> Result<ChatReply> {
        let key = keys::bible_study(&req.date, &req.reading_title);
        let params = GenerationParams::default()
            .with_model(&self.options.chat_model)
            .with_temperature(0.6);
        let prompt = prompt::bible_study_prompt(&req.profile, &req.reading_title, &req.scripture_reference);
        self.cached_reading(&req.chat_session_id, &req.sender, &req.text, &key, &prompt, params)
            .await
    }

    /// Shared flow for cached readings: record the request, then serve the
    /// cached text or generate, append and populate.
    async fn cached_reading(
        &self,
        session_id: &str,
        sender: &str,
        user_text: &str,
        key: &str,
        prompt: &str,
        params: GenerationParams,
    ) -> Result<ChatReply> {
        self.append(session_id, sender, user_text).await?;

        if let Some(text) = self.cache.get_as::<String>(key).await {
            let ai_msg = self.append(session_id, AI_SENDER, &text).await?;
            return Ok(ChatReply::from_message(ai_msg, None));
        }

        let text = self.generate(prompt, params).await?;
        let ai_msg = self.append(session_id, AI_SENDER, &text).await?;
        self.cache.set(key, Value::String(text)).await;
        Ok(ChatReply::from_message(ai_msg, None))
    }

    /// Readings for `date`: cache, then the durable table, then the generator.
    pub async fn mass_readings(&self, date: &str) -> Result<MassReadings> {
        let key = keys::mass_readings(date);
        if let Some(cached) = self.cache.get_as::<CachedMassReadings>(&key).await {
            return Ok(cached.into_response(date));
        }

        let d = date.to_string();
        let stored = self
            .with_db(move |conn| readings::get_mass_reading(conn, &d))
            .await?;

        let readings = match stored {
            Some(r) => r,
            None => {
                tracing::info!(date = %date, "no stored mass readings, generating");
                let params = GenerationParams::default()
                    .with_model(&self.options.chat_model)
                    .with_temperature(0.3);
                let raw = self.generate(&prompt::calendar_prompt(date), params).await?;
                let parsed = readings::parse_calendar_payload(&raw, date)
                    .map_err(|e| LlmError::Decode(e.to_string()))?;
                let to_save = parsed.clone();
                self.with_db(move |conn| readings::save_mass_reading(conn, &to_save))
                    .await?;
                parsed
            }
        };

        let cached = CachedMassReadings::from(&readings);
        match serde_json::to_value(&cached) {
            Ok(value) => self.cache.set(&key, value).await,
            Err(e) => tracing::warn!(date = %date, error = %e, "could not encode mass readings for cache"),
        }
        Ok(cached.into_response(date))
    }

    pub async fn reset_memory(&self, user_id: &str) -> Result<()> {
        Ok(self.tracker.reset(user_id).await?)
    }

    pub async fn create_session(&self, user_id: &str, topic: Option<&str>) -> Result<ChatSession> {
        let now = self.clock.now();
        let user = user_id.to_string();
        let topic = topic.unwrap_or("chat").to_string();
        let session = self
            .with_db(move |conn| messages::create_session(conn, &user, &topic, now))
            .await?;
        tracing::info!(session_id = %session.id, user_id = %user_id, topic = %session.topic, "session created");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str, user_id: &str) -> Result<SessionWithMessages> {
        let (sid, user) = (session_id.to_string(), user_id.to_string());
        let found = self
            .with_db(move |conn| {
                let Some(session) = messages::get_session(conn, &sid, &user)? else {
                    return Ok(None);
                };
                let messages = messages::session_messages(conn, &sid)?;
                Ok(Some(SessionWithMessages { session, messages }))
            })
            .await?;
        found.ok_or_else(|| ChatError::NotFound(format!("session {session_id}")))
    }

    /// Recent non-empty chat sessions, newest first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionWithMessages>> {
        let since = self.clock.now() - chrono::Duration::days(SESSION_LIST_DAYS);
        let user = user_id.to_string();
        Ok(self
            .with_db(move |conn| {
                let mut out = Vec::new();
                for session in messages::list_sessions(conn, &user, since)? {
                    let messages = messages::session_messages(conn, &session.id)?;
                    if !messages.is_empty() {
                        out.push(SessionWithMessages { session, messages });
                    }
                }
                Ok(out)
            })
            .await?)
    }

    pub async fn add_feedback(&self, req: FeedbackRequest) -> Result<()> {
        let now = self.clock.now();
        let reaction = req.reaction.clone();
        self.with_db(move |conn| {
            messages::add_feedback(conn, &req.message_id, req.user_email.as_deref(), &req.reaction, now)
        })
        .await?;
        tracing::info!(reaction = %reaction, "feedback recorded");
        Ok(())
    }

    pub async fn delete_user_data(&self, user_id: &str) -> Result<DeletedUserData> {
        let user = user_id.to_string();
        Ok(self
            .with_db(move |conn| messages::delete_user_data(conn, &user))
            .await?)
    }
}
