#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::Connection;

use rysen::cache::{memory::InMemoryCache, ResponseCache, DEFAULT_TTL};
use rysen::chat::{ChatService, ServiceOptions};
use rysen::clock::{Clock, ManualClock};
use rysen::config::LlmConfig;
use rysen::db;
use rysen::llm::{GenerationParams, LlmError, TextClassifier, TextGenerator};
use rysen::memory::PastoralMemoryTracker;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

pub fn shared_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(test_db()))
}

/// A fixed, deterministic starting instant.
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 7, 14, 9, 0, 0).unwrap()))
}

/// Generator that replays scripted replies in order, then repeats the last.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self::new(vec![Ok(reply.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut replies = self.replies.lock().unwrap();
        let next = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        next.unwrap_or(Err(LlmError::EmptyResponse))
    }
}

/// Generator that never answers within any reasonable deadline.
pub struct StalledGenerator;

#[async_trait]
impl TextGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".into())
    }
}

/// Classifier with a fixed theme answer and moderation verdict.
pub struct FakeClassifier {
    pub themes: Result<String, ()>,
    pub flagged: bool,
}

impl FakeClassifier {
    pub fn themes(labels: &str) -> Self {
        Self {
            themes: Ok(labels.to_string()),
            flagged: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            themes: Err(()),
            flagged: false,
        }
    }

    pub fn flagging() -> Self {
        Self {
            themes: Ok("grief".into()),
            flagged: true,
        }
    }
}

#[async_trait]
impl TextClassifier for FakeClassifier {
    async fn classify(&self, _text: &str, _labels: &[&str]) -> Result<String, LlmError> {
        self.themes
            .clone()
            .map_err(|_| LlmError::Http("classifier unavailable".into()))
    }

    async fn is_flagged(&self, _text: &str) -> Result<bool, LlmError> {
        Ok(self.flagged)
    }
}

/// Everything a flow test needs to poke at.
pub struct Harness {
    pub db: Arc<Mutex<Connection>>,
    pub clock: Arc<ManualClock>,
    pub service: ChatService,
}

pub fn harness(generator: Arc<dyn TextGenerator>, classifier: Arc<dyn TextClassifier>) -> Harness {
    harness_with_timeout(generator, classifier, Duration::from_secs(30))
}

pub fn harness_with_timeout(
    generator: Arc<dyn TextGenerator>,
    classifier: Arc<dyn TextClassifier>,
    timeout: Duration,
) -> Harness {
    let db = shared_db();
    let clock = test_clock();
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let tracker = PastoralMemoryTracker::new(
        db.clone(),
        classifier.clone(),
        dyn_clock.clone(),
        Duration::from_secs(5),
        2,
    );
    let cache = ResponseCache::new(
        Arc::new(InMemoryCache::new(dyn_clock.clone(), 100)),
        DEFAULT_TTL,
    );
    let mut options = ServiceOptions::from(&LlmConfig::default());
    options.generation_timeout = timeout;
    let service = ChatService::new(db.clone(), cache, tracker, generator, classifier, dyn_clock, options);
    Harness { db, clock, service }
}
