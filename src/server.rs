//! HTTP surface over [`ChatService`].
//!
//! [`serve`] wires the database, cache, pastoral memory and the model client
//! into a running axum server; [`build_router`] exposes the routes alone so
//! they can be driven in-process.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::cache;
use crate::chat::readings::MassReadings;
use crate::chat::service::{
    BibleStudyRequest, FeedbackRequest, NewMessage, SaintRequest, ScriptureRequest, SessionWithMessages,
};
use crate::chat::{ChatError, ChatReply, ChatService, ServiceOptions};
use crate::clock::{Clock, SystemClock};
use crate::config::RysenConfig;
use crate::db;
use crate::llm::openai::OpenAiClient;
use crate::llm::{TextClassifier, TextGenerator};
use crate::memory::PastoralMemoryTracker;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}

/// Error body `{"detail": ...}` with a status chosen by failure kind.
pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Generation(_) => StatusCode::BAD_GATEWAY,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Internal(e) => {
                tracing::error!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Deserialize)]
struct SessionRequest {
    uid: String,
    #[serde(default)]
    topic: Option<String>,
}

#[derive(Deserialize)]
struct UidQuery {
    uid: String,
}

#[derive(Deserialize)]
struct DateQuery {
    date_str: String,
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> ApiResult<serde_json::Value> {
    let session = state
        .service
        .create_session(&req.uid, req.topic.as_deref())
        .await?;
    Ok(Json(json!({ "session_id": session.id })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(q): Query<UidQuery>,
) -> ApiResult<SessionWithMessages> {
    Ok(Json(state.service.get_session(&session_id, &q.uid).await?))
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<UidQuery>,
) -> ApiResult<Vec<SessionWithMessages>> {
    Ok(Json(state.service.list_sessions(&q.uid).await?))
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<NewMessage>,
) -> ApiResult<ChatReply> {
    Ok(Json(state.service.send_message(req).await?))
}

async fn prayer_message(
    State(state): State<AppState>,
    Json(req): Json<NewMessage>,
) -> ApiResult<ChatReply> {
    Ok(Json(state.service.prayer_message(req).await?))
}

async fn saint_reading(
    State(state): State<AppState>,
    Json(req): Json<SaintRequest>,
) -> ApiResult<ChatReply> {
    Ok(Json(state.service.saint_reading(req).await?))
}

async fn scripture_reading(
    State(state): State<AppState>,
    Json(req): Json<ScriptureRequest>,
) -> ApiResult<ChatReply> {
    Ok(Json(state.service.scripture_reading(req).await?))
}

async fn bible_study(
    State(state): State<AppState>,
    Json(req): Json<BibleStudyRequest>,
) -> ApiResult<ChatReply> {
    Ok(Json(state.service.bible_study(req).await?))
}

async fn mass_readings(
    State(state): State<AppState>,
    Query(q): Query<DateQuery>,
) -> ApiResult<MassReadings> {
    Ok(Json(state.service.mass_readings(&q.date_str).await?))
}

async fn add_feedback(
    State(state): State<AppState>,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<serde_json::Value> {
    state.service.add_feedback(req).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn reset_memory(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    state.service.reset_memory(&user_id).await?;
    Ok(Json(json!({ "status": "reset", "user_id": user_id })))
}

async fn delete_user_data(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let deleted = state.service.delete_user_data(&user_id).await?;
    Ok(Json(json!({
        "message": format!("All data for user {user_id} deleted"),
        "deleted": deleted,
    })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat/session", post(create_session))
        .route("/chat/session/{id}", get(get_session))
        .route("/chat/sessions", get(list_sessions))
        .route("/chat/message", post(send_message))
        .route("/prayer/message", post(prayer_message))
        .route("/saint/reading", post(saint_reading))
        .route("/bible/scripture", post(scripture_reading))
        .route("/bible/reading", post(bible_study))
        .route("/mass-readings", get(mass_readings))
        .route("/feedback", post(add_feedback))
        .route("/pastoral-memory/{user_id}/reset", post(reset_memory))
        .route("/chat-sessions/user/{user_id}", delete(delete_user_data));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .with_state(state)
}

/// Open storage, build the collaborators and return the service.
pub fn build_service(config: &RysenConfig) -> Result<ChatService> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");
    let db = Arc::new(Mutex::new(conn));

    if config.llm.api_key.is_empty() {
        tracing::warn!("no LLM API key configured; generation requests will fail");
    }
    let client = Arc::new(OpenAiClient::new(&config.llm));
    let generator: Arc<dyn TextGenerator> = client.clone();
    let classifier: Arc<dyn TextClassifier> = client;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let cache = cache::create_cache(&config.cache, db.clone(), clock.clone())?;
    let tracker = PastoralMemoryTracker::new(
        db.clone(),
        classifier.clone(),
        clock.clone(),
        config.llm.timeout(),
        config.memory.max_merge_retries,
    );

    Ok(ChatService::new(
        db,
        cache,
        tracker,
        generator,
        classifier,
        clock,
        ServiceOptions::from(&config.llm),
    ))
}

/// Run the HTTP server until ctrl-c.
pub async fn serve(config: RysenConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let service = build_service(&config)?;
    let router = build_router(AppState {
        service: Arc::new(service),
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "rysen listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
