//! Rysen: backend for a Catholic spiritual-companion app.
//!
//! Users converse with a persona ("avatar") that answers with scripture,
//! saints and pastoral reflection. Two pieces carry state across requests:
//!
//! | Piece | Purpose | Bound |
//! |-------|---------|-------|
//! | **Pastoral memory** | recent spiritual themes per user, steering prompts | 3 themes, oldest evicted |
//! | **Response cache** | generated readings keyed by date and title | 48 h TTL by default |
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) for the message log, pastoral memory, mass
//!   readings and the shared cache table
//! - **Generation**: an OpenAI-compatible chat/moderation API behind the
//!   [`llm::TextGenerator`] and [`llm::TextClassifier`] traits
//! - **Transport**: JSON over HTTP (axum)
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations and health checks
//! - [`memory`]: theme vocabulary, bounded window, store and tracker
//! - [`cache`]: TTL response cache with memory and SQLite backends
//! - [`llm`]: model collaborator traits and the HTTP client
//! - [`chat`]: message log, prompts and request orchestration
//! - [`server`]: HTTP routes

pub mod cache;
pub mod chat;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod llm;
pub mod memory;
pub mod server;
