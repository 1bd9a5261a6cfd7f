//! Conversation flows: the message log, persona prompts, mass readings and
//! the orchestration service that ties memory, cache and generation together.

pub mod messages;
pub mod prompt;
pub mod readings;
pub mod service;

pub use prompt::UserProfile;
pub use service::{ChatError, ChatReply, ChatService, ServiceOptions};
