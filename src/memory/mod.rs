//! Pastoral memory: a per-user rolling window of recently detected themes.
//!
//! - [`types`]: the [`types::Theme`] vocabulary and the bounded [`types::ThemeWindow`]
//! - [`store`]: SQLite persistence with versioned, conditional writes
//! - [`extract`]: fail-soft classification of free text into themes
//! - [`tracker`]: async front door with per-user serialization and retries

pub mod extract;
pub mod store;
pub mod tracker;
pub mod types;

pub use tracker::PastoralMemoryTracker;
pub use types::{PastoralMemory, Theme, ThemeWindow, THEME_CAPACITY};
