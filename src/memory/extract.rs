//! Theme extraction from free text.
//!
//! The classifier is asked for labels from the [`Theme`] vocabulary; its raw
//! output is parsed here and anything outside the vocabulary is dropped.
//! Extraction never fails: timeouts, provider errors, and garbage output all
//! yield an empty list.

use std::time::Duration;

use super::types::Theme;
use crate::llm::{with_timeout, TextClassifier};

/// Most themes taken from a single message.
pub const MAX_EXTRACTED_THEMES: usize = 2;

/// Parse classifier output such as `"fear, excitement"` into known themes.
///
/// Accepts comma, semicolon, or newline separated labels with stray quotes,
/// brackets, bullets, or trailing punctuation. Keeps the first
/// [`MAX_EXTRACTED_THEMES`] distinct matches in output order.
pub fn parse_theme_labels(raw: &str) -> Vec<Theme> {
    let mut themes = Vec::with_capacity(MAX_EXTRACTED_THEMES);
    for token in raw.split([',', ';', '\n']) {
        let label = token.trim_matches(|c: char| !c.is_ascii_alphabetic());
        let Ok(theme) = label.parse::<Theme>() else {
            if !label.is_empty() {
                tracing::debug!(label = %label, "dropping label outside theme vocabulary");
            }
            continue;
        };
        if !themes.contains(&theme) {
            themes.push(theme);
        }
        if themes.len() == MAX_EXTRACTED_THEMES {
            break;
        }
    }
    themes
}

/// Classify `text` into at most [`MAX_EXTRACTED_THEMES`] themes, failing soft.
pub async fn extract_themes(
    classifier: &dyn TextClassifier,
    text: &str,
    timeout: Duration,
) -> Vec<Theme> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let labels: Vec<&str> = Theme::ALL.iter().map(Theme::as_str).collect();
    match with_timeout(timeout, classifier.classify(text, &labels)).await {
        Ok(raw) => parse_theme_labels(&raw),
        Err(e) => {
            tracing::warn!(error = %e, "theme extraction failed, continuing without themes");
            Vec::new()
        }
    }
}
