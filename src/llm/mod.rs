//! Text generation and classification collaborators.
//!
//! The core only talks to the model provider through [`TextGenerator`] and
//! [`TextClassifier`]. Both are injected at construction time; the
//! OpenAI-compatible HTTP implementation lives in [`openai`]. Every call made
//! from the request path goes through [`with_timeout`].

pub mod openai;
pub mod reply;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

pub use reply::GeneratedReply;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("empty response from model")]
    EmptyResponse,

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

/// Per-call generation knobs. `None` fields use the provider's defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerationParams {
    pub model: Option<String>,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationParams {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Produces free text from a prompt. No retries happen behind this trait.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;
}

/// Labels text against a vocabulary and screens it for harmful content.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Raw classifier output for `text`, expected to name labels from
    /// `labels`. Callers must validate the result.
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<String, LlmError>;

    /// `true` if the text should be withheld from generation.
    async fn is_flagged(&self, text: &str) -> Result<bool, LlmError>;
}

/// Bound `fut` by `limit`, mapping expiry to [`LlmError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_elapsed_limit() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, LlmError>("late")
        };
        let err = with_timeout(Duration::from_secs(5), slow).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn with_timeout_passes_through_results() {
        let fast = async { Ok::<_, LlmError>(7) };
        assert_eq!(with_timeout(Duration::from_secs(1), fast).await.unwrap(), 7);

        let failing = async { Err::<u8, _>(LlmError::EmptyResponse) };
        assert!(matches!(
            with_timeout(Duration::from_secs(1), failing).await,
            Err(LlmError::EmptyResponse)
        ));
    }

    #[test]
    fn params_builder_sets_fields() {
        let p = GenerationParams::default()
            .with_model("gpt-4o")
            .with_system("sys")
            .with_temperature(0.3)
            .with_max_tokens(600);
        assert_eq!(p.model.as_deref(), Some("gpt-4o"));
        assert_eq!(p.system.as_deref(), Some("sys"));
        assert_eq!(p.temperature, Some(0.3));
        assert_eq!(p.max_tokens, Some(600));
    }
}
