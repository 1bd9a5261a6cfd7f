//! OpenAI-compatible HTTP client.
//!
//! Implements [`TextGenerator`] with `/chat/completions` and
//! [`TextClassifier`] with a zero-temperature completion for labelling plus
//! `/moderations` for harmful-content screening. Any server speaking the same
//! wire format (local gateways, proxies) works via `base_url`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{GenerationParams, LlmError, TextClassifier, TextGenerator};
use crate::config::LlmConfig;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    classify_model: String,
    moderation_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            default_model: config.chat_model.clone(),
            classify_model: config.chat_model.clone(),
            moderation_model: config.moderation_model.clone(),
        }
    }

    /// Point the client at a different server (used with mock servers in tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, LlmError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Resp>().await?)
    }

    async fn complete(
        &self,
        model: &str,
        system: Option<&str>,
        prompt: &str,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        let response: ChatResponse = self.post("/chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        tracing::debug!(model = %model, chars = content.len(), "completion received");
        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let model = params.model.as_deref().unwrap_or(&self.default_model);
        self.complete(
            model,
            params.system.as_deref(),
            prompt,
            params.temperature,
            params.max_tokens,
        )
        .await
    }
}

#[async_trait]
impl TextClassifier for OpenAiClient {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<String, LlmError> {
        let prompt = format!(
            "Analyze the following text and identify up to 2 themes from this list: {}.\n\
             Respond with a comma-separated list of themes only.\n\nText: \"{text}\"",
            labels.join(", ")
        );
        self.complete(&self.classify_model, None, &prompt, Some(0.0), Some(20))
            .await
    }

    async fn is_flagged(&self, text: &str) -> Result<bool, LlmError> {
        let request = ModerationRequest {
            model: &self.moderation_model,
            input: text,
        };
        let response: ModerationResponse = self.post("/moderations", &request).await?;
        Ok(response.results.iter().any(|r| r.flagged))
    }
}
