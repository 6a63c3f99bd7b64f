//! Chat-completion client used by the default handlers.

use async_trait::async_trait;
use cadence_core::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// One chat message on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A completion request, independent of the model serving it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// A system prompt followed by one user message.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.4,
            max_tokens: 700,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Anything that can answer a chat request with text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// Connection settings for [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl ChatConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_API_BASE_URL` and `CADENCE_CHAT_MODEL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let api_key = present("OPENAI_API_KEY")
            .ok_or_else(|| CadenceError::ConfigError("OPENAI_API_KEY is not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Some(base_url) = present("OPENAI_API_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = present("CADENCE_CHAT_MODEL") {
            config.model = model;
        }
        Ok(config)
    }
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct ChatClient {
    /// Base URL without a trailing slash.
    base_url: String,

    api_key: String,

    model: String,

    /// HTTP client.
    http_client: reqwest::Client,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            model: config.model,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        debug!(model = %self.model, messages = request.messages.len(), "chat completion");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CadenceError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CadenceError::ServiceError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CadenceError::SerializationError(e.to_string()))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| {
                CadenceError::SerializationError("completion carried no message".to_string())
            })
    }
}
