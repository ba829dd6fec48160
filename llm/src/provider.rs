//! Chat providers.
//!
//! Supports OpenAI-style chat-completion endpoints (hosted with a bearer
//! token, or local without auth) and Ollama's generate endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LlmError, Result};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request for one completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,

    /// Model to use (provider default if unset).
    pub model: Option<String>,

    /// Sampling temperature (provider default if unset).
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Trait for chat providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Name of this provider.
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Run one completion and return the assistant text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` provider.
pub struct ChatCompletionsProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
    default_model: String,
    default_temperature: f32,
}

impl ChatCompletionsProvider {
    /// A hosted provider authenticated with a bearer token.
    pub fn hosted(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: "hosted".to_string(),
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
            client: reqwest::Client::new(),
            default_model: crate::DEFAULT_HOSTED_MODEL.to_string(),
            default_temperature: crate::DEFAULT_HOSTED_TEMPERATURE,
        }
    }

    /// A local provider; no auth header is sent.
    pub fn local(endpoint: impl Into<String>) -> Self {
        Self {
            name: "local".to_string(),
            endpoint: endpoint.into(),
            api_key: None,
            client: reqwest::Client::new(),
            default_model: crate::DEFAULT_LOCAL_MODEL.to_string(),
            default_temperature: crate::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model.clone());
        let temperature = request.temperature.unwrap_or(self.default_temperature);

        debug!(
            "Chat completion with model {model} ({} messages)",
            request.messages.len()
        );

        let body = serde_json::json!({
            "model": model,
            "temperature": temperature,
            "messages": request.messages,
        });

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = http.send().await?;
        let content = read_reply(response).await?;
        info!("Chat completion returned {} characters", content.len());
        Ok(content)
    }
}

/// Ollama `/api/generate` provider.
pub struct OllamaProvider {
    endpoint: String,
    client: reqwest::Client,
    default_model: String,
    default_temperature: f32,
}

impl OllamaProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            default_model: crate::DEFAULT_OLLAMA_MODEL.to_string(),
            default_temperature: crate::DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(crate::DEFAULT_OLLAMA_URL)
    }
}

/// Flatten a conversation into one generate prompt.
pub fn flatten_prompt(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model.clone());
        let temperature = request.temperature.unwrap_or(self.default_temperature);

        debug!("Ollama generate with model {model}");

        let body = serde_json::json!({
            "model": model,
            "prompt": flatten_prompt(&request.messages),
            "stream": false,
            "options": { "temperature": temperature },
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        read_reply(response).await
    }
}

/// Turn an HTTP response into assistant text.
async fn read_reply(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let text = response.text().await?;
    let data: Option<serde_json::Value> = serde_json::from_str(&text).ok();

    if !status.is_success() {
        let message = data
            .as_ref()
            .and_then(upstream_message)
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_else(|| "Upstream error".to_string());
        warn!("Upstream returned {status}: {message}");
        return Err(LlmError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    let data = data.ok_or_else(|| LlmError::InvalidResponse("body is not JSON".to_string()))?;
    extract_content(&data).ok_or_else(|| {
        LlmError::InvalidResponse("missing choices[0].message.content and response".to_string())
    })
}

fn upstream_message(data: &serde_json::Value) -> Option<String> {
    let error = data.get("error")?;
    error
        .get("message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Read `choices[0].message.content`, falling back to `response`.
pub fn extract_content(data: &serde_json::Value) -> Option<String> {
    data.pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .or_else(|| data.get("response").and_then(serde_json::Value::as_str))
        .map(str::to_string)
}
