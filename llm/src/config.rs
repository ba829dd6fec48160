//! Provider configuration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LlmError, Result};
use crate::provider::{ChatCompletionsProvider, ChatProvider, OllamaProvider};

/// Which kind of endpoint to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Hosted chat-completions API with a bearer token.
    Hosted,
    /// Local chat-completions server, no auth.
    Local,
    /// Ollama generate endpoint.
    #[default]
    Ollama,
}

/// Serializable description of a chat provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Endpoint URL (per-kind default if unset).
    pub endpoint: Option<String>,

    /// Model name (per-kind default if unset).
    pub model: Option<String>,

    pub temperature: Option<f32>,

    /// Environment variable holding the API key (hosted only).
    pub api_key_env: Option<String>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Build a provider, reading keys from the process environment.
    pub fn build(&self) -> Result<Arc<dyn ChatProvider>> {
        self.build_with_env(|name| std::env::var(name).ok())
    }

    /// Build a provider, reading keys through `env`.
    pub fn build_with_env<F>(&self, env: F) -> Result<Arc<dyn ChatProvider>>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("Building {:?} provider", self.kind);
        let provider: Arc<dyn ChatProvider> = match self.kind {
            ProviderKind::Hosted => {
                let api_key = match &self.api_key_env {
                    Some(var) => lookup(&env, &[var.as_str()]).ok_or_else(|| {
                        LlmError::NotConfigured(format!("missing {var}"))
                    })?,
                    None => lookup(&env, &["XAI_API_KEY", "GROK_API_KEY"]).ok_or_else(|| {
                        LlmError::NotConfigured("missing XAI_API_KEY (or GROK_API_KEY)".to_string())
                    })?,
                };
                let endpoint = self
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| crate::XAI_CHAT_URL.to_string());
                let model = self
                    .model
                    .clone()
                    .or_else(|| lookup(&env, &["XAI_MODEL", "GROK_MODEL"]))
                    .unwrap_or_else(|| crate::DEFAULT_HOSTED_MODEL.to_string());
                let temperature = self
                    .temperature
                    .unwrap_or(crate::DEFAULT_HOSTED_TEMPERATURE);
                Arc::new(
                    ChatCompletionsProvider::hosted(endpoint, api_key)
                        .with_model(model)
                        .with_temperature(temperature),
                )
            }
            ProviderKind::Local => {
                let endpoint = self
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| crate::DEFAULT_LOCAL_URL.to_string());
                let mut provider = ChatCompletionsProvider::local(endpoint);
                if let Some(model) = &self.model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(temperature) = self.temperature {
                    provider = provider.with_temperature(temperature);
                }
                Arc::new(provider)
            }
            ProviderKind::Ollama => {
                let endpoint = self
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| crate::DEFAULT_OLLAMA_URL.to_string());
                let mut provider = OllamaProvider::new(endpoint);
                if let Some(model) = &self.model {
                    provider = provider.with_model(model.clone());
                }
                if let Some(temperature) = self.temperature {
                    provider = provider.with_temperature(temperature);
                }
                Arc::new(provider)
            }
        };
        Ok(provider)
    }
}

/// First non-empty value among `names`.
fn lookup<F>(env: &F, names: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .filter_map(|name| env(name))
        .find(|value| !value.trim().is_empty())
}

/// Hosted provider configured from `XAI_*` / `GROK_*` variables.
pub fn hosted_from_env() -> Result<Arc<dyn ChatProvider>> {
    ProviderConfig::new(ProviderKind::Hosted).build()
}
