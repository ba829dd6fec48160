//! # Toolbox LLM
//!
//! Chat-completion clients used by toolbox capabilities.
//!
//! - **Hosted**: OpenAI-style chat completions with a bearer token
//! - **Local**: the same wire format without auth
//! - **Ollama**: the `/api/generate` endpoint
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       LLM Boundary                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ProviderConfig ──► ChatProvider ──► complete(ChatRequest)     │
//! │                        │                     │                  │
//! │                        ▼                     ▼                  │
//! │     ChatCompletionsProvider / OllamaProvider  split_thinking    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod thinking;

pub use config::{ProviderConfig, ProviderKind, hosted_from_env};
pub use error::{LlmError, Result};
pub use provider::{
    ChatCompletionsProvider, ChatMessage, ChatProvider, ChatRequest, OllamaProvider, Role,
};
pub use thinking::{Reply, split_thinking};

/// Hosted chat-completions endpoint.
pub const XAI_CHAT_URL: &str = "https://api.x.ai/v1/chat/completions";

/// Default local chat-completions endpoint.
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:1234/v1/chat/completions";

/// Default Ollama generate endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";

pub const DEFAULT_HOSTED_MODEL: &str = "grok-3-mini";
pub const DEFAULT_LOCAL_MODEL: &str = "local-model";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

pub const DEFAULT_HOSTED_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
