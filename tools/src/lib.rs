//! # Toolbox Tools
//!
//! Kernels for the capabilities that ship with the toolbox:
//!
//! - **csv-to-json**: CSV text to a JSON array of row objects
//! - **markdown-notes**: minimal Markdown to HTML
//! - **prompt-analyzer**: improve a prompt towards a saved goal
//! - **llm-chat**: multi-turn chat with a configured model
//! - **conversation-analysis**: prompting advice from an HTML chat export
//! - **agent-manager**: agents and the crews they form
//!
//! Capability modules bind to these by name, e.g.
//!
//! ```toml
//! interface = 1
//!
//! [exports.default]
//! kernel = "csv-to-json"
//! options = { delimiter = ";" }
//! ```

pub mod agents;
pub mod chat;
pub mod conversation;
pub mod csv;
pub mod markdown;
mod options;
pub mod prompt;

use std::sync::Arc;

use toolbox_capabilities::KernelCatalog;
use toolbox_kv::DocumentRepository;
use toolbox_llm::{ChatProvider, ProviderConfig};

pub use agents::AgentManagerKernel;
pub use chat::LlmChatKernel;
pub use conversation::ConversationAnalysisKernel;
pub use csv::CsvKernel;
pub use markdown::MarkdownKernel;
pub use prompt::PromptAnalyzerKernel;

/// Services the built-in kernels depend on.
#[derive(Clone)]
pub struct ToolDeps {
    repository: DocumentRepository,
    provider: Option<Arc<dyn ChatProvider>>,
}

impl ToolDeps {
    pub fn new(repository: DocumentRepository) -> Self {
        Self {
            repository,
            provider: None,
        }
    }

    /// Provider used by kernels whose options name none.
    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn repository(&self) -> &DocumentRepository {
        &self.repository
    }

    /// Provider for an export: its own config, else the shared provider,
    /// else a default local Ollama.
    pub(crate) fn provider_for(
        &self,
        config: Option<&ProviderConfig>,
    ) -> Result<Arc<dyn ChatProvider>, String> {
        match (config, &self.provider) {
            (Some(config), _) => config.build().map_err(|e| e.to_string()),
            (None, Some(provider)) => Ok(Arc::clone(provider)),
            (None, None) => ProviderConfig::default().build().map_err(|e| e.to_string()),
        }
    }
}

/// Catalog holding every built-in kernel.
pub fn builtin_catalog(deps: ToolDeps) -> KernelCatalog {
    KernelCatalog::new()
        .with(Arc::new(CsvKernel))
        .with(Arc::new(MarkdownKernel))
        .with(Arc::new(PromptAnalyzerKernel::new(deps.clone())))
        .with(Arc::new(ConversationAnalysisKernel::new(deps.clone())))
        .with(Arc::new(AgentManagerKernel::new(deps.clone())))
        .with(Arc::new(LlmChatKernel::new(deps)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use toolbox_kv::{DocumentRepository, MemoryKvStore};
    use toolbox_llm::{ChatProvider, ChatRequest, LlmError};

    use crate::ToolDeps;

    /// Provider that answers every request with a fixed reply.
    #[derive(Clone)]
    pub(crate) struct ScriptedProvider {
        reply: Option<String>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                requests: Arc::default(),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                reply: None,
                requests: Arc::default(),
            }
        }

        pub(crate) fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, request: ChatRequest) -> toolbox_llm::Result<String> {
            self.requests.lock().unwrap().push(request);
            self.reply.clone().ok_or_else(|| LlmError::Upstream {
                status: 500,
                message: "scripted failure".to_string(),
            })
        }
    }

    pub(crate) fn deps_with(provider: &ScriptedProvider) -> ToolDeps {
        ToolDeps::new(DocumentRepository::new(Arc::new(MemoryKvStore::new())))
            .with_provider(Arc::new(provider.clone()))
    }
}
