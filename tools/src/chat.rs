//! `llm-chat`: multi-turn chat with a configured model.
//!
//! Each export talks in a named conversation. Its history is kept in the
//! tool's settings and replayed ahead of every new message; sending
//! [`RESET_COMMAND`] forgets it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use toolbox_capabilities::{Capability, Kernel, RunError};
use toolbox_kv::DocumentRepository;
use toolbox_llm::{ChatMessage, ChatProvider, ChatRequest, ProviderConfig};
use tracing::{debug, warn};

use crate::ToolDeps;
use crate::options::parse_options;

pub const KERNEL_NAME: &str = "llm-chat";

/// Input that clears the conversation instead of sending a message.
pub const RESET_COMMAND: &str = "/reset";

pub const DEFAULT_CONVERSATION: &str = "default";

/// Messages kept per conversation, oldest dropped first.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ChatOptions {
    system: Option<String>,
    provider: Option<ProviderConfig>,
    conversation: Option<String>,
    history_limit: Option<usize>,
}

/// Settings key holding the history of `conversation`.
pub fn history_key(conversation: &str) -> String {
    format!("history.{conversation}")
}

/// Kernel for the chat tool.
#[derive(Clone)]
pub struct LlmChatKernel {
    deps: ToolDeps,
}

impl LlmChatKernel {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

impl Kernel for LlmChatKernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn instantiate(&self, options: &Value) -> Result<Arc<dyn Capability>, String> {
        let options: ChatOptions = parse_options(options)?;
        let conversation = options
            .conversation
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string());
        if conversation.contains(['/', '\\']) {
            return Err(format!("invalid conversation name: {conversation}"));
        }

        Ok(Arc::new(LlmChat {
            provider: self.deps.provider_for(options.provider.as_ref())?,
            repository: self.deps.repository().clone(),
            system: options.system.filter(|s| !s.trim().is_empty()),
            history_key: history_key(&conversation),
            history_limit: options.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        }))
    }
}

struct LlmChat {
    provider: Arc<dyn ChatProvider>,
    repository: DocumentRepository,
    system: Option<String>,
    history_key: String,
    history_limit: usize,
}

impl LlmChat {
    async fn history(&self) -> Result<Vec<ChatMessage>, RunError> {
        let saved = self
            .repository
            .get_setting(KERNEL_NAME, &self.history_key)
            .await
            .map_err(|e| RunError::Failed(e.to_string()))?;
        let Some(saved) = saved else {
            return Ok(Vec::new());
        };
        match serde_json::from_value(saved) {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!("Discarding unreadable chat history {}: {e}", self.history_key);
                Ok(Vec::new())
            }
        }
    }

    async fn save_history(&self, mut history: Vec<ChatMessage>) -> Result<(), RunError> {
        let overflow = history.len().saturating_sub(self.history_limit);
        history.drain(..overflow);
        let value = serde_json::to_value(&history).map_err(|e| RunError::Failed(e.to_string()))?;
        self.repository
            .set_setting(KERNEL_NAME, &self.history_key, value)
            .await
            .map_err(|e| RunError::Failed(e.to_string()))
    }
}

#[async_trait]
impl Capability for LlmChat {
    async fn run(&self, input: &str) -> Result<String, RunError> {
        if input.trim().is_empty() {
            return Err(RunError::InvalidInput("message is empty".to_string()));
        }
        if input.trim() == RESET_COMMAND {
            self.repository
                .store()
                .delete(KERNEL_NAME, &self.history_key)
                .await
                .map_err(|e| RunError::Failed(e.to_string()))?;
            debug!("Cleared chat history {}", self.history_key);
            return Ok("History cleared.".to_string());
        }

        let mut history = self.history().await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system));
        }
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(input));

        let reply = self
            .provider
            .complete(ChatRequest::new(messages))
            .await
            .map_err(|e| RunError::Upstream(e.to_string()))?;
        let reply = reply.trim().to_string();

        history.push(ChatMessage::user(input));
        history.push(ChatMessage::assistant(&reply));
        self.save_history(history).await?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProvider, deps_with};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use toolbox_llm::Role;

    #[tokio::test]
    async fn test_chat_with_system_prompt() {
        let provider = ScriptedProvider::new("  hello there \n");
        let capability = LlmChatKernel::new(deps_with(&provider))
            .instantiate(&json!({ "system": "You are terse." }))
            .unwrap();

        assert_eq!(capability.run("hi").await.unwrap(), "hello there");

        let sent = provider.requests();
        assert_eq!(
            sent[0].messages,
            vec![ChatMessage::system("You are terse."), ChatMessage::user("hi")]
        );
    }

    #[tokio::test]
    async fn test_history_is_replayed() {
        let provider = ScriptedProvider::new("noted");
        let deps = deps_with(&provider);
        let kernel = LlmChatKernel::new(deps.clone());
        let capability = kernel
            .instantiate(&json!({ "system": "Be brief." }))
            .unwrap();

        capability.run("my name is Ada").await.unwrap();
        capability.run("what is my name?").await.unwrap();

        let sent = provider.requests();
        assert_eq!(
            sent[1].messages,
            vec![
                ChatMessage::system("Be brief."),
                ChatMessage::user("my name is Ada"),
                ChatMessage::assistant("noted"),
                ChatMessage::user("what is my name?"),
            ]
        );
        assert_eq!(sent[1].messages[2].role, Role::Assistant);

        // A fresh instance of the same conversation picks the history up.
        let again = kernel.instantiate(&Value::Null).unwrap();
        again.run("still there?").await.unwrap();
        assert_eq!(provider.requests()[2].messages.len(), 5);

        let saved = deps
            .repository()
            .get_setting(KERNEL_NAME, &history_key(DEFAULT_CONVERSATION))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.as_array().map(Vec::len), Some(6));
        assert_eq!(saved[5], json!({ "role": "assistant", "content": "noted" }));
    }

    #[tokio::test]
    async fn test_conversations_are_separate_and_resettable() {
        let provider = ScriptedProvider::new("ok");
        let kernel = LlmChatKernel::new(deps_with(&provider));
        let work = kernel
            .instantiate(&json!({ "conversation": "work" }))
            .unwrap();
        let home = kernel
            .instantiate(&json!({ "conversation": "home" }))
            .unwrap();

        work.run("one").await.unwrap();
        home.run("two").await.unwrap();
        assert_eq!(provider.requests()[1].messages, vec![ChatMessage::user("two")]);

        assert_eq!(work.run(" /reset ").await.unwrap(), "History cleared.");
        work.run("three").await.unwrap();
        assert_eq!(provider.requests()[2].messages, vec![ChatMessage::user("three")]);
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_history_limit_and_failed_turns() {
        let provider = ScriptedProvider::new("r");
        let deps = deps_with(&provider);
        let capability = LlmChatKernel::new(deps.clone())
            .instantiate(&json!({ "history_limit": 2 }))
            .unwrap();

        capability.run("a").await.unwrap();
        capability.run("b").await.unwrap();
        let saved = deps
            .repository()
            .get_setting(KERNEL_NAME, &history_key(DEFAULT_CONVERSATION))
            .await
            .unwrap();
        assert_eq!(
            saved,
            Some(json!([
                { "role": "user", "content": "b" },
                { "role": "assistant", "content": "r" },
            ]))
        );

        let failing = ScriptedProvider::failing();
        let deps = deps_with(&failing);
        let capability = LlmChatKernel::new(deps.clone())
            .instantiate(&Value::Null)
            .unwrap();
        assert!(matches!(
            capability.run("lost").await.unwrap_err(),
            RunError::Upstream(_)
        ));
        assert_eq!(
            deps.repository()
                .get_setting(KERNEL_NAME, &history_key(DEFAULT_CONVERSATION))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_empty_message() {
        let provider = ScriptedProvider::new("x");
        let capability = LlmChatKernel::new(deps_with(&provider))
            .instantiate(&Value::Null)
            .unwrap();
        assert_eq!(
            capability.run(" ").await.unwrap_err(),
            RunError::InvalidInput("message is empty".to_string())
        );
    }

    #[test]
    fn test_bad_options() {
        let provider = ScriptedProvider::new("x");
        let kernel = LlmChatKernel::new(deps_with(&provider));
        let err = kernel.instantiate(&json!({ "sytem": "typo" })).err().unwrap();
        assert!(err.contains("sytem"));

        let err = kernel
            .instantiate(&json!({ "conversation": "../etc" }))
            .err()
            .unwrap();
        assert_eq!(err, "invalid conversation name: ../etc");
    }
}
