//! `prompt-analyzer`: ask a model to improve a prompt towards a goal.
//!
//! The goal comes from the export options or, failing that, from the goal
//! last saved in the tool's settings. The model's `<thinking>` block is
//! returned separately from its answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use toolbox_capabilities::{Capability, Kernel, RunError};
use toolbox_kv::DocumentRepository;
use toolbox_llm::{ChatMessage, ChatProvider, ChatRequest, ProviderConfig, split_thinking};
use tracing::{debug, warn};

use crate::ToolDeps;
use crate::options::parse_options;

pub const KERNEL_NAME: &str = "prompt-analyzer";

/// Settings key holding the saved goal.
pub const GOAL_KEY: &str = "goal";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PromptOptions {
    goal: Option<String>,
    instructions: Option<String>,
    provider: Option<ProviderConfig>,
}

/// Kernel for the prompt analyzer.
#[derive(Clone)]
pub struct PromptAnalyzerKernel {
    deps: ToolDeps,
}

impl PromptAnalyzerKernel {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

impl Kernel for PromptAnalyzerKernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn instantiate(&self, options: &Value) -> Result<Arc<dyn Capability>, String> {
        let options: PromptOptions = parse_options(options)?;
        let provider = self.deps.provider_for(options.provider.as_ref())?;
        Ok(Arc::new(PromptAnalyzer {
            provider,
            repository: self.deps.repository().clone(),
            goal: non_empty(options.goal),
            instructions: non_empty(options.instructions).unwrap_or_default(),
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

struct PromptAnalyzer {
    provider: Arc<dyn ChatProvider>,
    repository: DocumentRepository,
    goal: Option<String>,
    instructions: String,
}

impl PromptAnalyzer {
    async fn goal(&self) -> Result<String, RunError> {
        if let Some(goal) = &self.goal {
            if let Err(e) = self
                .repository
                .set_setting(KERNEL_NAME, GOAL_KEY, Value::String(goal.clone()))
                .await
            {
                warn!("Could not save goal: {e}");
            }
            return Ok(goal.clone());
        }

        let saved = self
            .repository
            .get_setting(KERNEL_NAME, GOAL_KEY)
            .await
            .map_err(|e| RunError::Failed(e.to_string()))?;
        saved
            .as_ref()
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|goal| !goal.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RunError::InvalidInput("set a goal first".to_string()))
    }
}

#[async_trait]
impl Capability for PromptAnalyzer {
    async fn run(&self, input: &str) -> Result<String, RunError> {
        let prompt = input.trim();
        if prompt.is_empty() {
            return Err(RunError::InvalidInput("prompt is empty".to_string()));
        }
        let goal = self.goal().await?;

        let mut messages = Vec::new();
        if !self.instructions.is_empty() {
            messages.push(ChatMessage::system(&self.instructions));
        }
        messages.push(ChatMessage::user(format!("Goal: {goal}\n\n{prompt}")));

        debug!("Analyzing prompt with {}", self.provider.name());
        let reply = self
            .provider
            .complete(ChatRequest::new(messages))
            .await
            .map_err(|e| RunError::Upstream(e.to_string()))?;

        let reply = split_thinking(&reply);
        serde_json::to_string_pretty(&json!({
            "thinking": reply.thinking,
            "response": reply.answer,
        }))
        .map_err(|e| RunError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProvider, deps_with};
    use pretty_assertions::assert_eq;
    use toolbox_llm::Role;

    #[tokio::test]
    async fn test_goal_from_options_is_sent_and_saved() {
        let provider = ScriptedProvider::new("<thinking>check tone</thinking>Better prompt");
        let deps = deps_with(&provider);
        let capability = PromptAnalyzerKernel::new(deps.clone())
            .instantiate(&json!({ "goal": "Write a haiku", "instructions": "Be critical." }))
            .unwrap();

        let out: Value = serde_json::from_str(&capability.run("a poem").await.unwrap()).unwrap();
        assert_eq!(
            out,
            json!({ "thinking": "check tone", "response": "Better prompt" })
        );

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].messages[0].role, Role::System);
        assert_eq!(sent[0].messages[0].content, "Be critical.");
        assert_eq!(sent[0].messages[1].content, "Goal: Write a haiku\n\na poem");

        assert_eq!(
            deps.repository().get_setting(KERNEL_NAME, GOAL_KEY).await.unwrap(),
            Some(json!("Write a haiku"))
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_saved_goal() {
        let provider = ScriptedProvider::new("Sure");
        let deps = deps_with(&provider);
        deps.repository()
            .set_setting(KERNEL_NAME, GOAL_KEY, json!("Summarize"))
            .await
            .unwrap();

        let capability = PromptAnalyzerKernel::new(deps).instantiate(&Value::Null).unwrap();
        let out: Value = serde_json::from_str(&capability.run("text").await.unwrap()).unwrap();
        assert_eq!(out, json!({ "thinking": null, "response": "Sure" }));

        let sent = provider.requests();
        assert_eq!(sent[0].messages.len(), 1);
        assert_eq!(sent[0].messages[0].content, "Goal: Summarize\n\ntext");
    }

    #[tokio::test]
    async fn test_missing_goal_and_prompt() {
        let provider = ScriptedProvider::new("unused");
        let capability = PromptAnalyzerKernel::new(deps_with(&provider))
            .instantiate(&Value::Null)
            .unwrap();

        assert_eq!(
            capability.run("text").await.unwrap_err(),
            RunError::InvalidInput("set a goal first".to_string())
        );
        assert_eq!(
            capability.run("   ").await.unwrap_err(),
            RunError::InvalidInput("prompt is empty".to_string())
        );
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream() {
        let provider = ScriptedProvider::failing();
        let capability = PromptAnalyzerKernel::new(deps_with(&provider))
            .instantiate(&json!({ "goal": "g" }))
            .unwrap();
        assert!(matches!(
            capability.run("p").await.unwrap_err(),
            RunError::Upstream(_)
        ));
    }
}
