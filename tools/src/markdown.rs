//! `markdown-notes`: a minimal Markdown to HTML renderer.
//!
//! Handles `#`…`######` headings, `**bold**`, `*italic*`, `` `code` `` and
//! blank lines. Anything else passes through untouched.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::Value;
use toolbox_capabilities::{Capability, Kernel, RunError};

pub const KERNEL_NAME: &str = "markdown-notes";

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

#[allow(clippy::expect_used)]
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |pattern: &str, replacement: &'static str| Rule {
        pattern: Regex::new(pattern).expect("markdown pattern is valid"),
        replacement,
    };
    vec![
        rule(r"(?m)^###### (.*)$", "<h6>${1}</h6>"),
        rule(r"(?m)^##### (.*)$", "<h5>${1}</h5>"),
        rule(r"(?m)^#### (.*)$", "<h4>${1}</h4>"),
        rule(r"(?m)^### (.*)$", "<h3>${1}</h3>"),
        rule(r"(?m)^## (.*)$", "<h2>${1}</h2>"),
        rule(r"(?m)^# (.*)$", "<h1>${1}</h1>"),
        rule(r"\*\*(.*?)\*\*", "<strong>${1}</strong>"),
        rule(r"\*(.*?)\*", "<em>${1}</em>"),
        rule(r"`([^`]+)`", "<code>${1}</code>"),
        rule(r"(?m)\n$", "<br/>"),
    ]
});

/// Render `markdown` to HTML.
pub fn render(markdown: &str) -> String {
    let mut html = markdown.to_string();
    for rule in RULES.iter() {
        html = rule
            .pattern
            .replace_all(&html, rule.replacement)
            .into_owned();
    }
    html.trim().to_string()
}

/// Kernel for the notes renderer. Takes no options.
#[derive(Debug, Default)]
pub struct MarkdownKernel;

impl Kernel for MarkdownKernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn instantiate(&self, _options: &Value) -> Result<Arc<dyn Capability>, String> {
        Ok(Arc::new(MarkdownNotes))
    }
}

struct MarkdownNotes;

#[async_trait]
impl Capability for MarkdownNotes {
    async fn run(&self, input: &str) -> Result<String, RunError> {
        Ok(render(input))
    }
}
