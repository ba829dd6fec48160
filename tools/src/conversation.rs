//! `conversation-analysis`: coach a user on their prompting from an HTML
//! export of one of their conversations.
//!
//! The export is reduced to plain text first: `script`, `style` and
//! `noscript` blocks are dropped, the main region is preferred over the
//! whole body, and every non-blank text run becomes one line.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex_lite::{Captures, Regex};
use serde::Deserialize;
use serde_json::Value;
use toolbox_capabilities::{Capability, Kernel, RunError};
use toolbox_llm::{ChatMessage, ChatProvider, ChatRequest, ProviderConfig};
use tracing::debug;

use crate::ToolDeps;
use crate::options::parse_options;

pub const KERNEL_NAME: &str = "conversation-analysis";

const COACH_SYSTEM_PROMPT: &str = "You are a concise, actionable prompting coach.";

const COACH_REQUEST: &str = "Analyze the user's conversation below and look for two or three \
ways to help them improve their outcomes by coaching them on better prompting skills. Avoid \
making things up to satisfy the request; it's OK to tell the user you couldn't find any \
improvements. Conversation follows:\n\n";

const COACH_TEMPERATURE: f32 = 0.3;

const NO_CONTENT: &str = "_No content returned._";

struct Patterns {
    hidden: Regex,
    comment: Regex,
    head: Regex,
    role_main: Regex,
    main: Regex,
    body: Regex,
    body_end: Regex,
    tag: Regex,
    entity: Regex,
}

#[allow(clippy::expect_used)]
static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| {
    let re = |pattern: &str| Regex::new(pattern).expect("html pattern is valid");
    Patterns {
        hidden: re(r"(?is)<script(?:\s[^>]*)?>.*?</script\s*>|<style(?:\s[^>]*)?>.*?</style\s*>|<noscript(?:\s[^>]*)?>.*?</noscript\s*>"),
        comment: re(r"(?s)<!--.*?-->"),
        head: re(r"(?is)<head(?:\s[^>]*)?>.*?</head\s*>"),
        role_main: re(r#"(?is)<[a-z][a-z0-9]*\s[^>]*role\s*=\s*["']?main["']?[^>]*>"#),
        main: re(r"(?is)<main(?:\s[^>]*)?>(.*?)</main\s*>"),
        body: re(r"(?is)<body(?:\s[^>]*)?>"),
        body_end: re(r"(?i)</body\s*>"),
        tag: re(r"(?s)<[^>]*>"),
        entity: re(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);"),
    }
});

/// Plain text of an HTML conversation export, one text run per line.
pub fn html_to_text(html: &str) -> String {
    let patterns = &*PATTERNS;
    let cleaned = patterns.hidden.replace_all(html, "");
    let cleaned = patterns.comment.replace_all(&cleaned, "");
    let region = main_region(patterns, &cleaned);

    let stripped = patterns.tag.replace_all(region, "\n");
    let decoded = patterns.entity.replace_all(&stripped, |caps: &Captures<'_>| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });

    decoded
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The `role="main"` element, else `<main>`, else the body.
///
/// An element marked `role="main"` is taken to run until the end of the
/// body.
fn main_region<'a>(patterns: &Patterns, html: &'a str) -> &'a str {
    let until_body_end = |start: usize| {
        let rest = &html[start..];
        match patterns.body_end.find(rest) {
            Some(end) => &rest[..end.start()],
            None => rest,
        }
    };

    if let Some(open) = patterns.role_main.find(html) {
        return until_body_end(open.end());
    }
    if let Some(inner) = patterns.main.captures(html).and_then(|caps| caps.get(1)) {
        return inner.as_str();
    }
    if let Some(open) = patterns.body.find(html) {
        return until_body_end(open.end());
    }
    match patterns.head.find(html) {
        Some(head) => &html[head.end()..],
        None => html,
    }
}

fn decode_entity(entity: &str) -> Option<String> {
    let c = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => entity.strip_prefix('#')?.parse().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some(c.to_string())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AnalysisOptions {
    provider: Option<ProviderConfig>,
}

/// Kernel for the conversation coach.
#[derive(Clone)]
pub struct ConversationAnalysisKernel {
    deps: ToolDeps,
}

impl ConversationAnalysisKernel {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

impl Kernel for ConversationAnalysisKernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn instantiate(&self, options: &Value) -> Result<Arc<dyn Capability>, String> {
        let options: AnalysisOptions = parse_options(options)?;
        Ok(Arc::new(ConversationAnalysis {
            provider: self.deps.provider_for(options.provider.as_ref())?,
        }))
    }
}

struct ConversationAnalysis {
    provider: Arc<dyn ChatProvider>,
}

#[async_trait]
impl Capability for ConversationAnalysis {
    async fn run(&self, input: &str) -> Result<String, RunError> {
        let text = html_to_text(input);
        if text.is_empty() {
            return Err(RunError::InvalidInput(
                "paste a conversation HTML export first".to_string(),
            ));
        }

        debug!("Analyzing {} lines of conversation", text.lines().count());
        let request = ChatRequest::new(vec![
            ChatMessage::system(COACH_SYSTEM_PROMPT),
            ChatMessage::user(format!("{COACH_REQUEST}{text}")),
        ])
        .with_temperature(COACH_TEMPERATURE);

        let reply = self
            .provider
            .complete(request)
            .await
            .map_err(|e| RunError::Upstream(e.to_string()))?;
        let reply = reply.trim();
        Ok(if reply.is_empty() { NO_CONTENT } else { reply }.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedProvider, deps_with};
    use pretty_assertions::assert_eq;
    use toolbox_llm::Role;

    const EXPORT: &str = r#"<!DOCTYPE html>
<html>
<head><title>Chat export</title><style>body { color: red; }</style></head>
<body>
  <nav>Sidebar &amp; history</nav>
  <main>
    <script>window.boot();</script>
    <div class="msg user"><p>How do I sort a <code>Vec</code>?</p></div>
    <div class="msg assistant"><p>Use <b>sort_by_key</b> &lt;T&gt;</p></div>
    <noscript>Enable JavaScript</noscript>
  </main>
</body>
</html>"#;

    #[test]
    fn test_html_to_text_keeps_main_region() {
        assert_eq!(
            html_to_text(EXPORT),
            "How do I sort a\nVec\n?\nUse\nsort_by_key\n<T>"
        );
    }

    #[test]
    fn test_html_to_text_role_main_and_body() {
        let html = r#"<body><header>Top</header><div role="main"><p>Hi&nbsp;there</p></div><footer>&#169; &#x41;</footer></body>"#;
        assert_eq!(html_to_text(html), "Hi there\n© A");

        let html = "<html><head><title>T</title></head><body><p>one</p><p>two</p></body></html>";
        assert_eq!(html_to_text(html), "one\ntwo");

        assert_eq!(html_to_text("plain &bogus; text"), "plain &bogus; text");
    }

    #[tokio::test]
    async fn test_coaching_request() {
        let provider = ScriptedProvider::new("  Be more specific.  ");
        let capability = ConversationAnalysisKernel::new(deps_with(&provider))
            .instantiate(&Value::Null)
            .unwrap();

        assert_eq!(capability.run(EXPORT).await.unwrap(), "Be more specific.");

        let sent = provider.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].temperature, Some(0.3));
        assert_eq!(sent[0].messages[0], ChatMessage::system(COACH_SYSTEM_PROMPT));
        assert_eq!(sent[0].messages[1].role, Role::User);
        assert!(sent[0].messages[1].content.starts_with("Analyze the user's conversation"));
        assert!(
            sent[0].messages[1]
                .content
                .ends_with("Conversation follows:\n\nHow do I sort a\nVec\n?\nUse\nsort_by_key\n<T>")
        );
    }

    #[tokio::test]
    async fn test_empty_reply_and_empty_export() {
        let provider = ScriptedProvider::new(" \n");
        let capability = ConversationAnalysisKernel::new(deps_with(&provider))
            .instantiate(&Value::Null)
            .unwrap();

        assert_eq!(capability.run("<p>hello</p>").await.unwrap(), NO_CONTENT);
        assert_eq!(
            capability
                .run("<html><body><script>x()</script> </body></html>")
                .await
                .unwrap_err(),
            RunError::InvalidInput("paste a conversation HTML export first".to_string())
        );
        assert_eq!(provider.requests().len(), 1);
    }
}
