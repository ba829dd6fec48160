//! Splitting model "thinking" from the final answer.

use std::sync::LazyLock;

use regex_lite::Regex;

#[allow(clippy::expect_used)]
static THINKING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<thinking>(.*?)</thinking>").expect("thinking pattern is valid")
});

/// A model reply with any reasoning block pulled out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub thinking: Option<String>,
    pub answer: String,
}

/// Separate the first `<thinking>…</thinking>` block from the rest of `text`.
pub fn split_thinking(text: &str) -> Reply {
    let Some(captures) = THINKING.captures(text) else {
        return Reply {
            thinking: None,
            answer: text.trim().to_string(),
        };
    };

    let thinking = captures
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());
    let answer = THINKING.replace(text, "").trim().to_string();
    Reply { thinking, answer }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_thinking() {
        let reply = split_thinking("  just the answer\n");
        assert_eq!(reply.thinking, None);
        assert_eq!(reply.answer, "just the answer");
    }

    #[test]
    fn test_thinking_block() {
        let reply = split_thinking("<thinking>\nstep 1\nstep 2\n</thinking>\n\nFinal prompt");
        assert_eq!(reply.thinking.as_deref(), Some("step 1\nstep 2"));
        assert_eq!(reply.answer, "Final prompt");
    }

    #[test]
    fn test_case_insensitive_tags() {
        let reply = split_thinking("Before <THINKING>hmm</Thinking> after");
        assert_eq!(reply.thinking.as_deref(), Some("hmm"));
        assert_eq!(reply.answer, "Before  after");
    }
}
