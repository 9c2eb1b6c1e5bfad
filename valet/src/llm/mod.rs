//! LLM client abstraction for the planning stage.
//!
//! The `plan` node needs a callable that, given the message history and the
//! filtered tool descriptors, returns assistant text and optional tool calls.
//! Implementations: [`ChatClient`] (OpenAI-compatible Chat Completions) and
//! [`MockLlm`] (scripted, for tests). Clients are stateless per call;
//! conversation memory lives in `AgentState::messages`.
//!
//! Every implementation must strip internal reasoning spans from the returned
//! content before handing it back; [`strip_reasoning`] is the shared pass.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::ChatClient;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AgentError;
use crate::message::Message;
use crate::state::ToolCall;
use crate::tools::ToolSpec;

/// Tool choice mode: whether the model may, must not, or must call tools.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

impl std::str::FromStr for ToolChoiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            _ => Err(format!(
                "unknown tool_choice: {} (use auto, none, or required)",
                s
            )),
        }
    }
}

/// Response from one completion: assistant text and optional tool calls.
pub struct LlmReply {
    /// Assistant message content, reasoning spans already removed.
    pub content: String,
    /// Tool calls for this turn; empty means the reply is final.
    pub tool_calls: Vec<ToolCall>,
}

static THINK_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("static regex"));

/// Removes `<think>…</think>` spans (case-insensitive, each span closed at its
/// own terminator) and trims the result.
pub fn strip_reasoning(content: &str) -> String {
    THINK_SPAN.replace_all(content, "").trim().to_string()
}

/// LLM client: given messages and tool descriptors, returns assistant text and
/// optional tool calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        tool_choice: ToolChoiceMode,
    ) -> Result<LlmReply, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_reasoning_removes_spans() {
        let raw = "<think>internal monologue</think>You have one meeting.";
        assert_eq!(strip_reasoning(raw), "You have one meeting.");
    }

    #[test]
    fn strip_reasoning_handles_multiple_and_mixed_case() {
        let raw = "<THINK>a</THINK>Hello <think>b\nmultiline</think>world";
        assert_eq!(strip_reasoning(raw), "Hello world");
    }

    #[test]
    fn strip_reasoning_is_idempotent() {
        let once = strip_reasoning("<think>x</think> done");
        assert_eq!(strip_reasoning(&once), once);
    }

    #[test]
    fn tool_choice_parses() {
        assert_eq!("auto".parse::<ToolChoiceMode>().unwrap(), ToolChoiceMode::Auto);
        assert_eq!(
            "required".parse::<ToolChoiceMode>().unwrap(),
            ToolChoiceMode::Required
        );
        assert!("sometimes".parse::<ToolChoiceMode>().is_err());
    }
}
