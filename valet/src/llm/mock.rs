//! Scripted LLM for tests: pops queued replies in order, then echoes.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::llm::{strip_reasoning, LlmClient, LlmReply, ToolChoiceMode};
use crate::message::Message;
use crate::state::ToolCall;
use crate::tools::ToolSpec;

/// Mock LLM with a queue of scripted replies. When the queue is empty it
/// answers with a fixed fallback so loops always terminate.
pub struct MockLlm {
    replies: Mutex<VecDeque<LlmReply>>,
    fallback: String,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: "ok".to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Queues a plain-text reply.
    pub fn push_text(&self, content: impl Into<String>) {
        self.replies.lock().unwrap().push_back(LlmReply {
            content: content.into(),
            tool_calls: vec![],
        });
    }

    /// Queues a reply that requests one tool call.
    pub fn push_tool_call(&self, name: impl Into<String>, arguments: impl Into<String>) {
        let name = name.into();
        self.replies.lock().unwrap().push_back(LlmReply {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: Some(format!("mock-{}", name)),
                name,
                arguments: arguments.into(),
            }],
        });
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _tool_choice: ToolChoiceMode,
    ) -> Result<LlmReply, AgentError> {
        let next = self.replies.lock().unwrap().pop_front();
        Ok(match next {
            Some(reply) => LlmReply {
                content: strip_reasoning(&reply.content),
                tool_calls: reply.tool_calls,
            },
            None => LlmReply {
                content: self.fallback.clone(),
                tool_calls: vec![],
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_in_order_then_fallback() {
        let llm = MockLlm::new().with_fallback("done");
        llm.push_text("first");
        llm.push_tool_call("list_agenda_events", r#"{"limit":10}"#);

        let a = llm.chat(&[], &[], ToolChoiceMode::Auto).await.unwrap();
        assert_eq!(a.content, "first");

        let b = llm.chat(&[], &[], ToolChoiceMode::Auto).await.unwrap();
        assert_eq!(b.tool_calls.len(), 1);
        assert_eq!(b.tool_calls[0].name, "list_agenda_events");

        let c = llm.chat(&[], &[], ToolChoiceMode::Auto).await.unwrap();
        assert_eq!(c.content, "done");
    }

    #[tokio::test]
    async fn reasoning_spans_never_leak() {
        let llm = MockLlm::new();
        llm.push_text("<think>hidden</think>visible");
        let reply = llm.chat(&[], &[], ToolChoiceMode::Auto).await.unwrap();
        assert_eq!(reply.content, "visible");
    }
}
