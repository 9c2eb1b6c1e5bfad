//! Conversation message types.
//!
//! Roles: System (first in the list), User, Assistant, and Tool for tool
//! results fed back into the reason-act loop. Used by `AgentState::messages`
//! and by the LLM client when building chat requests.

/// A single message in the conversation history.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    /// System prompt; placed first in the message list.
    System(String),
    /// User input.
    User(String),
    /// Model reply (may accompany tool calls).
    Assistant(String),
    /// Result of one tool execution, labelled with the tool's name.
    Tool {
        name: String,
        call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    pub fn tool(
        name: impl Into<String>,
        call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            name: name.into(),
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_produce_expected_variants() {
        assert!(matches!(Message::system("s"), Message::System(c) if c == "s"));
        assert!(matches!(Message::user("u"), Message::User(c) if c == "u"));
        assert!(matches!(Message::assistant("a"), Message::Assistant(c) if c == "a"));
        match Message::tool("send_email", "c1", "ok") {
            Message::Tool {
                name,
                call_id,
                content,
            } => {
                assert_eq!(name, "send_email");
                assert_eq!(call_id, "c1");
                assert_eq!(content, "ok");
            }
            other => panic!("expected tool message, got {:?}", other),
        }
    }

    #[test]
    fn serde_roundtrip() {
        let msg = Message::tool("list_agenda_events", "c9", "[]");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Message::Tool { ref name, .. } if name == "list_agenda_events"));
    }
}
