//! Request state for the orchestrator graph.
//!
//! One [`AgentState`] per inbound request flows stage to stage; nodes read it,
//! return an updated copy and never share it across requests. The
//! `plan -> tool` round trip is the only loop, bounded by
//! `iteration_count <= max_iterations`.

use serde::{Deserialize, Serialize};

use crate::exec::ToolResult;
use crate::message::Message;
use crate::store::ExtractedEvent;
use crate::tools::ToolSpec;

/// Detected intent of the user query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Calendar,
    Email,
    Scheduling,
    Comms,
    General,
}

/// Specialist mnemonic for the detected intent; tags log events and selects
/// the tool subset handed to the LLM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentCode {
    Cal,
    Email,
    Sched,
    Comms,
    #[default]
    Gen,
}

impl Intent {
    pub fn agent_code(self) -> AgentCode {
        match self {
            Self::Calendar => AgentCode::Cal,
            Self::Email => AgentCode::Email,
            Self::Scheduling => AgentCode::Sched,
            Self::Comms => AgentCode::Comms,
            Self::General => AgentCode::Gen,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "CALENDAR",
            Self::Email => "EMAIL",
            Self::Scheduling => "SCHEDULING",
            Self::Comms => "COMMS",
            Self::General => "GENERAL",
        }
    }
}

impl AgentCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cal => "CAL",
            Self::Email => "EMAIL",
            Self::Sched => "SCHED",
            Self::Comms => "COMMS",
            Self::Gen => "GEN",
        }
    }
}

/// A single tool invocation requested by the LLM during `plan`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name as listed to the LLM.
    pub name: String,
    /// Arguments as a JSON string; parsed when the tool executes.
    pub arguments: String,
    /// Correlation id matched against `ToolResult::call_id`.
    pub id: Option<String>,
}

/// State for one orchestrator request.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    /// The raw user query that seeded this request.
    pub user_query: String,
    /// Conversation history: system prompt, prior turns, tool results.
    pub messages: Vec<Message>,
    pub intent: Option<Intent>,
    pub agent_code: AgentCode,
    /// Assembled retrieval context, `[chunk_id]`-prefixed fragments.
    pub rag_context: String,
    /// Chunk ids cited by the retrieval context, first-appearance order.
    pub citations: Vec<String>,
    /// Events overlapping a time window mentioned in the query.
    pub conflicts: Vec<ExtractedEvent>,
    /// When set, `policy` refused the request and `respond` uses this text.
    pub policy_refusal: Option<String>,
    /// Tool subset selected for the agent code; handed to the LLM verbatim.
    pub tools: Vec<ToolSpec>,
    /// Tool calls requested in the current iteration.
    pub tool_calls: Vec<ToolCall>,
    /// All tool result envelopes accumulated across iterations.
    pub tool_results: Vec<ToolResult>,
    /// Final text, set by `respond`.
    pub response: Option<String>,
    /// Completed plan->tool rounds.
    pub iteration_count: u32,
}

impl AgentState {
    /// Seeds a fresh state from a query and prior chat history.
    pub fn seed(user_query: impl Into<String>, chat_history: Vec<Message>) -> Self {
        let user_query = user_query.into();
        let mut messages = chat_history;
        messages.push(Message::user(user_query.clone()));
        Self {
            user_query,
            messages,
            ..Self::default()
        }
    }

    /// Content of the chronologically last assistant message, if any.
    pub fn last_assistant_reply(&self) -> Option<String> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::Assistant(s) => Some(s.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_appends_query_to_history() {
        let state = AgentState::seed("hola", vec![Message::system("brief")]);
        assert_eq!(state.messages.len(), 2);
        assert!(matches!(&state.messages[1], Message::User(q) if q == "hola"));
        assert_eq!(state.user_query, "hola");
        assert_eq!(state.iteration_count, 0);
    }

    #[test]
    fn intent_maps_to_agent_code() {
        assert_eq!(Intent::Calendar.agent_code(), AgentCode::Cal);
        assert_eq!(Intent::Scheduling.agent_code(), AgentCode::Sched);
        assert_eq!(Intent::General.agent_code(), AgentCode::Gen);
    }

    #[test]
    fn last_assistant_reply_finds_latest() {
        let mut state = AgentState::seed("q", vec![]);
        state.messages.push(Message::assistant("first"));
        state.messages.push(Message::tool("t", "c", "out"));
        state.messages.push(Message::assistant("second"));
        assert_eq!(state.last_assistant_reply().as_deref(), Some("second"));
    }
}
