//! Session event types: one variant per structured log event the voice channel
//! may emit. Payload fields are flattened next to the `event` tag; the envelope
//! (`session_id`, `seq`, `ts`) is applied separately.

use serde::Serialize;
use serde_json::Value;

/// A structured log event for the voice pipeline. Wire shape is
/// `{"event": "<snake_case name>", ...payload}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session accepted; announces the PCM sample rate for audio frames.
    BackendReady { sample_rate: u32 },
    SttStarted,
    SttCompleted { transcription: String },
    AgentProcessingStarted { query: String },
    AgentRagStarted,
    AgentRagCompleted { chunks: usize },
    AgentIterationStarted { iteration: u32 },
    AgentToolsAvailable { tools: Vec<String> },
    AgentLlmReasoning { agent_code: String },
    AgentToolExecuting { tool_name: String },
    AgentToolCompleted { tool_name: String, success: bool },
    AgentResponseReady { response: String },
    TtsStarted,
    TtsFirstChunkSent,
    TtsCompleted,
    TtsError { message: String, fallback_available: bool },
    AgentError { message: String },
    BackendBusy,
    ClientDisconnected,
}

impl SessionEvent {
    /// Serialises this event to a JSON object (event tag + payload, no envelope).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// The snake_case event name, as it appears in the `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BackendReady { .. } => "backend_ready",
            Self::SttStarted => "stt_started",
            Self::SttCompleted { .. } => "stt_completed",
            Self::AgentProcessingStarted { .. } => "agent_processing_started",
            Self::AgentRagStarted => "agent_rag_started",
            Self::AgentRagCompleted { .. } => "agent_rag_completed",
            Self::AgentIterationStarted { .. } => "agent_iteration_started",
            Self::AgentToolsAvailable { .. } => "agent_tools_available",
            Self::AgentLlmReasoning { .. } => "agent_llm_reasoning",
            Self::AgentToolExecuting { .. } => "agent_tool_executing",
            Self::AgentToolCompleted { .. } => "agent_tool_completed",
            Self::AgentResponseReady { .. } => "agent_response_ready",
            Self::TtsStarted => "tts_started",
            Self::TtsFirstChunkSent => "tts_first_chunk_sent",
            Self::TtsCompleted => "tts_completed",
            Self::TtsError { .. } => "tts_error",
            Self::AgentError { .. } => "agent_error",
            Self::BackendBusy => "backend_busy",
            Self::ClientDisconnected => "client_disconnected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_is_snake_case() {
        let v = SessionEvent::SttCompleted {
            transcription: "hola".into(),
        }
        .to_value()
        .unwrap();
        assert_eq!(v["event"], "stt_completed");
        assert_eq!(v["transcription"], "hola");
    }

    #[test]
    fn name_matches_serialized_tag() {
        let events = [
            SessionEvent::BackendReady { sample_rate: 24_000 },
            SessionEvent::SttStarted,
            SessionEvent::AgentRagCompleted { chunks: 3 },
            SessionEvent::TtsError {
                message: "timeout".into(),
                fallback_available: true,
            },
            SessionEvent::ClientDisconnected,
        ];
        for ev in events {
            let v = ev.to_value().unwrap();
            assert_eq!(v["event"], ev.name());
        }
    }
}
