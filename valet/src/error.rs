//! Error types for the assistant core.
//!
//! Layer errors are `thiserror` enums; the cross-cutting [`ErrorKind`] taxonomy
//! is what surfaces in tool result envelopes and the audit log.

use thiserror::Error;

/// Failure classification carried by tool result envelopes and audit records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorKind {
    /// Missing or invalid configuration; fail-fast at startup.
    Config,
    /// Network, subprocess or serialisation failure against an external
    /// collaborator; recovered locally where a fallback exists.
    Transport,
    /// The collaborator returned a documented failure (HTTP 4xx, MCP error
    /// object, SMTP rejection). Never triggers a transport fallback.
    Application,
    /// An internal rule refused the action before any tool ran.
    Policy,
    /// User- or deadline-initiated cancellation.
    Cancelled,
    /// Invariant violation or unhandled case.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Config => "CONFIG",
            Self::Transport => "TRANSPORT",
            Self::Application => "APPLICATION",
            Self::Policy => "POLICY",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Orchestrator/graph execution error. Returned by graph nodes and the
/// orchestrator run loop.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A step failed (LLM call, store access, unexpected state).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The request was cancelled (interrupt or deadline).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Configuration problem discovered mid-run; aborts the whole graph.
    #[error("configuration: {0}")]
    Config(String),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ExecutionFailed(_) => ErrorKind::Internal,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Errors from the tool layer (registry tools, gateways).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("application: {0}")]
    Application(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::InvalidArguments(_) | Self::Application(_) => {
                ErrorKind::Application
            }
            Self::Transport(_) => ErrorKind::Transport,
        }
    }
}

/// Errors from persistence (SQLite stores, vector index, embedders).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("embedding: {0}")]
    Embedding(String),
    #[error("embedding dimension {got} does not match store dimension {expected}")]
    Dimension { expected: usize, got: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors from the MCP client layer.
#[derive(Debug, Error)]
pub enum McpError {
    /// Connection, subprocess or wire-level failure. Eligible for fallback.
    #[error("transport: {0}")]
    Transport(String),
    /// JSON-RPC error object returned by the server. Application-level.
    #[error("json-rpc {code}: {message}")]
    Protocol { code: i64, message: String },
    /// Server is in its post-failure cooldown window.
    #[error("server {0} is unhealthy (cooldown)")]
    Unhealthy(String),
    /// The call did not complete within its deadline.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
}

impl McpError {
    /// Transport-level failures (including timeouts and cooldown) may fall back
    /// to a local implementation; protocol errors must not.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Protocol { .. })
    }
}

/// Errors from the voice channel (STT/TTS backends, framing).
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("stt: {0}")]
    Stt(String),
    #[error("tts: {0}")]
    Tts(String),
    #[error("bad frame: {0}")]
    BadFrame(String),
    #[error("cancelled")]
    Cancelled,
}
