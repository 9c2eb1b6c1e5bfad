//! # Valet
//!
//! Core of a single-user personal coordination assistant: it takes voice or
//! text requests, classifies intent, retrieves semantic context, applies
//! policy, lets an LLM plan typed tool calls (agenda, email, messenger,
//! scheduling links, web), executes them through MCP servers or in-process
//! implementations, and produces a humanised answer.
//!
//! ## Main modules
//!
//! - [`pipeline`]: the orchestrator graph (`intent -> rag -> conflict_check ->
//!   policy -> dispatch -> plan -> tool -> respond`) with its bounded
//!   reason-act loop.
//! - [`graph`]: the generic state graph the pipeline is wired on.
//! - [`tools`] / [`exec`] / [`mcp`]: typed tools, the execution facade with
//!   MCP-first routing and local fallback, and the pooled MCP client manager.
//! - [`retrieval`] / [`embedding`] / [`store`]: semantic search over the chunk
//!   store with the bounded embedding cache; SQLite persistence for messages,
//!   events and the audit log.
//! - [`voice`]: the full-duplex voice session (STT, orchestrator, streaming
//!   TTS, barge-in).
//! - [`conversation`]: webhook-driven chat ingest and batch analysis.
//! - [`container`]: explicit leaves-first wiring from one [`Settings`]
//!   snapshot.

pub mod container;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod exec;
pub mod graph;
pub mod humanize;
pub mod intent;
pub mod llm;
pub mod mcp;
pub mod message;
pub mod metrics;
pub mod pipeline;
pub mod policy;
pub mod retrieval;
pub mod settings;
pub mod state;
pub mod store;
pub mod timeparse;
pub mod tools;
pub mod voice;
pub mod webhook;

pub use container::{ContainerError, ServiceContainer};
pub use error::{AgentError, ErrorKind, McpError, StoreError, ToolError, VoiceError};
pub use exec::{ToolExecutor, ToolResult, ToolVia};
pub use graph::{CompiledStateGraph, Next, Node, StageTiming, StateGraph, END, START};
pub use humanize::humanise;
pub use intent::IntentClassifier;
pub use llm::{strip_reasoning, ChatClient, LlmClient, LlmReply, MockLlm, ToolChoiceMode};
pub use mcp::{McpClient, McpManager, McpManagerConfig};
pub use message::Message;
pub use metrics::Metrics;
pub use pipeline::{Orchestrator, RunOutcome};
pub use policy::PolicyEngine;
pub use retrieval::Retriever;
pub use settings::{McpRoute, McpServerConfig, Settings, SettingsError};
pub use state::{AgentCode, AgentState, Intent, ToolCall};
pub use store::{
    AuditLog, CalendarEvent, ChunkStore, ConversationMessage, EventStatus, EventStore,
    ExtractedEvent, MessageStore, NewChunk, NewConversationMessage, NewExtractedEvent,
    SemanticChunk, SqliteAuditLog,
};
pub use tools::{Tool, ToolRegistry, ToolSpec};
pub use voice::{VoiceSession, VoiceSessionConfig};
pub use webhook::{sign_hex, validate_signature};
