//! Model-Context-Protocol client: JSON-RPC 2.0 over a child process (stdio),
//! plain HTTP, or HTTP with server-sent events.
//!
//! Handshake order per protocol: `initialize` request -> server capabilities
//! -> `notifications/initialized`. After that the manager only needs
//! `tools/list` and `tools/call`. One live client per server id, pooled and
//! idle-evicted by [`McpManager`].

mod client;
mod http;
mod manager;
mod protocol;
mod stdio;

pub use client::McpClient;
pub use http::HttpSession;
pub use manager::{McpManager, McpManagerConfig};
pub use protocol::{
    error_codes, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, PROTOCOL_VERSION,
};
pub use stdio::StdioSession;
