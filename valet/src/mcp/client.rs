//! One MCP client: a transport plus the initialize handshake, `tools/list`
//! and `tools/call`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::debug;

use crate::error::McpError;
use crate::mcp::http::HttpSession;
use crate::mcp::protocol::{JsonRpcResponse, PROTOCOL_VERSION};
use crate::mcp::stdio::StdioSession;
use crate::settings::McpServerConfig;
use crate::tools::ToolSpec;

const INIT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug)]
enum Transport {
    Stdio(StdioSession),
    Http(HttpSession),
}

#[derive(Debug)]
pub struct McpClient {
    server_id: String,
    transport: Transport,
    next_id: AtomicU64,
    last_used: Mutex<Instant>,
}

impl McpClient {
    /// Connects to the server and completes the initialize handshake.
    pub async fn connect(server_id: &str, config: &McpServerConfig) -> Result<Self, McpError> {
        let transport = match config {
            McpServerConfig::Stdio { command, args, env } => {
                Transport::Stdio(StdioSession::spawn(command, args, env)?)
            }
            McpServerConfig::Http { url, headers } => Transport::Http(HttpSession::new(
                url.clone(),
                headers.clone().into_iter(),
            )?),
        };

        let client = Self {
            server_id: server_id.to_string(),
            transport,
            next_id: AtomicU64::new(1),
            last_used: Mutex::new(Instant::now()),
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": {
                "name": "valet-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let response = self
            .raw_request("initialize", params, INIT_TIMEOUT)
            .await?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol {
                code: err.code,
                message: format!("initialize: {}", err.message),
            });
        }
        debug!(server = %self.server_id, "mcp initialize complete");
        self.notify("notifications/initialized", json!({})).await
    }

    async fn raw_request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = Value::from(self.next_id.fetch_add(1, Ordering::Relaxed));
        match &self.transport {
            Transport::Stdio(s) => s.request(id, method, params, timeout).await,
            Transport::Http(s) => s.request(id, method, params, timeout).await,
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        match &self.transport {
            Transport::Stdio(s) => s.notify(method, params).await,
            Transport::Http(s) => s.notify(method, params).await,
        }
    }

    /// `tools/list`: available tool descriptors.
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, McpError> {
        self.touch();
        let response = self
            .raw_request("tools/list", json!({}), Duration::from_secs(20))
            .await?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        let result = response.result.unwrap_or_default();
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(tools
            .into_iter()
            .filter_map(|t| {
                Some(ToolSpec {
                    name: t.get("name")?.as_str()?.to_string(),
                    description: t
                        .get("description")
                        .and_then(|d| d.as_str())
                        .map(str::to_string),
                    input_schema: t.get("inputSchema").cloned().unwrap_or(json!({})),
                })
            })
            .collect())
    }

    /// `tools/call`: returns the raw result object; a JSON-RPC error becomes
    /// [`McpError::Protocol`] (application-level, never falls back).
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        self.touch();
        let response = self
            .raw_request(
                "tools/call",
                json!({"name": name, "arguments": arguments}),
                timeout,
            )
            .await?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    fn touch(&self) {
        if let Ok(mut guard) = self.last_used.lock() {
            *guard = Instant::now();
        }
    }

    /// Time since the last request on this client.
    pub fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|g| g.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub async fn close(&self) {
        if let Transport::Stdio(s) = &self.transport {
            s.close().await;
        }
    }
}
