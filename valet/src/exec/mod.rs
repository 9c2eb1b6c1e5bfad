//! Tool execution facade: resolves a tool name to an MCP route or the local
//! registry, normalises every outcome into the uniform [`ToolResult`]
//! envelope, and records metrics and audit entries.
//!
//! Fallback contract: only transport-level MCP failures (connect, wire,
//! timeout, cooldown) fall back to the local registry. A JSON-RPC error or a
//! tool-reported failure is an application error and surfaces as
//! `success = false`.

mod mock;

pub use mock::mock_response;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ErrorKind, ToolError};
use crate::mcp::McpManager;
use crate::metrics::Metrics;
use crate::settings::McpRoute;
use crate::store::AuditLog;
use crate::tools::ToolRegistry;

/// Which implementation served a tool call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolVia {
    Mcp,
    Local,
    Mock,
}

/// Uniform result envelope for every tool execution.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub via: ToolVia,
    /// Correlation id from the planning tool call, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl ToolResult {
    pub fn ok(
        tool_name: impl Into<String>,
        result: Value,
        formatted_text: Option<String>,
        via: ToolVia,
        duration_ms: u64,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result: Some(result),
            formatted_text,
            error_kind: None,
            error_message: None,
            duration_ms,
            via,
            call_id: None,
        }
    }

    pub fn err(
        tool_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        via: ToolVia,
        duration_ms: u64,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: None,
            formatted_text: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            duration_ms,
            via,
            call_id: None,
        }
    }

    pub fn with_call_id(mut self, call_id: Option<String>) -> Self {
        self.call_id = call_id;
        self
    }

    /// Text representation fed back to the LLM as a tool message.
    pub fn message_content(&self) -> String {
        if self.success {
            self.formatted_text.clone().unwrap_or_else(|| {
                self.result
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
        } else {
            format!(
                "Error ({}): {}",
                self.error_kind.map(|k| k.to_string()).unwrap_or_default(),
                self.error_message.as_deref().unwrap_or("unknown")
            )
        }
    }
}

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    mcp: Arc<McpManager>,
    routes: HashMap<String, McpRoute>,
    metrics: Arc<Metrics>,
    audit: Arc<dyn AuditLog>,
    mock_mode: bool,
    call_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        mcp: Arc<McpManager>,
        routes: HashMap<String, McpRoute>,
        metrics: Arc<Metrics>,
        audit: Arc<dyn AuditLog>,
        mock_mode: bool,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            mcp,
            routes,
            metrics,
            audit,
            mock_mode,
            call_timeout,
        }
    }

    /// Executes one tool call. Never returns `Err`; every failure is encoded
    /// in the envelope.
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolResult {
        let started = Instant::now();
        let result = if self.mock_mode {
            let elapsed = started.elapsed().as_millis() as u64;
            ToolResult::ok(
                tool_name,
                mock_response(tool_name, &args),
                None,
                ToolVia::Mock,
                elapsed,
            )
        } else {
            self.execute_real(tool_name, args.clone(), started).await
        };

        self.metrics
            .incr(&format!("tool.{}.invocations", result.tool_name));
        if !result.success {
            self.metrics
                .incr(&format!("tool.{}.failures", result.tool_name));
        }
        self.metrics
            .observe_ms(&format!("tool.{}.latency", result.tool_name), result.duration_ms);

        let audit_payload = json!({
            "tool": result.tool_name,
            "via": result.via,
            "success": result.success,
            "duration_ms": result.duration_ms,
            "error_kind": result.error_kind,
        });
        if let Err(e) = self.audit.record("tool_call", "agent", audit_payload).await {
            warn!(error = %e, "audit write failed");
        }

        result
    }

    async fn execute_real(&self, tool_name: &str, args: Value, started: Instant) -> ToolResult {
        if let Some(route) = self.routes.get(tool_name) {
            match self
                .mcp
                .call(
                    &route.server_id,
                    &route.remote_name,
                    args.clone(),
                    self.call_timeout,
                )
                .await
            {
                Ok(result) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    return mcp_result_to_envelope(tool_name, result, elapsed);
                }
                Err(e) if e.is_transport() => {
                    debug!(tool = %tool_name, error = %e, "mcp transport failure, falling back");
                    // Fall through to the local registry below.
                }
                Err(e) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    return ToolResult::err(
                        tool_name,
                        ErrorKind::Application,
                        e.to_string(),
                        ToolVia::Mcp,
                        elapsed,
                    );
                }
            }
        }

        match tokio::time::timeout(self.call_timeout, self.registry.call(tool_name, args)).await {
            Ok(Ok(content)) => {
                let elapsed = started.elapsed().as_millis() as u64;
                ToolResult::ok(
                    tool_name,
                    content.value,
                    content.formatted_text,
                    ToolVia::Local,
                    elapsed,
                )
            }
            Ok(Err(e)) => {
                let elapsed = started.elapsed().as_millis() as u64;
                ToolResult::err(tool_name, e.kind(), e.to_string(), ToolVia::Local, elapsed)
            }
            Err(_) => {
                let elapsed = started.elapsed().as_millis() as u64;
                ToolResult::err(
                    tool_name,
                    ErrorKind::Transport,
                    format!("tool call timed out after {:?}", self.call_timeout),
                    ToolVia::Local,
                    elapsed,
                )
            }
        }
    }
}

/// Converts an MCP `tools/call` result object into the envelope. The result
/// convention is `{content: [{type: "text", text}], isError}`.
fn mcp_result_to_envelope(tool_name: &str, result: Value, duration_ms: u64) -> ToolResult {
    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if is_error {
        return ToolResult::err(
            tool_name,
            ErrorKind::Application,
            if text.is_empty() {
                "tool reported failure".to_string()
            } else {
                text
            },
            ToolVia::Mcp,
            duration_ms,
        );
    }

    let payload = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
        if text.is_empty() {
            result.clone()
        } else {
            Value::String(text.clone())
        }
    });
    ToolResult::ok(tool_name, payload, None, ToolVia::Mcp, duration_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpManagerConfig;
    use crate::settings::McpServerConfig;
    use crate::store::SqliteAuditLog;
    use crate::tools::{Tool, ToolCallContent, ToolSpec};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "send_email"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "send_email".into(),
                description: None,
                input_schema: json!({"type": "object"}),
            }
        }
        async fn call(&self, args: Value) -> Result<ToolCallContent, ToolError> {
            Ok(ToolCallContent::json(json!({"echo": args})))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow_tool"
        }
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "slow_tool".into(),
                description: None,
                input_schema: json!({"type": "object"}),
            }
        }
        async fn call(&self, _args: Value) -> Result<ToolCallContent, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolCallContent::json(json!({})))
        }
    }

    fn executor(mock_mode: bool, routes: HashMap<String, McpRoute>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(SlowTool)).unwrap();

        let servers = HashMap::from([(
            "offline".to_string(),
            McpServerConfig::Stdio {
                command: "definitely-not-a-command-xyz".into(),
                args: vec![],
                env: HashMap::new(),
            },
        )]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        std::mem::forget(dir);

        ToolExecutor::new(
            Arc::new(registry),
            Arc::new(McpManager::new(servers, McpManagerConfig::default())),
            routes,
            Arc::new(Metrics::new()),
            Arc::new(SqliteAuditLog::new(path).unwrap()),
            mock_mode,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn mock_mode_short_circuits() {
        let exec = executor(true, HashMap::new());
        let result = exec.execute("send_email", json!({"to": "x@y"})).await;
        assert!(result.success);
        assert_eq!(result.via, ToolVia::Mock);
    }

    #[tokio::test]
    async fn unmapped_tool_runs_locally() {
        let exec = executor(false, HashMap::new());
        let result = exec.execute("send_email", json!({"to": "x@y"})).await;
        assert!(result.success);
        assert_eq!(result.via, ToolVia::Local);
    }

    #[tokio::test]
    async fn mcp_transport_failure_falls_back_to_local() {
        let routes = HashMap::from([(
            "send_email".to_string(),
            McpRoute {
                server_id: "offline".into(),
                remote_name: "send_email".into(),
            },
        )]);
        let exec = executor(false, routes);
        let result = exec.execute("send_email", json!({"to": "x@y"})).await;
        assert!(result.success, "offline server must fall back: {result:?}");
        assert_eq!(result.via, ToolVia::Local);
    }

    #[tokio::test]
    async fn unknown_tool_fails_with_application_kind() {
        let exec = executor(false, HashMap::new());
        let result = exec.execute("ghost_tool", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Application));
        assert_eq!(result.via, ToolVia::Local);
    }

    #[tokio::test]
    async fn timeout_is_a_transport_failure() {
        let exec = executor(false, HashMap::new());
        let result = exec.execute("slow_tool", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Transport));
    }

    #[test]
    fn mcp_error_result_maps_to_application_failure() {
        let result = json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        });
        let env = mcp_result_to_envelope("t", result, 5);
        assert!(!env.success);
        assert_eq!(env.error_kind, Some(ErrorKind::Application));
        assert_eq!(env.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn mcp_text_payload_parses_as_json_when_possible() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"events\": []}"}],
            "isError": false
        });
        let env = mcp_result_to_envelope("t", result, 5);
        assert!(env.success);
        assert_eq!(env.result.unwrap()["events"], json!([]));
    }
}
