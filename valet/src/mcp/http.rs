//! HTTP transport: POST one JSON-RPC message per request. The server may
//! answer with `application/json` (single response) or `text/event-stream`
//! (responses and notifications on an SSE stream); both are parsed here, which
//! covers the plain-HTTP and HTTP+SSE transports with one session type.

use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::error::McpError;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};

/// Parses a JSON-RPC response from an HTTP body. For SSE bodies, data lines
/// are accumulated until a message with `result` or `error` appears.
pub(crate) fn parse_json_rpc_from_body(
    body: &str,
    content_type: Option<&str>,
) -> Result<JsonRpcResponse, McpError> {
    let is_sse = content_type
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_sse {
        return serde_json::from_str(body)
            .map_err(|e| McpError::Transport(format!("response json: {e}")));
    }

    let mut data_buffer = String::new();
    let mut try_buffer = |buf: &mut String| -> Option<JsonRpcResponse> {
        if buf.is_empty() {
            return None;
        }
        if let Ok(r) = serde_json::from_str::<JsonRpcResponse>(buf) {
            if r.result.is_some() || r.error.is_some() {
                return Some(r);
            }
        }
        None
    };

    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" || data.is_empty() {
                if let Some(r) = try_buffer(&mut data_buffer) {
                    return Ok(r);
                }
                data_buffer.clear();
                continue;
            }
            if !data_buffer.is_empty() {
                data_buffer.push('\n');
            }
            data_buffer.push_str(data);
            if let Some(r) = try_buffer(&mut data_buffer) {
                return Ok(r);
            }
        } else if line.trim().is_empty() {
            if let Some(r) = try_buffer(&mut data_buffer) {
                return Ok(r);
            }
            data_buffer.clear();
        }
    }
    if let Some(r) = try_buffer(&mut data_buffer) {
        return Ok(r);
    }
    Err(McpError::Transport(
        "SSE stream carried no JSON-RPC response".into(),
    ))
}

/// MCP session over HTTP. The `MCP-Session-Id` header returned by the server
/// on `initialize` is echoed on every subsequent request.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl HttpSession {
    pub fn new(
        url: impl Into<String>,
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, McpError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            headers: headers.into_iter().collect(),
            session_id: Mutex::new(None),
        })
    }

    fn post(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header("MCP-Protocol-Version", PROTOCOL_VERSION)
            .body(body);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Ok(guard) = self.session_id.lock() {
            if let Some(ref sid) = *guard {
                req = req.header("MCP-Session-Id", sid.as_str());
            }
        }
        req
    }

    /// Sends a request and parses the response (JSON or SSE body). Captures
    /// the session id header when the server assigns one.
    pub async fn request(
        &self,
        id: Value,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        let request = JsonRpcRequest::new(id, method, params);
        let body = serde_json::to_vec(&request).map_err(|e| McpError::Transport(e.to_string()))?;

        let resp = tokio::time::timeout(timeout, self.post(body).send())
            .await
            .map_err(|_| McpError::Timeout(timeout))?
            .map_err(|e| McpError::Transport(e.to_string()))?;

        if let Some(sid) = resp
            .headers()
            .get("MCP-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.lock() {
                *guard = Some(sid.to_string());
            }
        }

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "{method} HTTP {status}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        parse_json_rpc_from_body(&text, content_type.as_deref())
    }

    /// Sends a notification; 202 Accepted and plain 2xx both count as success.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let body =
            serde_json::to_vec(&notification).map_err(|e| McpError::Transport(e.to_string()))?;
        let resp = self
            .post(body)
            .send()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;
        let status = resp.status();
        if status != reqwest::StatusCode::ACCEPTED && !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "{method} HTTP {status}: {}",
                if text.is_empty() { "no body" } else { &text }
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_body_parses() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let resp = parse_json_rpc_from_body(body, Some("application/json")).unwrap();
        assert!(resp.result.is_some());
    }

    #[test]
    fn sse_body_parses_first_response() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"ok\":true}}\n\n";
        let resp = parse_json_rpc_from_body(body, Some("text/event-stream")).unwrap();
        assert_eq!(resp.result.unwrap()["ok"], true);
    }

    #[test]
    fn sse_multiline_data_accumulates() {
        let body = "data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":1,\"result\":{}}\n\n";
        let resp = parse_json_rpc_from_body(body, Some("text/event-stream")).unwrap();
        assert!(resp.result.is_some());
    }

    #[test]
    fn sse_without_response_is_transport_error() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n";
        let err = parse_json_rpc_from_body(body, Some("text/event-stream")).unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[test]
    fn error_body_keeps_error_object() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"invalid params"}}"#;
        let resp = parse_json_rpc_from_body(body, None).unwrap();
        assert_eq!(resp.error.unwrap().code, -32602);
    }
}
