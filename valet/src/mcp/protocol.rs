//! JSON-RPC 2.0 wire shapes for the MCP client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-11-25";

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// One message read off a transport: a server-initiated request, a
/// notification, or a response to one of ours. Untagged; variants are tried
/// in declaration order, so the method-bearing shapes come first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Request {
        id: Value,
        method: String,
        #[serde(default)]
        params: Value,
    },
    Notification {
        method: String,
        #[serde(default)]
        params: Value,
    },
    Response(JsonRpcResponse),
}

/// Canonical map key for a request id (responses demultiplex on this).
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_version() {
        let req = JsonRpcRequest::new(1, "tools/list", Value::Null);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["jsonrpc"], "2.0");
        assert_eq!(v["method"], "tools/list");
        assert!(v.get("params").is_none());
    }

    #[test]
    fn incoming_distinguishes_shapes() {
        let req: IncomingMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "method": "roots/list"}))
                .unwrap();
        assert!(matches!(req, IncomingMessage::Request { .. }));

        let notif: IncomingMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/progress"}))
                .unwrap();
        assert!(matches!(notif, IncomingMessage::Notification { .. }));

        let resp: IncomingMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}))
                .unwrap();
        match resp {
            IncomingMessage::Response(r) => assert!(r.result.is_some()),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn error_response_parses_code() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": "x",
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap();
        assert_eq!(resp.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn id_key_is_stable_for_strings_and_numbers() {
        assert_eq!(id_key(&json!("abc")), "abc");
        assert_eq!(id_key(&json!(42)), "42");
    }
}
