//! Messenger tool: send a chat message through the provider gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::ToolError;
use crate::tools::gateway::MessengerGateway;
use crate::tools::{require_str, Tool, ToolCallContent, ToolSpec};

pub struct SendWhatsappTool {
    messenger: Arc<dyn MessengerGateway>,
}

impl SendWhatsappTool {
    pub fn new(messenger: Arc<dyn MessengerGateway>) -> Self {
        Self { messenger }
    }
}

#[async_trait]
impl Tool for SendWhatsappTool {
    fn name(&self) -> &str {
        "send_whatsapp"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(
                "Send a WhatsApp message. `to` is the recipient phone in international format."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "body": {"type": "string"}
                },
                "required": ["to", "body"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let to = require_str(&args, "to")?;
        let body = require_str(&args, "body")?;
        let receipt = self.messenger.send(to, body).await?;
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&receipt).unwrap_or_default(),
            format!("Mensaje enviado a {to}."),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::gateway::MockMessengerGateway;

    #[tokio::test]
    async fn send_records_recipient_and_body() {
        let gw = Arc::new(MockMessengerGateway::new());
        let tool = SendWhatsappTool::new(gw.clone());
        let out = tool
            .call(json!({"to": "+34600000001", "body": "Confirmado para el viernes"}))
            .await
            .unwrap();
        assert_eq!(out.value["accepted"], true);
        let sent = gw.sent.lock().unwrap();
        assert_eq!(sent[0].0, "+34600000001");
        assert!(sent[0].1.contains("viernes"));
    }

    #[tokio::test]
    async fn missing_body_is_invalid() {
        let tool = SendWhatsappTool::new(Arc::new(MockMessengerGateway::new()));
        let err = tool.call(json!({"to": "+34600000001"})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
