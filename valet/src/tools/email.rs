//! Email tools over the mail gateway: search, read, send.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::ToolError;
use crate::tools::gateway::{MailGateway, OutgoingEmail};
use crate::tools::{optional_str, require_str, Tool, ToolCallContent, ToolSpec};

pub struct SearchEmailsTool {
    mail: Arc<dyn MailGateway>,
}

impl SearchEmailsTool {
    pub fn new(mail: Arc<dyn MailGateway>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for SearchEmailsTool {
    fn name(&self) -> &str {
        "search_emails"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("Search the mailbox; returns id, sender, subject and snippet per hit.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "folder": {"type": "string", "default": "INBOX"},
                    "max_results": {"type": "integer", "default": 10}
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let query = require_str(&args, "query")?;
        let folder = optional_str(&args, "folder").unwrap_or("INBOX");
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .unwrap_or(10)
            .min(50) as usize;

        let hits = self.mail.search(query, folder, max_results).await?;
        let formatted = if hits.is_empty() {
            format!("Sin resultados para \"{query}\".")
        } else {
            hits.iter()
                .map(|h| format!("• {} — {} ({})", h.subject, h.from, h.id))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&hits).unwrap_or_default(),
            formatted,
        ))
    }
}

pub struct ReadEmailTool {
    mail: Arc<dyn MailGateway>,
}

impl ReadEmailTool {
    pub fn new(mail: Arc<dyn MailGateway>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for ReadEmailTool {
    fn name(&self) -> &str {
        "read_email"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("Read one email by id: headers, body and attachment metadata.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "email_id": {"type": "string"},
                    "folder": {"type": "string", "default": "INBOX"}
                },
                "required": ["email_id"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let email_id = require_str(&args, "email_id")?;
        let folder = optional_str(&args, "folder").unwrap_or("INBOX");
        let detail = self.mail.read(email_id, folder).await?;
        Ok(ToolCallContent::json(
            serde_json::to_value(&detail).unwrap_or_default(),
        ))
    }
}

pub struct SendEmailTool {
    mail: Arc<dyn MailGateway>,
}

impl SendEmailTool {
    pub fn new(mail: Arc<dyn MailGateway>) -> Self {
        Self { mail }
    }
}

#[async_trait]
impl Tool for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("Send an email. cc and bcc are optional address lists.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string"},
                    "subject": {"type": "string"},
                    "body": {"type": "string"},
                    "cc": {"type": "array", "items": {"type": "string"}},
                    "bcc": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["to", "subject", "body"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let list = |key: &str| -> Vec<String> {
            args.get(key)
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        let email = OutgoingEmail {
            to: require_str(&args, "to")?.to_string(),
            subject: require_str(&args, "subject")?.to_string(),
            body: require_str(&args, "body")?.to_string(),
            cc: list("cc"),
            bcc: list("bcc"),
        };
        let receipt = self.mail.send(&email).await?;
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&receipt).unwrap_or_default(),
            format!("Email enviado a {}.", email.to),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::gateway::{EmailDetail, EmailSummary, MockMailGateway};
    use chrono::Utc;
    use std::collections::HashMap;

    fn gateway() -> Arc<MockMailGateway> {
        Arc::new(MockMailGateway::new().with_message(
            EmailSummary {
                id: "m1".into(),
                from: "jhon@example.com".into(),
                subject: "Entrevista".into(),
                received_at: Utc::now(),
                snippet: "martes 11".into(),
            },
            EmailDetail {
                headers: HashMap::from([("From".to_string(), "jhon@example.com".to_string())]),
                body: "¿Nos vemos el martes a las 11?".into(),
                attachments: vec![],
            },
        ))
    }

    #[tokio::test]
    async fn search_formats_hits() {
        let tool = SearchEmailsTool::new(gateway());
        let out = tool.call(json!({"query": "entrevista"})).await.unwrap();
        assert!(out.formatted_text.unwrap().contains("Entrevista"));
    }

    #[tokio::test]
    async fn read_unknown_id_is_application_error() {
        let tool = ReadEmailTool::new(gateway());
        let err = tool.call(json!({"email_id": "ghost"})).await.unwrap_err();
        assert!(matches!(err, ToolError::Application(_)));
    }

    #[tokio::test]
    async fn send_requires_recipient() {
        let tool = SendEmailTool::new(gateway());
        let err = tool
            .call(json!({"subject": "Hi", "body": "Hi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn send_returns_receipt() {
        let gw = gateway();
        let tool = SendEmailTool::new(gw.clone());
        let out = tool
            .call(json!({"to": "x@y.example", "subject": "Hi", "body": "Hi"}))
            .await
            .unwrap();
        assert_eq!(out.value["accepted"], true);
        assert_eq!(gw.sent.lock().unwrap().len(), 1);
    }
}
