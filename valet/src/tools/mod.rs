//! Tool layer: the [`Tool`] trait, typed specs shown to the LLM, and the
//! in-process implementations (agenda, email, messenger, scheduling links,
//! web scraping).
//!
//! External collaborators sit behind the gateway traits in [`gateway`]; tools
//! translate JSON arguments into typed gateway calls and wrap outputs into
//! [`ToolCallContent`]. Uniform success/failure envelopes are the execution
//! facade's job (`crate::exec`), not the tools'.

mod agenda;
mod email;
mod messenger;
mod registry;
mod scheduling;
mod web;

pub mod gateway;

pub use agenda::{ConfirmAgendaEventTool, CreateCalendarEventTool, ListAgendaEventsTool};
pub use email::{ReadEmailTool, SearchEmailsTool, SendEmailTool};
pub use messenger::SendWhatsappTool;
pub use registry::ToolRegistry;
pub use scheduling::{CreateCalendlyEventTool, IngestCalendlyEventsTool, ListCalendlyEventsTool};
pub use web::{extract_urls, ExtractUrlsTool, ScrapeNewsForEventsTool, ScrapeWebContentTool};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// Tool descriptor shown to the LLM; `input_schema` is a JSON Schema for the
/// arguments object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Result of one tool call: a JSON payload plus an optional human-ready
/// rendering preferred by the humaniser over raw LLM prose.
#[derive(Debug, Clone, Default)]
pub struct ToolCallContent {
    pub value: Value,
    pub formatted_text: Option<String>,
}

impl ToolCallContent {
    pub fn json(value: Value) -> Self {
        Self {
            value,
            formatted_text: None,
        }
    }

    pub fn with_formatted(value: Value, formatted: impl Into<String>) -> Self {
        Self {
            value,
            formatted_text: Some(formatted.into()),
        }
    }
}

/// A single typed operation callable by the LLM.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable snake_case identifier, unique within a registry.
    fn name(&self) -> &str;

    /// Descriptor (name, description, argument schema) for the LLM.
    fn spec(&self) -> ToolSpec;

    /// Executes with JSON arguments already validated against the schema shape
    /// by the caller's parsing; implementations still check required fields.
    async fn call(&self, args: Value) -> Result<ToolCallContent, ToolError>;
}

pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing field: {key}")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_reports_missing_field() {
        let args = serde_json::json!({"present": "x"});
        assert_eq!(require_str(&args, "present").unwrap(), "x");
        let err = require_str(&args, "absent").unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(m) if m.contains("absent")));
    }
}
