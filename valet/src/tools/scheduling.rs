//! Scheduling-link tools: list and create provider bookings, and ingest them
//! into the local event store as suggested events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::ToolError;
use crate::store::{EventStatus, EventStore, NewExtractedEvent};
use crate::tools::gateway::SchedulerGateway;
use crate::tools::{optional_str, require_str, Tool, ToolCallContent, ToolSpec};

fn parse_rfc3339(raw: &str, key: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ToolError::InvalidArguments(format!("{key} must be RFC3339, got {raw}")))
}

pub struct ListCalendlyEventsTool {
    scheduler: Arc<dyn SchedulerGateway>,
}

impl ListCalendlyEventsTool {
    pub fn new(scheduler: Arc<dyn SchedulerGateway>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ListCalendlyEventsTool {
    fn name(&self) -> &str {
        "list_calendly_events"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("List bookings from the scheduling-link service.".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let events = self.scheduler.list_events().await?;
        let formatted = if events.is_empty() {
            "No hay reservas en Calendly.".to_string()
        } else {
            events
                .iter()
                .map(|e| {
                    format!(
                        "• {} — {}{}",
                        e.title,
                        e.start_at.format("%d/%m/%Y %H:%M"),
                        e.invitee
                            .as_deref()
                            .map(|i| format!(" (con {i})"))
                            .unwrap_or_default()
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&events).unwrap_or_default(),
            formatted,
        ))
    }
}

pub struct CreateCalendlyEventTool {
    scheduler: Arc<dyn SchedulerGateway>,
}

impl CreateCalendlyEventTool {
    pub fn new(scheduler: Arc<dyn SchedulerGateway>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for CreateCalendlyEventTool {
    fn name(&self) -> &str {
        "create_calendly_event"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("Create a booking on the scheduling-link service.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "start": {"type": "string", "description": "RFC3339 start time"},
                    "end": {"type": "string", "description": "RFC3339 end time"},
                    "invitee": {"type": "string", "description": "Invitee email"}
                },
                "required": ["title", "start"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let title = require_str(&args, "title")?;
        let start = parse_rfc3339(require_str(&args, "start")?, "start")?;
        let end = match optional_str(&args, "end") {
            Some(raw) => Some(parse_rfc3339(raw, "end")?),
            None => None,
        };
        let event = self
            .scheduler
            .create_event(title, start, end, optional_str(&args, "invitee"))
            .await?;
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&event).unwrap_or_default(),
            format!(
                "Reserva creada: {} el {}.",
                event.title,
                event.start_at.format("%d/%m/%Y a las %H:%M")
            ),
        ))
    }
}

/// Pulls provider bookings into the local store as `suggested` events so the
/// agenda and conflict check see them.
pub struct IngestCalendlyEventsTool {
    scheduler: Arc<dyn SchedulerGateway>,
    events: Arc<EventStore>,
}

impl IngestCalendlyEventsTool {
    pub fn new(scheduler: Arc<dyn SchedulerGateway>, events: Arc<EventStore>) -> Self {
        Self { scheduler, events }
    }
}

#[async_trait]
impl Tool for IngestCalendlyEventsTool {
    fn name(&self) -> &str {
        "ingest_calendly_events"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(
                "Import scheduling-link bookings into the local agenda as suggested events."
                    .to_string(),
            ),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let bookings = self.scheduler.list_events().await?;
        let mut ingested = 0usize;
        for booking in &bookings {
            self.events
                .insert(NewExtractedEvent {
                    source: "calendly".into(),
                    title: booking.title.clone(),
                    start_at: booking.start_at,
                    end_at: booking.end_at,
                    timezone: "UTC".into(),
                    location: None,
                    attendees: booking.invitee.iter().cloned().collect(),
                    status: EventStatus::Suggested,
                    confidence: 1.0,
                })
                .await
                .map_err(|e| ToolError::Application(e.to_string()))?;
            ingested += 1;
        }
        Ok(ToolCallContent::with_formatted(
            json!({"ingested": ingested}),
            format!("{ingested} reservas importadas a la agenda."),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::gateway::{MockSchedulerGateway, SchedulerEvent};

    fn scheduler_with_booking() -> Arc<MockSchedulerGateway> {
        Arc::new(MockSchedulerGateway::new().with_event(SchedulerEvent {
            id: "cal-1".into(),
            title: "Intro call".into(),
            start_at: Utc::now() + chrono::Duration::days(3),
            end_at: None,
            invitee: Some("ana@example.com".into()),
        }))
    }

    #[tokio::test]
    async fn list_formats_invitee() {
        let tool = ListCalendlyEventsTool::new(scheduler_with_booking());
        let out = tool.call(json!({})).await.unwrap();
        assert!(out.formatted_text.unwrap().contains("ana@example.com"));
    }

    #[tokio::test]
    async fn ingest_stores_suggested_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sched.db");
        std::mem::forget(dir);
        let events = Arc::new(EventStore::new(path).unwrap());

        let tool = IngestCalendlyEventsTool::new(scheduler_with_booking(), events.clone());
        let out = tool.call(json!({})).await.unwrap();
        assert_eq!(out.value["ingested"], 1);

        let upcoming = events.upcoming(Utc::now(), 10).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].status, EventStatus::Suggested);
        assert_eq!(upcoming[0].source, "calendly");
    }

    #[tokio::test]
    async fn create_requires_valid_start() {
        let tool = CreateCalendlyEventTool::new(scheduler_with_booking());
        let err = tool
            .call(json!({"title": "x", "start": "next tuesday"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
