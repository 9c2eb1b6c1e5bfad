//! Agenda tools over the persistent event store: list forthcoming events,
//! create a calendar event, confirm a proposed one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::ToolError;
use crate::store::{EventStatus, EventStore, ExtractedEvent, NewExtractedEvent};
use crate::tools::{optional_str, require_str, Tool, ToolCallContent, ToolSpec};

fn parse_datetime(args: &serde_json::Value, key: &str) -> Result<DateTime<Utc>, ToolError> {
    let raw = require_str(args, key)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ToolError::InvalidArguments(format!("{key} must be RFC3339, got {raw}")))
}

fn format_event_line(event: &ExtractedEvent) -> String {
    let when = event.start_at.format("%d/%m/%Y %H:%M");
    match &event.location {
        Some(loc) => format!("• {} — {} ({})", event.title, when, loc),
        None => format!("• {} — {}", event.title, when),
    }
}

/// `list_agenda_events(limit)`: forthcoming events from the store.
pub struct ListAgendaEventsTool {
    events: Arc<EventStore>,
}

impl ListAgendaEventsTool {
    pub fn new(events: Arc<EventStore>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Tool for ListAgendaEventsTool {
    fn name(&self) -> &str {
        "list_agenda_events"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(
                "List the user's forthcoming agenda events, soonest first.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "description": "Maximum events to return", "default": 10}
                }
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(10)
            .min(100) as usize;
        let events = self
            .events
            .upcoming(Utc::now(), limit)
            .await
            .map_err(|e| ToolError::Application(e.to_string()))?;

        let formatted = if events.is_empty() {
            "No hay eventos próximos en la agenda.".to_string()
        } else {
            events
                .iter()
                .map(format_event_line)
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&events).unwrap_or_default(),
            formatted,
        ))
    }
}

/// `create_calendar_event(...)`: persists a confirmed event and materialises
/// the provider calendar entry; returns the provider event id.
pub struct CreateCalendarEventTool {
    events: Arc<EventStore>,
}

impl CreateCalendarEventTool {
    pub fn new(events: Arc<EventStore>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Tool for CreateCalendarEventTool {
    fn name(&self) -> &str {
        "create_calendar_event"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(
                "Create a calendar event. Times are RFC3339; attendees is a list of emails."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "start": {"type": "string", "description": "RFC3339 start time"},
                    "end": {"type": "string", "description": "RFC3339 end time"},
                    "attendees": {"type": "array", "items": {"type": "string"}},
                    "location": {"type": "string"},
                    "description": {"type": "string"}
                },
                "required": ["title", "start", "end"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let title = require_str(&args, "title")?.to_string();
        let start = parse_datetime(&args, "start")?;
        let end = parse_datetime(&args, "end")?;
        if end < start {
            return Err(ToolError::InvalidArguments(
                "end must not precede start".into(),
            ));
        }
        let attendees: Vec<String> = args
            .get("attendees")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let id = self
            .events
            .insert(NewExtractedEvent {
                source: "assistant".into(),
                title: title.clone(),
                start_at: start,
                end_at: Some(end),
                timezone: "UTC".into(),
                location: optional_str(&args, "location").map(str::to_string),
                attendees,
                status: EventStatus::Confirmed,
                confidence: 1.0,
            })
            .await
            .map_err(|e| ToolError::Application(e.to_string()))?;

        let provider_event_id = Uuid::new_v4().to_string();
        let calendar = self
            .events
            .materialise(id, "calendar", &provider_event_id, "primary")
            .await
            .map_err(|e| ToolError::Application(e.to_string()))?;

        Ok(ToolCallContent::with_formatted(
            json!({
                "event_id": id,
                "provider_event_id": calendar.provider_event_id,
                "title": title,
                "start": start.to_rfc3339(),
                "end": end.to_rfc3339(),
            }),
            format!(
                "Evento creado: {} el {}.",
                title,
                start.format("%d/%m/%Y a las %H:%M")
            ),
        ))
    }
}

/// `confirm_agenda_event(event_id)`: `proposed|suggested -> confirmed`.
pub struct ConfirmAgendaEventTool {
    events: Arc<EventStore>,
}

impl ConfirmAgendaEventTool {
    pub fn new(events: Arc<EventStore>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Tool for ConfirmAgendaEventTool {
    fn name(&self) -> &str {
        "confirm_agenda_event"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("Confirm a proposed agenda event by id.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "event_id": {"type": "integer"}
                },
                "required": ["event_id"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let event_id = args
            .get("event_id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ToolError::InvalidArguments("missing field: event_id".into()))?;
        let event = self
            .events
            .transition(event_id, EventStatus::Confirmed, "user")
            .await
            .map_err(|e| ToolError::Application(e.to_string()))?;
        Ok(ToolCallContent::with_formatted(
            serde_json::to_value(&event).unwrap_or_default(),
            format!("Evento confirmado: {}.", event.title),
        ))
    }
}
