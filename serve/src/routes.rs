//! HTTP handlers. Webhook handlers validate the provider signature over the
//! exact raw body, persist idempotently, answer fast and leave analysis to a
//! background task.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;
use valet::store::{EventStatus, NewConversationMessage, NewExtractedEvent};
use valet::{validate_signature, Message};

use crate::app::AppState;

pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    let settings = &state.container.settings;
    Json(json!({
        "status": "ok",
        "mock_mode": settings.mock_mode,
        "mcp_servers": state.container.mcp.known_servers(),
        "tools": state.container.registry.list().len(),
    }))
}

pub async fn tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({"tools": state.container.registry.list()}))
}

pub async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let mut snapshot = state.container.metrics.snapshot();
    if let Some(obj) = snapshot.as_object_mut() {
        obj.insert(
            "embedding_cache".to_string(),
            serde_json::to_value(state.container.embedding_cache.stats()).unwrap_or(Value::Null),
        );
    }
    Json(snapshot)
}

#[derive(Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
pub struct TextRequest {
    pub query: String,
    #[serde(default)]
    pub chat_history: Vec<HistoryEntry>,
}

pub async fn text(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> impl IntoResponse {
    let history: Vec<Message> = request
        .chat_history
        .iter()
        .map(|entry| match entry.role.as_str() {
            "assistant" => Message::assistant(&entry.content),
            "system" => Message::system(&entry.content),
            _ => Message::user(&entry.content),
        })
        .collect();

    match state
        .container
        .orchestrator
        .run(&request.query, history, None, None)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "text": outcome.response,
                "citations": outcome.citations,
                "debug": {
                    "intent": outcome.intent,
                    "agent_code": outcome.agent_code,
                    "stage_timings": outcome.stage_timings,
                    "tool_results": outcome.tool_results,
                },
            })),
        ),
        Err(e) => {
            warn!(error = %e, "text request failed");
            (
                StatusCode::OK,
                Json(json!({
                    "text": "Lo siento, no he podido procesar la petición.",
                    "citations": [],
                    "debug": {"error": e.to_string()},
                })),
            )
        }
    }
}

#[derive(Deserialize)]
pub struct EmailSendRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub async fn email_send(
    State(state): State<AppState>,
    Json(request): Json<EmailSendRequest>,
) -> Json<Value> {
    let result = state
        .container
        .executor
        .execute(
            "send_email",
            json!({"to": request.to, "subject": request.subject, "body": request.body}),
        )
        .await;
    Json(serde_json::to_value(&result).unwrap_or(Value::Null))
}

pub async fn events_list(State(state): State<AppState>) -> impl IntoResponse {
    match state.container.events.upcoming(Utc::now(), 50).await {
        Ok(events) => (StatusCode::OK, Json(json!({"events": events}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

#[derive(Deserialize)]
pub struct SuggestRequest {
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: Option<String>,
}

pub async fn events_suggest(
    State(state): State<AppState>,
    Json(request): Json<SuggestRequest>,
) -> impl IntoResponse {
    let insert = state
        .container
        .events
        .insert(NewExtractedEvent {
            source: request.source.unwrap_or_else(|| "api".into()),
            title: request.title,
            start_at: request.start,
            end_at: request.end,
            timezone: "UTC".into(),
            location: None,
            attendees: vec![],
            status: EventStatus::Suggested,
            confidence: 1.0,
        })
        .await;
    match insert {
        Ok(id) => (StatusCode::OK, Json(json!({"id": id, "status": "suggested"}))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

pub async fn events_approve(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let events = &state.container.events;
    // Approval confirms the event and materialises the calendar entry.
    if let Err(e) = events.transition(id, EventStatus::Confirmed, "user").await {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": e.to_string()})),
        );
    }
    match events
        .materialise(id, "calendar", &Uuid::new_v4().to_string(), "primary")
        .await
    {
        Ok(calendar) => (StatusCode::OK, Json(json!({"calendar_event": calendar}))),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

pub async fn events_reject(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state
        .container
        .events
        .transition(id, EventStatus::Rejected, "user")
        .await
    {
        Ok(event) => (StatusCode::OK, Json(json!({"event": event}))),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

pub async fn calendly_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let settings = &state.container.settings;
    if let Some(ref key) = settings.calendly_webhook_key {
        let signature = headers
            .get("Calendly-Webhook-Signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !validate_signature(key, &body, signature) {
            warn!("calendly webhook signature mismatch");
            return StatusCode::UNAUTHORIZED;
        }
    }

    if let Ok(payload) = serde_json::from_slice::<Value>(&body) {
        info!(event = %payload["event"].as_str().unwrap_or("?"), "calendly webhook");
        // Booking payloads become suggested events for later approval.
        if let (Some(title), Some(start)) = (
            payload["payload"]["event_type"]["name"].as_str(),
            payload["payload"]["scheduled_event"]["start_time"]
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok()),
        ) {
            let events = state.container.events.clone();
            let title = title.to_string();
            let start = start.with_timezone(&Utc);
            tokio::spawn(async move {
                let _ = events
                    .insert(NewExtractedEvent {
                        source: "calendly".into(),
                        title,
                        start_at: start,
                        end_at: None,
                        timezone: "UTC".into(),
                        location: None,
                        attendees: vec![],
                        status: EventStatus::Suggested,
                        confidence: 1.0,
                    })
                    .await;
            });
        }
    }
    StatusCode::OK
}

#[derive(Deserialize)]
struct WhatsappDelivery {
    message_sid: String,
    from: String,
    #[serde(default)]
    to: String,
    body: String,
}

pub async fn whatsapp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let settings = &state.container.settings;
    if let Some(ref secret) = settings.whatsapp_app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !validate_signature(secret, &body, signature) {
            warn!("whatsapp webhook signature mismatch");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let delivery: WhatsappDelivery = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "unparseable whatsapp delivery");
            // Acknowledge anyway so the provider does not retry forever.
            return StatusCode::OK;
        }
    };

    let processor = state.container.conversations.clone();
    // Conversation identity derives from the sender.
    let conversation_id = delivery.from.clone();
    let msg = NewConversationMessage {
        message_sid: delivery.message_sid.clone(),
        conversation_id: conversation_id.clone(),
        from: delivery.from,
        to: delivery.to,
        body: delivery.body,
        received_at: Utc::now(),
    };
    match processor.ingest(msg).await {
        Ok(true) => {
            processor.analyse_async(conversation_id, delivery.message_sid);
        }
        Ok(false) => {}
        Err(e) => warn!(error = %e, "whatsapp ingest failed"),
    }
    StatusCode::OK
}
