//! Deterministic stub responses for mock mode: same tool + same arguments
//! always produce the same payload, so tests and demos are reproducible
//! without any external collaborator.

use serde_json::{json, Value};

/// Canned response for one tool call in mock mode.
pub fn mock_response(tool_name: &str, args: &Value) -> Value {
    match tool_name {
        "list_agenda_events" => json!({
            "events": [{
                "id": 1,
                "title": "Entrevista Jhon Hernandez",
                "start_at": "2025-12-16T10:00:00Z",
                "end_at": "2025-12-16T11:00:00Z",
                "status": "confirmed"
            }]
        }),
        "create_calendar_event" => json!({
            "event_id": 1,
            "provider_event_id": "mock-provider-event-1",
            "title": args.get("title").cloned().unwrap_or(json!("Evento")),
        }),
        "confirm_agenda_event" => json!({
            "event_id": args.get("event_id").cloned().unwrap_or(json!(1)),
            "status": "confirmed"
        }),
        "search_emails" => json!({
            "hits": [{
                "id": "mock-mail-1",
                "from": "jhon@example.com",
                "subject": "Entrevista",
                "snippet": "¿Nos vemos el martes a las 11?"
            }]
        }),
        "read_email" => json!({
            "headers": {"From": "jhon@example.com", "Subject": "Entrevista"},
            "body": "¿Nos vemos el martes a las 11?",
            "attachments": []
        }),
        "send_email" => json!({"id": "mock-mail-send-1", "accepted": true}),
        "send_whatsapp" => json!({"id": "mock-wa-1", "accepted": true}),
        "list_calendly_events" => json!({"events": []}),
        "create_calendly_event" => json!({
            "id": "mock-cal-1",
            "title": args.get("title").cloned().unwrap_or(json!("Reserva")),
        }),
        "ingest_calendly_events" => json!({"ingested": 0}),
        "extract_urls" => json!({"urls": []}),
        "scrape_web_content" => json!({
            "url": args.get("url").cloned().unwrap_or(json!("https://example.com")),
            "title": "Example",
            "description": null
        }),
        "scrape_news_for_events" => json!({"candidates": []}),
        _ => json!({"ok": true, "tool": tool_name}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_output() {
        let args = json!({"title": "Reunión"});
        assert_eq!(
            mock_response("create_calendar_event", &args),
            mock_response("create_calendar_event", &args)
        );
    }

    #[test]
    fn unknown_tool_gets_generic_ok() {
        let v = mock_response("never_heard_of_it", &json!({}));
        assert_eq!(v["ok"], true);
    }
}
