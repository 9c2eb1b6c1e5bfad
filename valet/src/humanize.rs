//! Humanisation post-processing: deterministic rewrites applied to the final
//! LLM text before any user surface.
//!
//! Every rewrite is idempotent, so `humanise(humanise(x)) == humanise(x)`:
//! stripped spans cannot reappear, converted dates no longer match the ISO
//! pattern, and whitespace collapse is a fixed point.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::exec::ToolResult;
use crate::llm::strip_reasoning;
use crate::state::ToolCall;

/// Leading fragments dropped from the start of a reply.
const PREAMBLES: &[&str] = &[
    "Let me think",
    "Let me check",
    "We note that",
    "Déjame pensar",
    "Déjame ver",
    "Vamos a ver",
    "Okay, so",
];

static EVENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"event_id=(\d+)").expect("static regex"));
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static regex"));
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("static regex"));

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

fn drop_preambles(text: &str) -> String {
    let mut out = text.trim_start();
    loop {
        let mut changed = false;
        for preamble in PREAMBLES {
            if let Some(rest) = out.strip_prefix(preamble) {
                // Swallow the fragment up to its sentence break.
                let rest = rest.trim_start_matches([',', '.', ':', ';', ' ']);
                out = rest.trim_start();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    out.to_string()
}

fn long_date(text: &str) -> String {
    ISO_DATE_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let year = &caps[1];
            let month: usize = caps[2].parse().unwrap_or(0);
            let day: u32 = caps[3].parse().unwrap_or(0);
            if (1..=12).contains(&month) && (1..=31).contains(&day) {
                format!("{} de {} de {}", day, MONTHS_ES[month - 1], year)
            } else {
                caps[0].to_string()
            }
        })
        .to_string()
}

fn substitute_event_ids(text: &str, tool_results: &[ToolResult]) -> String {
    EVENT_ID_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let id = &caps[1];
            title_for_event(id, tool_results).unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

fn title_for_event(id: &str, tool_results: &[ToolResult]) -> Option<String> {
    let wanted: i64 = id.parse().ok()?;
    for result in tool_results {
        let Some(value) = &result.result else { continue };
        // Direct object with matching id, or a list under "events".
        if value.get("event_id").and_then(|v| v.as_i64()) == Some(wanted)
            || value.get("id").and_then(|v| v.as_i64()) == Some(wanted)
        {
            if let Some(title) = value.get("title").and_then(|v| v.as_str()) {
                return Some(title.to_string());
            }
        }
        if let Some(events) = value.get("events").and_then(|v| v.as_array()) {
            for event in events {
                if event.get("id").and_then(|v| v.as_i64()) == Some(wanted) {
                    if let Some(title) = event.get("title").and_then(|v| v.as_str()) {
                        return Some(title.to_string());
                    }
                }
            }
        }
        if let Some(list) = value.as_array() {
            for event in list {
                if event.get("id").and_then(|v| v.as_i64()) == Some(wanted) {
                    if let Some(title) = event.get("title").and_then(|v| v.as_str()) {
                        return Some(title.to_string());
                    }
                }
            }
        }
    }
    None
}

/// Full humanisation pass over the raw LLM reply.
pub fn humanise(raw: &str, _tool_calls: &[ToolCall], tool_results: &[ToolResult]) -> String {
    // Prefer the final tool's formatted body when it stands on its own.
    let body = tool_results
        .iter()
        .rev()
        .find(|r| r.success && r.formatted_text.is_some())
        .and_then(|r| r.formatted_text.clone());

    let mut text = strip_reasoning(raw);
    text = drop_preambles(&text);

    if let Some(formatted) = body {
        if text.trim().is_empty() || text.trim() == formatted.trim() {
            text = formatted;
        } else if !text.contains(formatted.trim()) {
            // Keep the LLM line as a short prefix over the formatted body.
            text = format!("{}\n\n{}", text.trim(), formatted);
        }
    }

    text = substitute_event_ids(&text, tool_results);
    text = long_date(&text);
    text = MULTI_SPACE_RE.replace_all(&text, " ").to_string();
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ToolResult, ToolVia};
    use serde_json::json;

    fn result_with(value: serde_json::Value, formatted: Option<&str>) -> ToolResult {
        ToolResult {
            tool_name: "list_agenda_events".into(),
            success: true,
            result: Some(value),
            formatted_text: formatted.map(str::to_string),
            error_kind: None,
            error_message: None,
            duration_ms: 1,
            via: ToolVia::Local,
            call_id: None,
        }
    }

    #[test]
    fn strips_reasoning_and_preambles() {
        let out = humanise("<think>plan</think>Let me think. Tienes una reunión.", &[], &[]);
        assert_eq!(out, "Tienes una reunión.");
    }

    #[test]
    fn formatted_text_replaces_empty_reply() {
        let results = vec![result_with(json!({}), Some("• Entrevista — 16/12/2025 11:00"))];
        let out = humanise("", &[], &results);
        assert_eq!(out, "• Entrevista — 16/12/2025 11:00");
    }

    #[test]
    fn llm_text_prefixes_formatted_body() {
        let results = vec![result_with(json!({}), Some("• Entrevista — 16/12/2025 11:00"))];
        let out = humanise("Esto es lo que tienes:", &[], &results);
        assert!(out.starts_with("Esto es lo que tienes:"));
        assert!(out.contains("Entrevista"));
    }

    #[test]
    fn event_ids_resolve_to_titles() {
        let results = vec![result_with(
            json!({"events": [{"id": 7, "title": "Entrevista Jhon Hernandez"}]}),
            None,
        )];
        let out = humanise("He confirmado event_id=7.", &[], &results);
        assert_eq!(out, "He confirmado Entrevista Jhon Hernandez.");
    }

    #[test]
    fn unresolvable_event_id_is_left_alone() {
        let out = humanise("Mira event_id=99.", &[], &[]);
        assert_eq!(out, "Mira event_id=99.");
    }

    #[test]
    fn iso_dates_become_long_spanish_form() {
        let out = humanise("La entrevista es el 2025-12-16.", &[], &[]);
        assert_eq!(out, "La entrevista es el 16 de diciembre de 2025.");
    }

    #[test]
    fn humanise_is_idempotent() {
        let results = vec![result_with(
            json!({"events": [{"id": 7, "title": "Entrevista"}]}),
            Some("• Entrevista — 16/12/2025"),
        )];
        let raw = "<think>x</think>Let me think. Tu evento event_id=7 es el 2025-12-16.   Listo.";
        let once = humanise(raw, &[], &results);
        let twice = humanise(&once, &[], &results);
        assert_eq!(once, twice);
    }

    #[test]
    fn whitespace_collapses() {
        let out = humanise("uno    dos\t\ttres", &[], &[]);
        assert_eq!(out, "uno dos tres");
    }
}
