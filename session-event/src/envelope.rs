//! Envelope: stamps each event with `session_id`, a monotonically increasing
//! `seq` and an RFC3339 `ts`. Existing keys in the event payload are never
//! overwritten.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::event::SessionEvent;

/// Per-session envelope state. One instance per voice session; `wrap` advances
/// the sequence number.
#[derive(Debug)]
pub struct Envelope {
    session_id: String,
    next_seq: u64,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            next_seq: 1,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Serialises the event and injects `session_id`, `seq` and `ts`.
    pub fn wrap(&mut self, event: &SessionEvent) -> Result<Value, serde_json::Error> {
        let mut value = event.to_value()?;
        if let Some(obj) = value.as_object_mut() {
            obj.entry("session_id")
                .or_insert_with(|| Value::String(self.session_id.clone()));
            obj.entry("seq")
                .or_insert_with(|| Value::Number(self.next_seq.into()));
            obj.entry("ts").or_insert_with(|| {
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            });
        }
        self.next_seq += 1;
        Ok(value)
    }
}
