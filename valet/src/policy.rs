//! Policy rules applied before any tool runs: working-hours bounds for
//! scheduling, an explicit confirmation token for bulk destructive actions,
//! and a maximum scheduling lookahead.
//!
//! A refusal short-circuits the orchestrator straight to the response stage.

use chrono::{DateTime, Duration, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::{AgentState, Intent};
use crate::timeparse::mentioned_window;

/// Token the user must include to authorise bulk destructive actions.
pub const CONFIRMATION_TOKEN: &str = "CONFIRMAR";

static DESTRUCTIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(borra|borrando|elimina|eliminando|cancela todas|delete|remove|wipe)")
        .expect("static regex")
});
static BULK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(todas?|todos?|all|every|cada)").expect("static regex")
});

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    /// Inclusive start hour, exclusive end hour (UTC-naive local convention).
    pub working_hours: (u32, u32),
    pub max_lookahead_days: i64,
}

impl PolicyEngine {
    pub fn new(working_hours: (u32, u32), max_lookahead_days: i64) -> Self {
        Self {
            working_hours,
            max_lookahead_days,
        }
    }

    /// Evaluates the hard rules against the request. `Some(reason)` refuses.
    pub fn evaluate(&self, state: &AgentState, now: DateTime<Utc>) -> Option<String> {
        let query = &state.user_query;

        if DESTRUCTIVE_RE.is_match(query)
            && BULK_RE.is_match(query)
            && !query.contains(CONFIRMATION_TOKEN)
        {
            return Some(format!(
                "Esa acción borraría información de forma masiva. Por seguridad necesito que la \
                 repitas incluyendo la palabra {CONFIRMATION_TOKEN}."
            ));
        }

        let scheduling = matches!(state.intent, Some(Intent::Scheduling) | Some(Intent::Calendar));
        if scheduling {
            if let Some((start, _end)) = mentioned_window(query, now) {
                if start > now + Duration::days(self.max_lookahead_days) {
                    return Some(format!(
                        "Solo puedo agendar dentro de los próximos {} días.",
                        self.max_lookahead_days
                    ));
                }
                let hour = start.hour();
                // Windows spanning the whole day (agenda lookups) carry no
                // specific hour to validate.
                let whole_day = hour == 0 && start.minute() == 0;
                if matches!(state.intent, Some(Intent::Scheduling)) && !whole_day {
                    let (open, close) = self.working_hours;
                    if hour < open || hour >= close {
                        return Some(format!(
                            "Solo agendo dentro del horario laboral ({open}:00–{close}:00). \
                             ¿Te propongo otra hora?"
                        ));
                    }
                }
            }
        }

        None
    }
}
