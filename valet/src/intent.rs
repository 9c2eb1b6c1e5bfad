//! Two-tier intent classification: a cheap rule pass over a bilingual keyword
//! lexicon, with an LLM fallback when the rules abstain.

use std::sync::Arc;

use tracing::debug;

use crate::error::AgentError;
use crate::llm::{LlmClient, ToolChoiceMode};
use crate::message::Message;
use crate::state::Intent;

const CALENDAR_KEYWORDS: &[&str] = &[
    "agenda",
    "calendario",
    "calendar",
    "evento",
    "eventos",
    "cita",
    "citas",
    "appointment",
    "meeting",
];
const SCHEDULING_KEYWORDS: &[&str] = &[
    "agendar",
    "agendarme",
    "reserva",
    "reservar",
    "reunión",
    "reunion",
    "schedule",
    "book",
    "calendly",
    "disponibilidad",
    "availability",
];
const EMAIL_KEYWORDS: &[&str] = &[
    "email",
    "correo",
    "correos",
    "mail",
    "inbox",
    "bandeja",
    "asunto",
    "subject",
];
const COMMS_KEYWORDS: &[&str] = &[
    "whatsapp",
    "mensaje",
    "mensajes",
    "message",
    "chat",
    "escribe a",
    "text",
];

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Rule pass: first matching lexicon wins, scheduling before calendar so
    /// "agendar una reunión" does not collapse into a plain agenda lookup.
    /// Returns `None` when no lexicon matches (abstain).
    pub fn rule_classify(query: &str) -> Option<Intent> {
        let lower = query.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
        if matches(SCHEDULING_KEYWORDS) {
            return Some(Intent::Scheduling);
        }
        if matches(CALENDAR_KEYWORDS) {
            return Some(Intent::Calendar);
        }
        if matches(EMAIL_KEYWORDS) {
            return Some(Intent::Email);
        }
        if matches(COMMS_KEYWORDS) {
            return Some(Intent::Comms);
        }
        None
    }

    /// Full classification: rules first, LLM fallback on abstain. An
    /// unparseable LLM answer degrades to `General`, never an error.
    pub async fn classify(&self, query: &str) -> Result<Intent, AgentError> {
        if let Some(intent) = Self::rule_classify(query) {
            debug!(intent = intent.as_str(), "intent from rules");
            return Ok(intent);
        }

        let prompt = format!(
            "Classify this request into exactly one of: CALENDAR, EMAIL, SCHEDULING, COMMS, GENERAL.\n\
             Answer with the single word only.\n\nRequest: {query}"
        );
        let reply = self
            .llm
            .chat(
                &[Message::system("You classify user requests."), Message::user(prompt)],
                &[],
                ToolChoiceMode::None,
            )
            .await?;

        let intent = match reply.content.trim().to_uppercase().as_str() {
            s if s.contains("CALENDAR") => Intent::Calendar,
            s if s.contains("SCHEDULING") => Intent::Scheduling,
            s if s.contains("EMAIL") => Intent::Email,
            s if s.contains("COMMS") => Intent::Comms,
            _ => Intent::General,
        };
        debug!(intent = intent.as_str(), "intent from llm fallback");
        Ok(intent)
    }
}
