//! Orchestrator pipeline: the fixed stage graph
//! `intent -> rag -> conflict_check -> policy -> dispatch -> plan -> tool ->
//! (plan | respond)` over [`AgentState`], with the bounded reason-act loop
//! around `plan -> tool`.

mod loop_stage;
mod orchestrator;
mod stages;

pub use loop_stage::{PlanNode, RespondNode, ToolNode};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use stages::{ConflictNode, DispatchNode, IntentNode, PolicyNode, RagNode};

use std::sync::Arc;

use session_event::SessionEvent;

use crate::state::AgentCode;

/// Callback for progress events (voice sessions feed these to the client).
pub type EventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Tool subset offered to each specialist. Tools outside the set are withheld
/// from the LLM entirely.
pub fn toolset_for(agent_code: AgentCode) -> &'static [&'static str] {
    match agent_code {
        AgentCode::Cal => &[
            "list_agenda_events",
            "create_calendar_event",
            "confirm_agenda_event",
        ],
        AgentCode::Email => &["search_emails", "read_email", "send_email"],
        AgentCode::Sched => &[
            "list_calendly_events",
            "create_calendly_event",
            "ingest_calendly_events",
            "list_agenda_events",
            "create_calendar_event",
        ],
        AgentCode::Comms => &["send_whatsapp", "extract_urls", "scrape_web_content"],
        AgentCode::Gen => &[
            "list_agenda_events",
            "create_calendar_event",
            "confirm_agenda_event",
            "search_emails",
            "read_email",
            "send_email",
            "send_whatsapp",
            "list_calendly_events",
            "create_calendly_event",
            "ingest_calendly_events",
            "extract_urls",
            "scrape_web_content",
            "scrape_news_for_events",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specialists_withhold_unrelated_tools() {
        let cal = toolset_for(AgentCode::Cal);
        assert!(cal.contains(&"list_agenda_events"));
        assert!(!cal.contains(&"send_email"));

        let email = toolset_for(AgentCode::Email);
        assert!(email.contains(&"send_email"));
        assert!(!email.contains(&"send_whatsapp"));
    }

    #[test]
    fn generalist_sees_everything() {
        let gen = toolset_for(AgentCode::Gen);
        for set in [
            toolset_for(AgentCode::Cal),
            toolset_for(AgentCode::Email),
            toolset_for(AgentCode::Comms),
        ] {
            for tool in set {
                assert!(gen.contains(tool), "GEN missing {tool}");
            }
        }
    }
}
