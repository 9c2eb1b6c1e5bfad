//! Conversation processor: webhook-driven ingest of chat messages, per-contact
//! context assembly, orchestrated analysis and batch reprocessing.
//!
//! Ingest persists idempotently (keyed on the provider's `message_sid`) and
//! returns immediately so the webhook handler can answer inside the provider's
//! delivery SLA; analysis runs asynchronously. Analyses for the same
//! conversation serialise on a per-conversation lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::exec::ToolExecutor;
use crate::message::Message;
use crate::pipeline::Orchestrator;
use crate::store::{MessageStore, NewConversationMessage};

/// How many trailing messages of a conversation feed the orchestrator.
const CONTEXT_WINDOW: usize = 10;

/// Tools whose successful execution marks the triggering message as having
/// produced an event.
const EVENT_TOOLS: &[&str] = &["create_calendar_event", "confirm_agenda_event"];

pub struct ConversationProcessor {
    store: Arc<MessageStore>,
    orchestrator: Arc<Orchestrator>,
    executor: Arc<ToolExecutor>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationProcessor {
    pub fn new(
        store: Arc<MessageStore>,
        orchestrator: Arc<Orchestrator>,
        executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            store,
            orchestrator,
            executor,
            locks: DashMap::new(),
        }
    }

    /// Persists one webhook delivery. Returns `true` when the message is new;
    /// a duplicate `message_sid` is a silent success and triggers no analysis.
    pub async fn ingest(&self, msg: NewConversationMessage) -> Result<bool, StoreError> {
        let inserted = self.store.insert_idempotent(msg.clone()).await?;
        if !inserted {
            debug!(sid = %msg.message_sid, "duplicate delivery ignored");
        }
        Ok(inserted)
    }

    /// Spawns asynchronous analysis for a conversation; the webhook response
    /// does not wait for it.
    pub fn analyse_async(self: &Arc<Self>, conversation_id: String, trigger_sid: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.analyse(&conversation_id, &trigger_sid).await {
                warn!(conversation = %conversation_id, error = %e, "analysis failed");
            }
        });
    }

    /// Analyses one conversation: the last N messages become the chat history,
    /// the orchestrator runs, a successful calendar tool marks the triggering
    /// message, and the reply goes back through the messenger tool.
    pub async fn analyse(
        &self,
        conversation_id: &str,
        trigger_sid: &str,
    ) -> Result<(), StoreError> {
        let lock = self
            .locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let recent = self.store.recent(conversation_id, CONTEXT_WINDOW).await?;
        let Some(trigger) = recent.iter().find(|m| m.message_sid == trigger_sid) else {
            return Err(StoreError::NotFound(format!("message {trigger_sid}")));
        };
        let reply_to = trigger.from.clone();

        // All but the latest message become history; the latest is the query.
        let Some((last, earlier)) = recent.split_last() else {
            return Ok(());
        };
        let history: Vec<Message> = earlier.iter().map(|m| Message::user(&m.body)).collect();

        let outcome = match self
            .orchestrator
            .run(&last.body, history, None, None)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(conversation = %conversation_id, error = %e, "orchestrator failed");
                self.store.mark_processed(trigger_sid, false, None).await?;
                return Ok(());
            }
        };

        let event_result = outcome
            .tool_results
            .iter()
            .find(|r| r.success && EVENT_TOOLS.contains(&r.tool_name.as_str()));
        let linked_event_id = event_result
            .and_then(|r| r.result.as_ref())
            .and_then(|v| v.get("event_id"))
            .and_then(|v| v.as_i64());

        self.store
            .mark_processed(trigger_sid, event_result.is_some(), linked_event_id)
            .await?;
        if let Some(id) = linked_event_id {
            info!(conversation = %conversation_id, event_id = id, "event extracted");
        }

        let reply = self
            .executor
            .execute(
                "send_whatsapp",
                serde_json::json!({"to": reply_to, "body": outcome.response}),
            )
            .await;
        if !reply.success {
            warn!(
                conversation = %conversation_id,
                error = ?reply.error_message,
                "reply delivery failed"
            );
        }
        Ok(())
    }

    /// Batch reprocessing: re-scans conversations with unprocessed messages
    /// (or all of them), reusing the same analysis path per conversation.
    /// Returns how many conversations were analysed.
    pub async fn reprocess(&self, all: bool) -> Result<usize, StoreError> {
        let conversations = self.store.conversations_to_process(all).await?;
        let mut analysed = 0usize;
        for conversation_id in conversations {
            let recent = self.store.recent(&conversation_id, CONTEXT_WINDOW).await?;
            let Some(last) = recent.last() else { continue };
            let sid = last.message_sid.clone();
            if let Err(e) = self.analyse(&conversation_id, &sid).await {
                warn!(conversation = %conversation_id, error = %e, "batch analysis failed");
                continue;
            }
            analysed += 1;
        }
        Ok(analysed)
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }
}
