//! Sequential head of the pipeline: intent, rag, conflict_check, policy and
//! specialist dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use session_event::SessionEvent;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::graph::{Next, Node};
use crate::intent::IntentClassifier;
use crate::message::Message;
use crate::pipeline::{toolset_for, EventSink};
use crate::policy::PolicyEngine;
use crate::retrieval::Retriever;
use crate::state::AgentState;
use crate::store::EventStore;
use crate::timeparse::mentioned_window;
use crate::tools::ToolRegistry;

fn emit(sink: &Option<EventSink>, event: SessionEvent) {
    if let Some(sink) = sink {
        sink(event);
    }
}

/// Classifies the query and picks the specialist.
pub struct IntentNode {
    classifier: Arc<IntentClassifier>,
}

impl IntentNode {
    pub fn new(classifier: Arc<IntentClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Node<AgentState> for IntentNode {
    fn id(&self) -> &str {
        "intent"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        let intent = self.classifier.classify(&state.user_query).await?;
        state.intent = Some(intent);
        state.agent_code = intent.agent_code();
        info!(intent = intent.as_str(), agent_code = state.agent_code.as_str(), "intent routed");
        Ok((state, Next::Continue))
    }
}

/// Populates `rag_context` and the initial citations.
pub struct RagNode {
    retriever: Arc<Retriever>,
    top_k: usize,
    min_similarity: f32,
    sink: Option<EventSink>,
}

impl RagNode {
    pub fn new(
        retriever: Arc<Retriever>,
        top_k: usize,
        min_similarity: f32,
        sink: Option<EventSink>,
    ) -> Self {
        Self {
            retriever,
            top_k,
            min_similarity,
            sink,
        }
    }
}

#[async_trait]
impl Node<AgentState> for RagNode {
    fn id(&self) -> &str {
        "rag"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        emit(&self.sink, SessionEvent::AgentRagStarted);
        let chunks = self
            .retriever
            .retrieve(&state.user_query, self.top_k, self.min_similarity, None)
            .await
            .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;
        let (context, citations) = Retriever::assemble_context(&chunks);
        emit(
            &self.sink,
            SessionEvent::AgentRagCompleted {
                chunks: chunks.len(),
            },
        );
        state.rag_context = context;
        state.citations = citations;
        Ok((state, Next::Continue))
    }
}

/// For calendaring intents, annotates events overlapping the mentioned window.
pub struct ConflictNode {
    events: Arc<EventStore>,
}

impl ConflictNode {
    pub fn new(events: Arc<EventStore>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Node<AgentState> for ConflictNode {
    fn id(&self) -> &str {
        "conflict_check"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        let calendaring = matches!(
            state.intent,
            Some(crate::state::Intent::Calendar) | Some(crate::state::Intent::Scheduling)
        );
        if calendaring {
            if let Some((start, end)) = mentioned_window(&state.user_query, Utc::now()) {
                state.conflicts = self
                    .events
                    .overlapping(start, end)
                    .await
                    .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;
                if !state.conflicts.is_empty() {
                    debug!(count = state.conflicts.len(), "overlapping events found");
                }
            }
        }
        Ok((state, Next::Continue))
    }
}

/// Applies the hard rules; a refusal jumps straight to `respond`.
pub struct PolicyNode {
    policy: PolicyEngine,
}

impl PolicyNode {
    pub fn new(policy: PolicyEngine) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Node<AgentState> for PolicyNode {
    fn id(&self) -> &str {
        "policy"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        if let Some(refusal) = self.policy.evaluate(&state, Utc::now()) {
            info!(refusal = %refusal, "policy refused the request");
            state.policy_refusal = Some(refusal);
        }
        Ok((state, Next::Continue))
    }
}

/// Selects the specialist's tool subset and composes the system prompt.
pub struct DispatchNode {
    registry: Arc<ToolRegistry>,
    dev_mode: bool,
    sink: Option<EventSink>,
}

impl DispatchNode {
    pub fn new(registry: Arc<ToolRegistry>, dev_mode: bool, sink: Option<EventSink>) -> Self {
        Self {
            registry,
            dev_mode,
            sink,
        }
    }

    fn capability_brief(agent_code: crate::state::AgentCode) -> &'static str {
        match agent_code {
            crate::state::AgentCode::Cal => {
                "Eres el especialista de calendario del asistente personal. Consultas y gestionas \
                 la agenda del usuario con las herramientas disponibles."
            }
            crate::state::AgentCode::Email => {
                "Eres el especialista de correo del asistente personal. Buscas, lees y envías \
                 emails con las herramientas disponibles."
            }
            crate::state::AgentCode::Sched => {
                "Eres el especialista de planificación del asistente personal. Agendas reuniones \
                 y gestionas reservas, evitando conflictos con eventos existentes."
            }
            crate::state::AgentCode::Comms => {
                "Eres el especialista de mensajería del asistente personal. Envías mensajes y \
                 procesas enlaces con las herramientas disponibles."
            }
            crate::state::AgentCode::Gen => {
                "Eres un asistente personal de coordinación. Responde con precisión usando las \
                 herramientas disponibles cuando haga falta."
            }
        }
    }

    fn system_prompt(&self, state: &AgentState) -> String {
        let mut prompt = String::from(Self::capability_brief(state.agent_code));
        prompt.push_str(&format!(
            "\nFecha y hora actual: {}.",
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        ));
        if !state.rag_context.is_empty() {
            prompt.push_str("\n\nContexto recuperado:\n");
            prompt.push_str(&state.rag_context);
        }
        if !state.conflicts.is_empty() {
            prompt.push_str("\n\nConflictos de agenda detectados en la franja mencionada:\n");
            for event in &state.conflicts {
                prompt.push_str(&format!(
                    "- {} ({} - {})\n",
                    event.title,
                    event.start_at.format("%d/%m/%Y %H:%M"),
                    event
                        .end_at
                        .map(|e| e.format("%H:%M").to_string())
                        .unwrap_or_else(|| "?".into())
                ));
            }
            prompt.push_str(
                "No crees un evento que se solape; informa del conflicto y propone una alternativa.",
            );
        }
        if self.dev_mode {
            prompt.push_str("\n\n[dev] Modo desarrollo activo; incluye detalles de depuración.");
        }
        prompt
    }
}

#[async_trait]
impl Node<AgentState> for DispatchNode {
    fn id(&self) -> &str {
        "dispatch"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        state.tools = self.registry.specs_for(toolset_for(state.agent_code));
        emit(
            &self.sink,
            SessionEvent::AgentToolsAvailable {
                tools: state.tools.iter().map(|t| t.name.clone()).collect(),
            },
        );

        let prompt = self.system_prompt(&state);
        match state.messages.first_mut() {
            Some(Message::System(existing)) => *existing = prompt,
            _ => state.messages.insert(0, Message::system(prompt)),
        }
        Ok((state, Next::Continue))
    }
}
