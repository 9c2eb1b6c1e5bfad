//! Orchestrator runner: wires the stage graph, applies the request deadline
//! and cancellation, and returns the final outcome with per-stage timings.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::AgentError;
use crate::exec::{ToolExecutor, ToolResult};
use crate::graph::{StageTiming, StateGraph, END, START};
use crate::intent::IntentClassifier;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::pipeline::{
    ConflictNode, DispatchNode, EventSink, IntentNode, PlanNode, PolicyNode, RagNode, RespondNode,
    ToolNode,
};
use crate::policy::PolicyEngine;
use crate::retrieval::Retriever;
use crate::settings::Settings;
use crate::state::{AgentCode, AgentState, Intent};
use crate::store::{AuditLog, EventStore};
use crate::tools::ToolRegistry;

/// Final result of one orchestrated request.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub response: String,
    pub citations: Vec<String>,
    pub tool_results: Vec<ToolResult>,
    pub stage_timings: Vec<StageTiming>,
    pub intent: Option<Intent>,
    pub agent_code: AgentCode,
}

pub struct Orchestrator {
    classifier: Arc<IntentClassifier>,
    retriever: Arc<Retriever>,
    events: Arc<EventStore>,
    policy: PolicyEngine,
    registry: Arc<ToolRegistry>,
    executor: Arc<ToolExecutor>,
    llm: Arc<dyn LlmClient>,
    metrics: Arc<Metrics>,
    audit: Arc<dyn AuditLog>,
    settings: Settings,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: Arc<IntentClassifier>,
        retriever: Arc<Retriever>,
        events: Arc<EventStore>,
        policy: PolicyEngine,
        registry: Arc<ToolRegistry>,
        executor: Arc<ToolExecutor>,
        llm: Arc<dyn LlmClient>,
        metrics: Arc<Metrics>,
        audit: Arc<dyn AuditLog>,
        settings: Settings,
    ) -> Self {
        Self {
            classifier,
            retriever,
            events,
            policy,
            registry,
            executor,
            llm,
            metrics,
            audit,
            settings,
        }
    }

    fn build_graph(
        &self,
        sink: Option<EventSink>,
    ) -> Result<crate::graph::CompiledStateGraph<AgentState>, AgentError> {
        let max_iterations = self.settings.max_iterations;
        let mut graph = StateGraph::<AgentState>::new();
        graph
            .add_node("intent", Arc::new(IntentNode::new(Arc::clone(&self.classifier))))
            .add_node(
                "rag",
                Arc::new(RagNode::new(
                    Arc::clone(&self.retriever),
                    crate::retrieval::DEFAULT_TOP_K,
                    0.0,
                    sink.clone(),
                )),
            )
            .add_node(
                "conflict_check",
                Arc::new(ConflictNode::new(Arc::clone(&self.events))),
            )
            .add_node("policy", Arc::new(PolicyNode::new(self.policy.clone())))
            .add_node(
                "dispatch",
                Arc::new(DispatchNode::new(
                    Arc::clone(&self.registry),
                    self.settings.dev_mode,
                    sink.clone(),
                )),
            )
            .add_node("plan", Arc::new(PlanNode::new(Arc::clone(&self.llm), sink.clone())))
            .add_node(
                "tool",
                Arc::new(ToolNode::new(Arc::clone(&self.executor), sink.clone())),
            )
            .add_node("respond", Arc::new(RespondNode::new(max_iterations, sink)))
            .add_edge(START, "intent")
            .add_edge("intent", "rag")
            .add_edge("rag", "conflict_check")
            .add_edge("conflict_check", "policy")
            .add_edge("respond", END)
            .add_conditional_edges(
                "policy",
                Arc::new(|s: &AgentState| {
                    if s.policy_refusal.is_some() {
                        "refused".to_string()
                    } else {
                        "allowed".to_string()
                    }
                }),
                HashMap::from([
                    ("refused".to_string(), "respond".to_string()),
                    ("allowed".to_string(), "dispatch".to_string()),
                ]),
            )
            .add_edge("dispatch", "plan")
            .add_conditional_edges(
                "plan",
                Arc::new(|s: &AgentState| {
                    if s.tool_calls.is_empty() {
                        "final".to_string()
                    } else {
                        "tools".to_string()
                    }
                }),
                HashMap::from([
                    ("tools".to_string(), "tool".to_string()),
                    ("final".to_string(), "respond".to_string()),
                ]),
            )
            .add_conditional_edges(
                "tool",
                Arc::new(move |s: &AgentState| {
                    if s.iteration_count >= max_iterations {
                        "stop".to_string()
                    } else {
                        "again".to_string()
                    }
                }),
                HashMap::from([
                    ("stop".to_string(), "respond".to_string()),
                    ("again".to_string(), "plan".to_string()),
                ]),
            );

        graph
            .compile()
            .map_err(|e| AgentError::Config(e.to_string()))
    }

    /// Runs one request to completion under the configured deadline. An
    /// `interrupt` on the token cancels all in-flight work.
    pub async fn run(
        &self,
        query: &str,
        chat_history: Vec<Message>,
        sink: Option<EventSink>,
        cancel: Option<CancellationToken>,
    ) -> Result<RunOutcome, AgentError> {
        let graph = self.build_graph(sink)?;
        let state = AgentState::seed(query, chat_history);
        let cancel = cancel.unwrap_or_default();

        let run = graph.invoke(state);
        let (final_state, timings) = tokio::select! {
            result = run => match result {
                Ok(output) => output,
                Err(e) => {
                    let _ = self
                        .audit
                        .record(
                            "agent_error",
                            "agent",
                            serde_json::json!({"query": query, "error": e.to_string()}),
                        )
                        .await;
                    return Err(e);
                }
            },
            _ = cancel.cancelled() => {
                warn!("request cancelled by interrupt");
                return Err(AgentError::Cancelled("interrupted".into()));
            }
            _ = tokio::time::sleep(self.settings.request_deadline) => {
                warn!(deadline = ?self.settings.request_deadline, "request deadline reached");
                return Err(AgentError::Cancelled("deadline exceeded".into()));
            }
        };

        if let Some(ref refusal) = final_state.policy_refusal {
            let _ = self
                .audit
                .record(
                    "policy_refusal",
                    "agent",
                    serde_json::json!({"query": query, "reason": refusal}),
                )
                .await;
        }

        for timing in &timings {
            self.metrics
                .observe_ms(&format!("stage.{}.latency", timing.stage), timing.elapsed_ms);
        }

        debug_assert!(final_state.iteration_count <= self.settings.max_iterations);
        Ok(RunOutcome {
            response: final_state
                .response
                .clone()
                .unwrap_or_else(|| "No tengo una respuesta para eso ahora mismo.".to_string()),
            citations: final_state.citations.clone(),
            tool_results: final_state.tool_results.clone(),
            stage_timings: timings,
            intent: final_state.intent,
            agent_code: final_state.agent_code,
        })
    }
}
