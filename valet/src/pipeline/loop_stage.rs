//! The bounded reason-act loop (`plan` and `tool`) plus the final `respond`
//! stage.

use std::sync::Arc;

use async_trait::async_trait;
use session_event::SessionEvent;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::exec::ToolExecutor;
use crate::graph::{Next, Node};
use crate::humanize::humanise;
use crate::llm::{LlmClient, ToolChoiceMode};
use crate::message::Message;
use crate::pipeline::EventSink;
use crate::state::AgentState;

fn emit(sink: &Option<EventSink>, event: SessionEvent) {
    if let Some(sink) = sink {
        sink(event);
    }
}

/// One LLM call with function calling. Tool calls route to `tool`; a final
/// text routes to `respond` (conditional edges on this node's output).
pub struct PlanNode {
    llm: Arc<dyn LlmClient>,
    sink: Option<EventSink>,
}

impl PlanNode {
    pub fn new(llm: Arc<dyn LlmClient>, sink: Option<EventSink>) -> Self {
        Self { llm, sink }
    }
}

#[async_trait]
impl Node<AgentState> for PlanNode {
    fn id(&self) -> &str {
        "plan"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        emit(
            &self.sink,
            SessionEvent::AgentIterationStarted {
                iteration: state.iteration_count + 1,
            },
        );
        emit(
            &self.sink,
            SessionEvent::AgentLlmReasoning {
                agent_code: state.agent_code.as_str().to_string(),
            },
        );

        let reply = self
            .llm
            .chat(&state.messages, &state.tools, ToolChoiceMode::Auto)
            .await?;

        debug!(
            tool_calls = reply.tool_calls.len(),
            content_len = reply.content.len(),
            "plan complete"
        );
        state.messages.push(Message::assistant(reply.content));
        state.tool_calls = reply.tool_calls;
        Ok((state, Next::Continue))
    }
}

/// Executes the planned tool calls of one iteration concurrently, appends the
/// results to the history, and bumps the iteration counter.
pub struct ToolNode {
    executor: Arc<ToolExecutor>,
    sink: Option<EventSink>,
}

impl ToolNode {
    pub fn new(executor: Arc<ToolExecutor>, sink: Option<EventSink>) -> Self {
        Self { executor, sink }
    }
}

#[async_trait]
impl Node<AgentState> for ToolNode {
    fn id(&self) -> &str {
        "tool"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        let calls = std::mem::take(&mut state.tool_calls);
        for call in &calls {
            emit(
                &self.sink,
                SessionEvent::AgentToolExecuting {
                    tool_name: call.name.clone(),
                },
            );
        }

        // Independent calls within one iteration run concurrently; the join is
        // the barrier before the next plan round.
        let futures = calls.iter().map(|call| {
            let args: serde_json::Value = if call.arguments.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&call.arguments).unwrap_or_else(|e| {
                    debug!(error = %e, "tool arguments parse failed, using empty object");
                    serde_json::json!({})
                })
            };
            self.executor.execute(&call.name, args)
        });
        let results = futures::future::join_all(futures).await;

        for (call, result) in calls.iter().zip(results) {
            emit(
                &self.sink,
                SessionEvent::AgentToolCompleted {
                    tool_name: call.name.clone(),
                    success: result.success,
                },
            );
            let result = result.with_call_id(call.id.clone());
            let call_id = call
                .id
                .clone()
                .unwrap_or_else(|| format!("call-{}", call.name));
            state
                .messages
                .push(Message::tool(&call.name, call_id, result.message_content()));
            state.tool_results.push(result);
        }

        state.iteration_count += 1;
        Ok((state, Next::Continue))
    }
}

/// Finalises the response: policy refusals pass through untouched, everything
/// else goes through the humaniser; a loop cut at the iteration bound gets a
/// graceful truncation note.
pub struct RespondNode {
    max_iterations: u32,
    sink: Option<EventSink>,
}

impl RespondNode {
    pub fn new(max_iterations: u32, sink: Option<EventSink>) -> Self {
        Self {
            max_iterations,
            sink,
        }
    }
}

#[async_trait]
impl Node<AgentState> for RespondNode {
    fn id(&self) -> &str {
        "respond"
    }

    async fn run(&self, mut state: AgentState) -> Result<(AgentState, Next), AgentError> {
        let response = if let Some(refusal) = &state.policy_refusal {
            refusal.clone()
        } else {
            let raw = state.last_assistant_reply().unwrap_or_default();
            let mut text = humanise(&raw, &state.tool_calls, &state.tool_results);
            if text.is_empty() && state.iteration_count >= self.max_iterations {
                text = "No he podido completar todos los pasos a tiempo; esto es lo que tengo \
                        hasta ahora."
                    .to_string();
            } else if text.is_empty() {
                text = "No tengo una respuesta para eso ahora mismo.".to_string();
            }
            text
        };

        info!(response_len = response.len(), "response ready");
        emit(
            &self.sink,
            SessionEvent::AgentResponseReady {
                response: response.clone(),
            },
        );
        state.response = Some(response);
        Ok((state, Next::End))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[tokio::test]
    async fn plan_pushes_assistant_and_tool_calls() {
        let llm = Arc::new(MockLlm::new());
        llm.push_tool_call("list_agenda_events", r#"{"limit": 10}"#);
        let node = PlanNode::new(llm, None);
        let state = AgentState::seed("agenda", vec![Message::system("s")]);
        let (state, _) = node.run(state).await.unwrap();
        assert_eq!(state.tool_calls.len(), 1);
        assert!(matches!(state.messages.last(), Some(Message::Assistant(_))));
    }

    #[tokio::test]
    async fn respond_prefers_policy_refusal() {
        let node = RespondNode::new(5, None);
        let mut state = AgentState::seed("q", vec![]);
        state.policy_refusal = Some("No puedo hacer eso.".into());
        state.messages.push(Message::assistant("ignored"));
        let (state, next) = node.run(state).await.unwrap();
        assert_eq!(state.response.as_deref(), Some("No puedo hacer eso."));
        assert_eq!(next, Next::End);
    }

    #[tokio::test]
    async fn respond_notes_truncation_at_iteration_bound() {
        let node = RespondNode::new(2, None);
        let mut state = AgentState::seed("q", vec![]);
        state.iteration_count = 2;
        let (state, _) = node.run(state).await.unwrap();
        assert!(state.response.unwrap().contains("hasta ahora"));
    }
}
