//! Compiled state graph: immutable, supports invoke only.
//!
//! Runs from the first node; each node's returned [`Next`] plus the routing
//! table chooses the following node. Per-node wall time is collected into
//! [`StageTiming`]s so callers can expose stage latencies.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::AgentError;
use crate::graph::node::{Next, Node};
use crate::graph::state_graph::{ConditionalRouter, END};

/// Wall time of one node execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

pub(super) enum NextEntry<S> {
    Unconditional(String),
    Conditional(ConditionalRouter<S>),
}

/// Executable graph produced by `StateGraph::compile`.
pub struct CompiledStateGraph<S> {
    pub(super) nodes: HashMap<String, Arc<dyn Node<S>>>,
    pub(super) first_node_id: String,
    pub(super) next_map: HashMap<String, NextEntry<S>>,
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Runs the graph to completion, returning the final state and per-stage
    /// timings in execution order.
    pub async fn invoke(&self, state: S) -> Result<(S, Vec<StageTiming>), AgentError> {
        let mut state = state;
        let mut current = self.first_node_id.clone();
        let mut timings = Vec::new();

        loop {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::ExecutionFailed(format!("unknown node: {current}")))?
                .clone();

            let started = Instant::now();
            let (new_state, next) = node.run(state).await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!(stage = %current, elapsed_ms, "stage complete");
            timings.push(StageTiming {
                stage: current.clone(),
                elapsed_ms,
            });
            state = new_state;

            let target = match next {
                Next::End => break,
                Next::Node(id) => id,
                Next::Continue => match self.next_map.get(&current) {
                    Some(NextEntry::Unconditional(to)) => to.clone(),
                    Some(NextEntry::Conditional(router)) => {
                        let key = (router.router)(&state);
                        router.path_map.get(&key).cloned().unwrap_or(key)
                    }
                    None => break,
                },
            };

            if target == END {
                break;
            }
            current = target;
        }

        Ok((state, timings))
    }
}
