//! Graph node trait: one stage in a state graph.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::AgentError;

/// Routing decision returned by a node alongside its updated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Follow the node's outgoing edge (or conditional router).
    Continue,
    /// Jump to a named node, bypassing the declared edges.
    Node(String),
    /// Stop the graph.
    End,
}

/// One stage in a graph: state in, (state out, routing) out.
///
/// The runner uses the returned [`Next`] together with the declared edges to
/// choose the following node. A node must not mutate state after returning it.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id (e.g. `"intent"`, `"plan"`). Unique within a graph.
    fn id(&self) -> &str;

    /// One step: state in, (state out, next step).
    async fn run(&self, state: S) -> Result<(S, Next), AgentError>;
}
