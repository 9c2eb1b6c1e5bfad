//! Graph builder: `add_node`, `add_edge(from, to)` with `START`/`END`
//! sentinels, `add_conditional_edges` for state-based routing, then `compile`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::graph::compiled::{CompiledStateGraph, NextEntry};
use crate::graph::node::Node;

/// Sentinel for graph entry: `add_edge(START, first_node)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: `add_edge(last_node, END)`.
pub const END: &str = "__end__";

/// Router function for conditional edges: `(state) -> key`, where the key is
/// resolved through the path map (or used as a node id directly).
pub type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("no edge from START")]
    MissingStart,
    #[error("unknown node in edge: {0}")]
    UnknownNode(String),
    #[error("node {0} has both an edge and conditional edges")]
    ConflictingEdges(String),
    #[error("node {0} has more than one outgoing edge")]
    DuplicateEdge(String),
    #[error("conditional target {0} is not a node")]
    UnknownConditionalTarget(String),
}

pub(super) struct ConditionalRouter<S> {
    pub(super) router: RouterFn<S>,
    pub(super) path_map: HashMap<String, String>,
}

/// Builder for a stage graph over state `S`.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: Vec<(String, String)>,
    conditional: HashMap<String, ConditionalRouter<S>>,
}

impl<S> Default for StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional: HashMap::new(),
        }
    }

    /// Adds a node; same id replaces.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds an edge. Use `START`/`END` for entry and exit. A node may have one
    /// outgoing edge or conditional edges, not both.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Adds conditional edges from `source`: after the node runs, `router` is
    /// called with the updated state; its key is looked up in `path_map` (a
    /// missing key is used as the node id directly, `END` included).
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        router: RouterFn<S>,
        path_map: HashMap<String, String>,
    ) -> &mut Self {
        self.conditional
            .insert(source.into(), ConditionalRouter { router, path_map });
        self
    }

    /// Validates the wiring and produces an executable graph.
    pub fn compile(self) -> Result<CompiledStateGraph<S>, CompilationError> {
        let mut first: Option<String> = None;
        let mut next_map: HashMap<String, NextEntry<S>> = HashMap::new();

        for (from, to) in &self.edges {
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::UnknownNode(to.clone()));
            }
            if from == START {
                first = Some(to.clone());
                continue;
            }
            if !self.nodes.contains_key(from) {
                return Err(CompilationError::UnknownNode(from.clone()));
            }
            if self.conditional.contains_key(from) {
                return Err(CompilationError::ConflictingEdges(from.clone()));
            }
            if next_map
                .insert(from.clone(), NextEntry::Unconditional(to.clone()))
                .is_some()
            {
                return Err(CompilationError::DuplicateEdge(from.clone()));
            }
        }

        for (source, router) in self.conditional {
            if !self.nodes.contains_key(&source) {
                return Err(CompilationError::UnknownNode(source));
            }
            for target in router.path_map.values() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(CompilationError::UnknownConditionalTarget(target.clone()));
                }
            }
            next_map.insert(source, NextEntry::Conditional(router));
        }

        let first = first.ok_or(CompilationError::MissingStart)?;
        Ok(CompiledStateGraph {
            nodes: self.nodes,
            first_node_id: first,
            next_map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::graph::Next;
    use async_trait::async_trait;

    struct Push(&'static str);

    #[async_trait]
    impl Node<Vec<String>> for Push {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, mut state: Vec<String>) -> Result<(Vec<String>, Next), AgentError> {
            state.push(self.0.to_string());
            Ok((state, Next::Continue))
        }
    }

    #[tokio::test]
    async fn linear_chain_runs_in_order() {
        let mut g = StateGraph::new();
        g.add_node("a", Arc::new(Push("a")))
            .add_node("b", Arc::new(Push("b")))
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END);
        let compiled = g.compile().unwrap();
        let (state, timings) = compiled.invoke(vec![]).await.unwrap();
        assert_eq!(state, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].stage, "a");
    }

    #[tokio::test]
    async fn conditional_routes_by_state() {
        let mut g = StateGraph::new();
        g.add_node("probe", Arc::new(Push("probe")))
            .add_node("long", Arc::new(Push("long")))
            .add_edge(START, "probe")
            .add_edge("long", END)
            .add_conditional_edges(
                "probe",
                Arc::new(|s: &Vec<String>| {
                    if s.len() > 1 { "done".into() } else { "more".into() }
                }),
                [
                    ("more".to_string(), "long".to_string()),
                    ("done".to_string(), END.to_string()),
                ]
                .into_iter()
                .collect(),
            );
        let compiled = g.compile().unwrap();
        let (state, _) = compiled.invoke(vec![]).await.unwrap();
        assert_eq!(state, vec!["probe".to_string(), "long".to_string()]);
    }

    #[test]
    fn compile_rejects_unknown_edge_target() {
        let mut g: StateGraph<Vec<String>> = StateGraph::new();
        g.add_node("a", Arc::new(Push("a")))
            .add_edge(START, "a")
            .add_edge("a", "ghost");
        assert!(matches!(
            g.compile(),
            Err(CompilationError::UnknownNode(n)) if n == "ghost"
        ));
    }

    #[test]
    fn compile_requires_start_edge() {
        let mut g: StateGraph<Vec<String>> = StateGraph::new();
        g.add_node("a", Arc::new(Push("a"))).add_edge("a", END);
        assert!(matches!(g.compile(), Err(CompilationError::MissingStart)));
    }
}
