//! State graph: nodes plus explicit and conditional edges.
//!
//! The orchestrator pipeline is wired as a directed graph over one state type:
//! each stage is a [`Node`], `add_edge` defines the forward chain and
//! `add_conditional_edges` routes the `policy -> respond` short-circuit and the
//! bounded `plan -> tool -> plan` loop. `compile` validates the wiring and
//! produces a [`CompiledStateGraph`] that records per-node timings as it runs.

mod compiled;
mod node;
mod state_graph;

pub use compiled::{CompiledStateGraph, StageTiming};
pub use node::{Next, Node};
pub use state_graph::{CompilationError, StateGraph, END, START};
