//! Workflow engine.
//!
//! A [`WorkflowGraph`] is a DAG of [`WorkflowNode`]s, each a free-text task
//! for a remote agent. A walk runs the reachable nodes strictly in sequence
//! and stops at the first node whose agent asks for more input; the
//! [`OrchestratorAgent`] keeps one graph per conversation and resumes it.

pub mod graph;
pub mod node;
pub mod orchestrator;

pub use graph::{GraphState, WorkflowChunk, WorkflowGraph};
pub use node::{NodeState, PauseContext, WorkflowNode, PLANNER_KEY};
pub use orchestrator::{planned_tasks, OrchestratorAgent};
