use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use conduit_core::error::{ConduitError, Result};
use conduit_core::protocol::{Part, StreamResponse};
use conduit_core::traits::{AgentResolver, AgentTransport};

use crate::graph::{GraphState, WorkflowChunk, WorkflowGraph};
use crate::node::WorkflowNode;

type Session = Arc<Mutex<WorkflowGraph>>;

/// Drives one workflow graph per conversation.
///
/// The first query of a session runs the planner; tasks the planner emits are
/// appended as a chain and walked. A query on a paused session answers the
/// paused node and resumes the walk from it. Sessions live only while paused.
pub struct OrchestratorAgent {
    resolver: Arc<dyn AgentResolver>,
    transport: Arc<dyn AgentTransport>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl OrchestratorAgent {
    pub fn new(resolver: Arc<dyn AgentResolver>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            resolver,
            transport,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one user query for `context_id`, handing every chunk to `sink`.
    ///
    /// Only a session that ends PAUSED is kept; a completed or failed walk
    /// drops it, so the next query on that context plans from scratch.
    pub async fn stream<F>(&self, query: &str, context_id: &str, sink: F) -> Result<GraphState>
    where
        F: FnMut(WorkflowChunk) + Send,
    {
        let query = query.trim();
        if query.is_empty() {
            return Err(ConduitError::EmptyQuery);
        }
        info!(context_id = %context_id, "Running orchestrator stream");

        let session = self.session(context_id).await;
        let mut graph = session.lock().await;
        let result = self.walk(&mut graph, query, context_id, sink).await;

        if !matches!(result, Ok(GraphState::Paused)) {
            let mut sessions = self.sessions.lock().await;
            // A newer session may already sit under this id
            if sessions.get(context_id).is_some_and(|s| Arc::ptr_eq(s, &session)) {
                sessions.remove(context_id);
                debug!(context_id = %context_id, "Session closed");
            }
        }
        result
    }

    async fn walk<F>(&self, graph: &mut WorkflowGraph, query: &str, context_id: &str, mut sink: F) -> Result<GraphState>
    where
        F: FnMut(WorkflowChunk) + Send,
    {
        let start = if graph.state() == GraphState::Paused {
            let paused = graph.paused_node_id().map(str::to_string);
            if let Some(id) = paused.as_deref() {
                if let Some(node) = graph.node_mut(id) {
                    node.set_task(query);
                }
            }
            paused
        } else {
            // Anything not paused is spent; plan the new query afresh
            *graph = WorkflowGraph::new();
            Some(graph.add_node(WorkflowNode::planner(query)))
        };

        let planner_id = graph.nodes().find(|n| n.is_planner()).map(|n| n.id().to_string());
        let mut planned: Vec<String> = Vec::new();

        let state = graph
            .execute(
                self.resolver.as_ref(),
                self.transport.as_ref(),
                start.as_deref(),
                |chunk| {
                    if planner_id.as_deref() == Some(chunk.node_id.as_str()) {
                        planned.extend(planned_tasks(&chunk.response));
                    }
                    sink(chunk)
                },
            )
            .await?;

        let expandable = planner_id
            .as_deref()
            .is_some_and(|id| graph.successors(id).is_empty());
        if state != GraphState::Completed || planned.is_empty() || !expandable {
            return Ok(state);
        }

        info!(context_id = %context_id, tasks = planned.len(), "Expanding plan");
        let mut first = None;
        for task in planned {
            let id = graph.add_after_end(WorkflowNode::new(task))?;
            first.get_or_insert(id);
        }

        graph
            .execute(
                self.resolver.as_ref(),
                self.transport.as_ref(),
                first.as_deref(),
                sink,
            )
            .await
    }

    /// Number of sessions held, i.e. walks waiting for an answer.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Graph state of a held session. Completed and failed sessions are not held.
    pub async fn session_state(&self, context_id: &str) -> Option<GraphState> {
        let session = self.sessions.lock().await.get(context_id).cloned()?;
        let graph = session.lock().await;
        Some(graph.state())
    }

    /// Forget a session. Returns whether it existed.
    pub async fn reset(&self, context_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(context_id).is_some();
        if removed {
            debug!(context_id = %context_id, "Session reset");
        }
        removed
    }

    async fn session(&self, context_id: &str) -> Session {
        self.sessions
            .lock()
            .await
            .entry(context_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(WorkflowGraph::new())))
            .clone()
    }
}

/// Tasks listed in the data parts of a planner artifact.
///
/// Accepts `{"tasks": ["..."]}` or `{"tasks": [{"description": "..."}]}`.
pub fn planned_tasks(response: &StreamResponse) -> Vec<String> {
    let parts = match response {
        StreamResponse::ArtifactUpdate(ev) => &ev.artifact.parts,
        _ => return Vec::new(),
    };

    parts
        .iter()
        .filter_map(Part::as_data)
        .filter_map(|data| data.get("tasks").and_then(Value::as_array))
        .flatten()
        .filter_map(|task| match task {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("description").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_test_utils::{
        completed, data_artifact, input_required, plan_artifact, text_artifact, working, ScriptedResolver,
        ScriptedTransport,
    };

    fn agent(transport: &Arc<ScriptedTransport>) -> OrchestratorAgent {
        let resolver = ScriptedResolver::new()
            .with_agent("flight", "air")
            .with_agent("hotel", "hotel");
        OrchestratorAgent::new(Arc::new(resolver), transport.clone())
    }

    #[test]
    fn test_planned_tasks_shapes() {
        let strings = plan_artifact("t", "c", &["Book a flight", " ", "Book a hotel"]);
        assert_eq!(planned_tasks(&strings), vec!["Book a flight", "Book a hotel"]);

        let objects = data_artifact(
            "t",
            "c",
            serde_json::json!({"tasks": [{"id": 1, "description": "Rent a car"}, {"id": 2}]}),
        );
        assert_eq!(planned_tasks(&objects), vec!["Rent a car"]);

        assert!(planned_tasks(&text_artifact("t", "c", "no plan")).is_empty());
        assert!(planned_tasks(&completed("t", "c")).is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = agent(&transport);
        let result = agent.stream("   ", "ctx", |_| {}).await;
        assert!(matches!(result, Err(ConduitError::EmptyQuery)));
        assert!(agent.session_state("ctx").await.is_none());
    }

    #[tokio::test]
    async fn test_planner_expansion() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "planner",
            vec![
                working("tp", "cp", "planning"),
                plan_artifact("tp", "cp", &["Book a flight to London", "Book a hotel in London"]),
                completed("tp", "cp"),
            ],
        );
        transport.script("air", vec![text_artifact("ta", "ca", "BA 117"), completed("ta", "ca")]);
        transport.script("hotel", vec![completed("th", "ch")]);

        let agent = agent(&transport);
        let mut chunks = Vec::new();
        let state = agent
            .stream("Plan a trip to London", "ctx", |c| chunks.push(c))
            .await
            .unwrap();

        assert_eq!(state, GraphState::Completed);
        assert_eq!(chunks.len(), 6);
        let agents: Vec<String> = transport.sent().into_iter().map(|(a, _)| a).collect();
        assert_eq!(agents, vec!["planner", "air", "hotel"]);
        assert_eq!(transport.sent_to("planner")[0].text(), "Plan a trip to London");
        assert_eq!(transport.sent_to("air")[0].text(), "Book a flight to London");
        // Completed walks are not held
        assert!(agent.session_state("ctx").await.is_none());
    }

    #[tokio::test]
    async fn test_paused_session_resumes_with_answer() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("planner", vec![plan_artifact("tp", "cp", &["Book a flight"]), completed("tp", "cp")]);
        transport.script("air", vec![input_required("ta", "ca", "Which date?")]);

        let agent = agent(&transport);
        let state = agent.stream("Trip please", "ctx", |_| {}).await.unwrap();
        assert_eq!(state, GraphState::Paused);
        assert_eq!(agent.session_state("ctx").await, Some(GraphState::Paused));

        transport.script("air", vec![completed("ta", "ca")]);
        let state = agent.stream("Next Friday", "ctx", |_| {}).await.unwrap();
        assert_eq!(state, GraphState::Completed);
        assert_eq!(agent.session_count().await, 0);

        // Planner ran once; the answer went to the paused remote task
        assert_eq!(transport.sent_to("planner").len(), 1);
        let answer = &transport.sent_to("air")[1];
        assert_eq!(answer.text(), "Next Friday");
        assert_eq!(answer.context_id.as_deref(), Some("ca"));
        assert_eq!(answer.task_id.as_deref(), Some("ta"));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("planner", vec![input_required("t1", "c1", "Where to?")]);
        transport.script("planner", vec![completed("t2", "c2")]);

        let agent = agent(&transport);
        assert_eq!(agent.stream("trip", "one", |_| {}).await.unwrap(), GraphState::Paused);
        assert_eq!(agent.stream("trip", "two", |_| {}).await.unwrap(), GraphState::Completed);

        // No planned tasks: nothing to expand
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(agent.session_state("one").await, Some(GraphState::Paused));
        assert!(agent.session_state("two").await.is_none());
        assert!(agent.reset("one").await);
        assert!(!agent.reset("one").await);
        assert!(agent.session_state("one").await.is_none());
    }

    #[tokio::test]
    async fn test_completed_session_plans_new_query_afresh() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("planner", vec![plan_artifact("tp", "cp", &["Book a flight"]), completed("tp", "cp")]);
        transport.script("air", vec![completed("ta", "ca")]);

        let agent = agent(&transport);
        agent.stream("first", "ctx", |_| {}).await.unwrap();

        transport.script("planner", vec![plan_artifact("tp", "cp", &["Book a hotel"]), completed("tp", "cp")]);
        transport.script("hotel", vec![completed("th", "ch")]);
        let state = agent.stream("second", "ctx", |_| {}).await.unwrap();

        // The second plan runs; the first plan's nodes are gone
        assert_eq!(state, GraphState::Completed);
        assert_eq!(transport.sent_to("planner")[1].text(), "second");
        assert_eq!(transport.sent_to("air").len(), 1);
        assert_eq!(transport.sent_to("hotel")[0].text(), "Book a hotel");
        assert!(transport.sent_to("planner")[1].context_id.is_none());
    }

    #[tokio::test]
    async fn test_finished_sessions_are_released() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = agent(&transport);
        for i in 0..20 {
            transport.script("planner", vec![completed("tp", "cp")]);
            let state = agent.stream("trip", &format!("ctx-{}", i), |_| {}).await.unwrap();
            assert_eq!(state, GraphState::Completed);
        }
        assert_eq!(agent.session_count().await, 0);

        // Paused sessions stay until answered
        transport.script("planner", vec![input_required("tp", "cp", "Where to?")]);
        agent.stream("trip", "held", |_| {}).await.unwrap();
        assert_eq!(agent.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_next("planner", "connection refused");
        let agent = agent(&transport);
        let err = agent.stream("trip", "ctx", |_| {}).await.unwrap_err();
        assert!(matches!(err, ConduitError::Transport(_)));
        assert_eq!(agent.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_resume_drops_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("planner", vec![input_required("tp", "cp", "Where to?")]);
        let agent = agent(&transport);
        agent.stream("trip", "ctx", |_| {}).await.unwrap();

        transport.fail_next("planner", "connection refused");
        assert!(agent.stream("London", "ctx", |_| {}).await.is_err());
        assert!(agent.session_state("ctx").await.is_none());
    }
}
