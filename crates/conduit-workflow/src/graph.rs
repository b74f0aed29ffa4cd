use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use futures::StreamExt;
use tracing::{debug, info, warn};

use conduit_core::error::{ConduitError, Result};
use conduit_core::protocol::StreamResponse;
use conduit_core::traits::{AgentResolver, AgentTransport};

use crate::node::{NodeState, PauseContext, WorkflowNode};

/// Aggregate state of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Initialized,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "INITIALIZED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
        };
        write!(f, "{}", s)
    }
}

/// A response chunk tagged with the node that produced it.
#[derive(Debug, Clone)]
pub struct WorkflowChunk {
    pub node_id: String,
    pub response: StreamResponse,
}

/// Directed acyclic graph of workflow nodes, walked one node at a time.
#[derive(Debug)]
pub struct WorkflowGraph {
    nodes: HashMap<String, WorkflowNode>,
    /// Node ids in insertion order.
    order: Vec<String>,
    /// Successor ids per node, in edge insertion order.
    edges: HashMap<String, Vec<String>>,
    state: GraphState,
    paused_node_id: Option<String>,
    latest_node_id: Option<String>,
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            state: GraphState::Initialized,
            paused_node_id: None,
            latest_node_id: None,
        }
    }

    /// Add a node and return its id. Re-adding an id replaces the node.
    pub fn add_node(&mut self, node: WorkflowNode) -> String {
        let id = node.id().to_string();
        debug!(node_id = %id, task = %node.task(), "Adding node");
        if self.nodes.insert(id.clone(), node).is_none() {
            self.order.push(id.clone());
            self.edges.insert(id.clone(), Vec::new());
        }
        self.latest_node_id = Some(id.clone());
        id
    }

    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return Err(ConduitError::InvalidEdge {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let successors = self.edges.entry(from.to_string()).or_default();
        if !successors.iter().any(|s| s == to) {
            successors.push(to.to_string());
        }
        Ok(())
    }

    /// Add a node after the most recently added one.
    ///
    /// On an empty graph the node simply becomes the first node.
    pub fn add_after_end(&mut self, node: WorkflowNode) -> Result<String> {
        let previous = self.latest_node_id.clone();
        let id = self.add_node(node);
        if let Some(previous) = previous {
            self.add_edge(&previous, &id)?;
        }
        Ok(id)
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn paused_node_id(&self) -> Option<&str> {
        self.paused_node_id.as_deref()
    }

    pub fn latest_node_id(&self) -> Option<&str> {
        self.latest_node_id.as_deref()
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn successors(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with no incoming edge, in insertion order.
    pub fn roots(&self) -> Vec<String> {
        let targets: HashSet<&str> = self.edges.values().flatten().map(String::as_str).collect();
        self.order
            .iter()
            .filter(|id| !targets.contains(id.as_str()))
            .cloned()
            .collect()
    }

    /// Every node reachable from `id`, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = self.successors(id).iter().map(String::as_str).collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.to_string()) {
                queue.extend(self.successors(next).iter().map(String::as_str));
            }
        }
        seen
    }

    /// Topological order of the whole graph.
    ///
    /// Nodes are emitted generation by generation: first every node without
    /// predecessors in insertion order, then each node whose last predecessor
    /// was just emitted, in the order it became free.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        for successors in self.edges.values() {
            for s in successors {
                *indegree.entry(s.as_str()).or_default() += 1;
            }
        }

        let mut generation: Vec<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| !indegree.contains_key(id))
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while !generation.is_empty() {
            let mut next = Vec::new();
            for id in &generation {
                for child in self.successors(id) {
                    if let Some(d) = indegree.get_mut(child.as_str()) {
                        *d -= 1;
                        if *d == 0 {
                            indegree.remove(child.as_str());
                            next.push(child.as_str());
                        }
                    }
                }
            }
            sorted.extend(generation.iter().map(|id| id.to_string()));
            generation = next;
        }

        if !indegree.is_empty() {
            return Err(ConduitError::CycleDetected);
        }
        Ok(sorted)
    }

    /// Nodes a walk from `start_node_id` visits, in visiting order.
    ///
    /// The start set is the given node, or every root when no id is given or
    /// the id is unknown. The plan is the full topological order filtered to
    /// the start set and its descendants.
    pub fn execution_plan(&self, start_node_id: Option<&str>) -> Result<Vec<String>> {
        let start_nodes = match start_node_id {
            Some(id) if self.nodes.contains_key(id) => vec![id.to_string()],
            Some(id) => {
                warn!(node_id = %id, "Unknown start node, starting from roots");
                self.roots()
            }
            None => self.roots(),
        };

        let mut applicable: HashSet<String> = HashSet::new();
        for id in &start_nodes {
            applicable.extend(self.descendants(id));
            applicable.insert(id.clone());
        }

        let complete = self.topological_order()?;
        Ok(complete.into_iter().filter(|id| applicable.contains(id)).collect())
    }

    /// Walk the sub-graph from `start_node_id`, one node at a time.
    ///
    /// Every chunk is handed to `on_chunk`. A node whose stream reports
    /// `input-required` on a known context pauses the walk; resume it by
    /// calling `execute` again with [`paused_node_id`](Self::paused_node_id).
    /// Errors end the walk and leave node and graph state where they were.
    pub async fn execute<F>(
        &mut self,
        resolver: &dyn AgentResolver,
        transport: &dyn AgentTransport,
        start_node_id: Option<&str>,
        mut on_chunk: F,
    ) -> Result<GraphState>
    where
        F: FnMut(WorkflowChunk) + Send,
    {
        let plan = self.execution_plan(start_node_id)?;
        info!(nodes = plan.len(), start = ?start_node_id, "Executing workflow graph");

        // Only the node being walked may stay paused.
        for node in self.nodes.values_mut() {
            if node.state() == NodeState::Paused && !plan.iter().any(|id| id == node.id()) {
                node.set_state(NodeState::Ready);
            }
        }
        self.state = GraphState::Running;
        self.paused_node_id = None;

        for node_id in &plan {
            let node = self
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| ConduitError::NodeNotFound(node_id.clone()))?;
            node.set_state(NodeState::Running);

            let mut stream = node.execute(resolver, transport).await?;
            let mut pause = None;
            while let Some(item) = stream.next().await {
                let response = item?;
                if response.is_input_required() {
                    pause = Some(PauseContext {
                        context_id: response.context_id().unwrap_or_default().to_string(),
                        task_id: response.task_id().map(str::to_string),
                    });
                }
                on_chunk(WorkflowChunk {
                    node_id: node_id.clone(),
                    response,
                });
                if pause.is_some() {
                    break;
                }
            }
            drop(stream);

            let node = self
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| ConduitError::NodeNotFound(node_id.clone()))?;
            if let Some(context) = pause {
                info!(node_id = %node_id, context_id = %context.context_id, "Node paused for input");
                node.pause(context);
                self.state = GraphState::Paused;
                self.paused_node_id = Some(node_id.clone());
                return Ok(self.state);
            }
            node.complete();
            debug!(node_id = %node_id, "Node completed");
        }

        self.state = GraphState::Completed;
        info!("Workflow graph completed");
        Ok(self.state)
    }
}
