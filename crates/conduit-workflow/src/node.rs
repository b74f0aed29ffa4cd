use std::fmt;

use tracing::{debug, info};
use uuid::Uuid;

use conduit_core::error::Result;
use conduit_core::protocol::{AgentCard, Message, MessageSendParams};
use conduit_core::traits::{AgentResolver, AgentTransport, ResponseStream};

/// Key that routes a node to the planner agent instead of discovery.
pub const PLANNER_KEY: &str = "planner";

/// Lifecycle of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Ready,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
        };
        write!(f, "{}", s)
    }
}

/// Remote task that paused a node, reused when the node is resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseContext {
    pub context_id: String,
    pub task_id: Option<String>,
}

/// One unit of work: a free-text task executed by a remote agent.
#[derive(Debug, Clone)]
pub struct WorkflowNode {
    id: String,
    key: Option<String>,
    label: Option<String>,
    task: String,
    card: Option<AgentCard>,
    state: NodeState,
    pause: Option<PauseContext>,
}

impl WorkflowNode {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key: None,
            label: None,
            task: task.into(),
            card: None,
            state: NodeState::Ready,
            pause: None,
        }
    }

    /// The planner node that opens every session.
    pub fn planner(query: impl Into<String>) -> Self {
        Self::new(query).with_key(PLANNER_KEY).with_label("Planner")
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Card resolved by the most recent execution.
    pub fn card(&self) -> Option<&AgentCard> {
        self.card.as_ref()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn pause_context(&self) -> Option<&PauseContext> {
        self.pause.as_ref()
    }

    pub fn is_planner(&self) -> bool {
        self.key.as_deref() == Some(PLANNER_KEY)
    }

    /// Replace the task text, e.g. with the user's answer to a pause.
    pub fn set_task(&mut self, task: impl Into<String>) {
        self.task = task.into();
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    pub(crate) fn pause(&mut self, context: PauseContext) {
        self.state = NodeState::Paused;
        self.pause = Some(context);
    }

    pub(crate) fn complete(&mut self) {
        self.state = NodeState::Completed;
        self.pause = None;
    }

    /// Message sent to the remote agent: the task text, continuing the
    /// paused remote task when there is one.
    pub fn outgoing_message(&self) -> Message {
        let message = Message::user_text(self.task.clone());
        match &self.pause {
            Some(ctx) => message.in_context(Some(ctx.context_id.clone()), ctx.task_id.clone()),
            None => message,
        }
    }

    /// Resolve the agent for this node and open its response stream.
    pub async fn execute<'a>(
        &mut self,
        resolver: &dyn AgentResolver,
        transport: &'a dyn AgentTransport,
    ) -> Result<ResponseStream<'a>> {
        info!(node_id = %self.id, "Executing node");

        let card = if self.is_planner() {
            resolver.planner_card().await?
        } else {
            resolver.find_agent(&self.task).await?
        };
        debug!(node_id = %self.id, agent = %card.name, url = %card.url, "Resolved agent");
        self.card = Some(card.clone());

        let params = MessageSendParams::new(self.outgoing_message());
        transport.send_message_stream(&card, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_test_utils::{ScriptedResolver, ScriptedTransport, working};
    use futures::StreamExt;

    #[test]
    fn test_planner_node() {
        let node = WorkflowNode::planner("plan a trip");
        assert!(node.is_planner());
        assert_eq!(node.label(), Some("Planner"));
        assert_eq!(node.state(), NodeState::Ready);
        assert!(Uuid::parse_str(node.id()).is_ok());
    }

    #[test]
    fn test_outgoing_message_uses_pause_context() {
        let mut node = WorkflowNode::new("book a flight");
        let fresh = node.outgoing_message();
        assert_eq!(fresh.text(), "book a flight");
        assert!(fresh.context_id.is_none());

        node.pause(PauseContext {
            context_id: "ctx-1".into(),
            task_id: Some("task-1".into()),
        });
        node.set_task("to London");
        let resumed = node.outgoing_message();
        assert_eq!(resumed.text(), "to London");
        assert_eq!(resumed.context_id.as_deref(), Some("ctx-1"));
        assert_eq!(resumed.task_id.as_deref(), Some("task-1"));
        assert_ne!(fresh.message_id, resumed.message_id);

        node.complete();
        assert!(node.pause_context().is_none());
        assert!(node.outgoing_message().context_id.is_none());
    }

    #[tokio::test]
    async fn test_execute_routes_planner_and_caches_card() {
        let resolver = ScriptedResolver::new().with_agent("flight", "air");
        let transport = ScriptedTransport::new();
        transport.script("planner", vec![working("t", "c", "planning")]);
        transport.script("air", vec![working("t", "c", "booking")]);

        let mut planner = WorkflowNode::planner("Plan a flight");
        let items: Vec<_> = planner.execute(&resolver, &transport).await.unwrap().collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(planner.card().map(|c| c.name.as_str()), Some("planner"));
        // planner never goes through discovery
        assert!(resolver.queries().is_empty());

        let mut node = WorkflowNode::new("Book a flight");
        let _stream = node.execute(&resolver, &transport).await.unwrap();
        assert_eq!(node.card().map(|c| c.name.as_str()), Some("air"));
        assert_eq!(resolver.queries(), vec!["Book a flight".to_string()]);
        assert_eq!(transport.sent_to("air")[0].text(), "Book a flight");
    }

    #[tokio::test]
    async fn test_execute_propagates_discovery_failure() {
        let resolver = ScriptedResolver::new();
        let transport = ScriptedTransport::new();
        let mut node = WorkflowNode::new("juggle");
        let result = node.execute(&resolver, &transport).await;
        assert!(matches!(
            result,
            Err(conduit_core::ConduitError::AgentNotFound(_))
        ));
        assert!(node.card().is_none());
        assert!(transport.sent().is_empty());
    }
}
