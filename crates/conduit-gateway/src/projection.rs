use serde_json::json;

use conduit_core::protocol::{
    Artifact, Message, StreamResponse, Task, TaskArtifactUpdateEvent, TaskState, TaskStatus,
    TaskStatusUpdateEvent,
};
use conduit_workflow::{GraphState, WorkflowChunk};

/// Projects workflow chunks onto the single task the gateway reports.
///
/// Sub-agent responses are re-keyed to the orchestrator's task and context
/// ids and tagged with the emitting node in `metadata.nodeId`. Only the
/// closing event from [`finish`](Self::finish) or [`fail`](Self::fail) is
/// marked final.
pub struct TaskProjection {
    task_id: String,
    context_id: String,
    status: TaskStatus,
    artifacts: Vec<Artifact>,
}

impl TaskProjection {
    pub fn new(task_id: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            status: TaskStatus::new(TaskState::Submitted),
            artifacts: Vec::new(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Opening snapshot of the task.
    pub fn snapshot(&self) -> StreamResponse {
        StreamResponse::Task(self.task())
    }

    pub fn observe(&mut self, chunk: WorkflowChunk) -> StreamResponse {
        let metadata = Some(json!({ "nodeId": chunk.node_id }));
        match chunk.response {
            StreamResponse::StatusUpdate(ev) => self.status_event(ev.status, metadata),
            StreamResponse::ArtifactUpdate(ev) => {
                self.artifacts.push(ev.artifact.clone());
                let mut out = TaskArtifactUpdateEvent::new(&self.task_id, &self.context_id, ev.artifact);
                out.append = ev.append;
                out.last_chunk = ev.last_chunk;
                out.metadata = metadata;
                StreamResponse::ArtifactUpdate(out)
            }
            StreamResponse::Task(task) => {
                self.artifacts.extend(task.artifacts.unwrap_or_default());
                self.status_event(task.status, metadata)
            }
            StreamResponse::Message(message) => {
                let status = TaskStatus::new(TaskState::Working).with_message(message);
                self.status_event(status, metadata)
            }
        }
    }

    /// Closing status: `input-required` when the walk paused, else `completed`.
    pub fn finish(&mut self, state: GraphState) -> StreamResponse {
        let status = match state {
            GraphState::Paused => {
                let mut status = TaskStatus::new(TaskState::InputRequired);
                status.message = self.status.message.take();
                status
            }
            _ => TaskStatus::new(TaskState::Completed),
        };
        self.status = status.clone();
        StreamResponse::StatusUpdate(TaskStatusUpdateEvent::new(
            &self.task_id,
            &self.context_id,
            status,
            true,
        ))
    }

    /// Closing status for a walk that failed.
    pub fn fail(&mut self, error: &str) -> StreamResponse {
        let status = TaskStatus::new(TaskState::Failed).with_message(
            Message::agent_text(error).in_context(Some(self.context_id.clone()), Some(self.task_id.clone())),
        );
        self.status = status.clone();
        StreamResponse::StatusUpdate(TaskStatusUpdateEvent::new(
            &self.task_id,
            &self.context_id,
            status,
            true,
        ))
    }

    pub fn task(&self) -> Task {
        let mut task = Task::new(&self.task_id, &self.context_id, self.status.clone());
        if !self.artifacts.is_empty() {
            task.artifacts = Some(self.artifacts.clone());
        }
        task
    }

    fn status_event(&mut self, status: TaskStatus, metadata: Option<serde_json::Value>) -> StreamResponse {
        self.status = status.clone();
        let mut out = TaskStatusUpdateEvent::new(&self.task_id, &self.context_id, status, false);
        out.metadata = metadata;
        StreamResponse::StatusUpdate(out)
    }
}
