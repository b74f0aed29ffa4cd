use serde_json::Value;

use conduit_core::protocol::{
    AgentCapabilities, AgentCard, AgentSkill, Artifact, Message, Part, StreamResponse, TaskArtifactUpdateEvent,
    TaskState, TaskStatus, TaskStatusUpdateEvent,
};

/// A streaming-capable card served from `http://localhost/<name>/`.
pub fn test_card(name: &str) -> AgentCard {
    AgentCard {
        name: name.to_string(),
        description: Some(format!("{} test agent", name)),
        url: format!("http://localhost/{}/", name),
        version: "1.0.0".to_string(),
        provider: None,
        capabilities: AgentCapabilities {
            streaming: true,
            ..Default::default()
        },
        default_input_modes: vec!["text".into()],
        default_output_modes: vec!["text".into()],
        skills: vec![AgentSkill {
            id: name.to_lowercase(),
            name: name.to_string(),
            description: None,
            tags: vec![],
            examples: vec![],
        }],
    }
}

pub fn status_update(task_id: &str, context_id: &str, state: TaskState, text: Option<&str>) -> StreamResponse {
    let mut status = TaskStatus::new(state);
    if let Some(text) = text {
        status = status.with_message(Message::agent_text(text));
    }
    let is_final = state.is_terminal() || state == TaskState::InputRequired;
    StreamResponse::StatusUpdate(TaskStatusUpdateEvent::new(task_id, context_id, status, is_final))
}

pub fn working(task_id: &str, context_id: &str, text: &str) -> StreamResponse {
    status_update(task_id, context_id, TaskState::Working, Some(text))
}

/// The pause signal: `input-required` with a message for the user.
pub fn input_required(task_id: &str, context_id: &str, question: &str) -> StreamResponse {
    status_update(task_id, context_id, TaskState::InputRequired, Some(question))
}

pub fn completed(task_id: &str, context_id: &str) -> StreamResponse {
    status_update(task_id, context_id, TaskState::Completed, None)
}

pub fn text_artifact(task_id: &str, context_id: &str, text: &str) -> StreamResponse {
    StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent::new(
        task_id,
        context_id,
        Artifact::new(vec![Part::text(text)]),
    ))
}

pub fn data_artifact(task_id: &str, context_id: &str, data: Value) -> StreamResponse {
    StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent::new(
        task_id,
        context_id,
        Artifact::new(vec![Part::data(data)]),
    ))
}

/// A planner artifact listing `tasks` as plain strings.
pub fn plan_artifact(task_id: &str, context_id: &str, tasks: &[&str]) -> StreamResponse {
    data_artifact(task_id, context_id, serde_json::json!({ "tasks": tasks }))
}
