//! A2A (Agent-to-Agent) wire types.
//!
//! Field names are camelCase on the wire and every streamed object carries a
//! `kind` discriminator (`task`, `message`, `status-update`, `artifact-update`).

use std::fmt;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ConduitError, Result};

/// JSON-RPC method names used by A2A.
pub mod methods {
    pub const MESSAGE_SEND: &str = "message/send";
    pub const MESSAGE_STREAM: &str = "message/stream";
    pub const TASKS_GET: &str = "tasks/get";
    pub const TASKS_CANCEL: &str = "tasks/cancel";
}

/// Lifecycle state of a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    Rejected,
    AuthRequired,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Whether no further updates will follow this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Failed | Self::Rejected
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::AuthRequired => "auth-required",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// File payload: inline base64 bytes or a URI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A content part of a message or artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    File {
        file: FileContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Data {
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            metadata: None,
        }
    }

    pub fn data(data: Value) -> Self {
        Self::Data {
            data,
            metadata: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Self::Data { data, .. } => Some(data),
            _ => None,
        }
    }
}

fn kind_message() -> String {
    "message".to_string()
}

fn kind_task() -> String {
    "task".to_string()
}

fn kind_status_update() -> String {
    "status-update".to_string()
}

fn kind_artifact_update() -> String {
    "artifact-update".to_string()
}

/// A single conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default = "kind_message")]
    pub kind: String,
}

impl Message {
    fn with_role(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::text(text)],
            message_id: Uuid::new_v4().simple().to_string(),
            context_id: None,
            task_id: None,
            metadata: None,
            kind: kind_message(),
        }
    }

    /// A user message holding one text part and a fresh message id.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text)
    }

    pub fn agent_text(text: impl Into<String>) -> Self {
        Self::with_role(Role::Agent, text)
    }

    /// Attach the message to an existing remote context/task.
    pub fn in_context(mut self, context_id: Option<String>, task_id: Option<String>) -> Self {
        self.context_id = context_id;
        self.task_id = task_id;
        self
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Current status of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// ISO-8601 timestamp. Kept as a string: peers emit both zoned and naive times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl TaskStatus {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }
}

/// Output produced by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Artifact {
    /// An unnamed artifact with a fresh id.
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            artifact_id: Uuid::new_v4().simple().to_string(),
            name: None,
            description: None,
            parts,
            metadata: None,
        }
    }
}

/// A task as reported by a remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Vec<Artifact>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default = "kind_task")]
    pub kind: String,
}

impl Task {
    pub fn new(id: impl Into<String>, context_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            context_id: context_id.into(),
            status,
            artifacts: None,
            history: None,
            metadata: None,
            kind: kind_task(),
        }
    }
}

/// Streamed change of a task's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusUpdateEvent {
    pub task_id: String,
    #[serde(default)]
    pub context_id: String,
    pub status: TaskStatus,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default = "kind_status_update")]
    pub kind: String,
}

impl TaskStatusUpdateEvent {
    pub fn new(
        task_id: impl Into<String>,
        context_id: impl Into<String>,
        status: TaskStatus,
        is_final: bool,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            status,
            is_final,
            metadata: None,
            kind: kind_status_update(),
        }
    }
}

/// Streamed artifact (or artifact chunk) of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArtifactUpdateEvent {
    pub task_id: String,
    #[serde(default)]
    pub context_id: String,
    pub artifact: Artifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_chunk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default = "kind_artifact_update")]
    pub kind: String,
}

impl TaskArtifactUpdateEvent {
    pub fn new(task_id: impl Into<String>, context_id: impl Into<String>, artifact: Artifact) -> Self {
        Self {
            task_id: task_id.into(),
            context_id: context_id.into(),
            artifact,
            append: None,
            last_chunk: None,
            metadata: None,
            kind: kind_artifact_update(),
        }
    }
}

/// One result of a `message/stream` call (or of `message/send`).
///
/// Serializes flat; the inner `kind` field selects the variant.
#[derive(Debug, Clone)]
pub enum StreamResponse {
    Task(Task),
    Message(Message),
    StatusUpdate(TaskStatusUpdateEvent),
    ArtifactUpdate(TaskArtifactUpdateEvent),
}

impl StreamResponse {
    /// True for a status update asking for more user input on a known context.
    pub fn is_input_required(&self) -> bool {
        match self {
            Self::StatusUpdate(ev) => {
                ev.status.state == TaskState::InputRequired && !ev.context_id.is_empty()
            }
            _ => false,
        }
    }

    pub fn context_id(&self) -> Option<&str> {
        let id = match self {
            Self::Task(t) => Some(t.context_id.as_str()),
            Self::Message(m) => m.context_id.as_deref(),
            Self::StatusUpdate(ev) => Some(ev.context_id.as_str()),
            Self::ArtifactUpdate(ev) => Some(ev.context_id.as_str()),
        };
        id.filter(|s| !s.is_empty())
    }

    pub fn task_id(&self) -> Option<&str> {
        let id = match self {
            Self::Task(t) => Some(t.id.as_str()),
            Self::Message(m) => m.task_id.as_deref(),
            Self::StatusUpdate(ev) => Some(ev.task_id.as_str()),
            Self::ArtifactUpdate(ev) => Some(ev.task_id.as_str()),
        };
        id.filter(|s| !s.is_empty())
    }

    /// Human-readable text carried by this response, if any.
    pub fn text(&self) -> Option<String> {
        let text = match self {
            Self::Task(t) => t.status.message.as_ref().map(Message::text),
            Self::Message(m) => Some(m.text()),
            Self::StatusUpdate(ev) => ev.status.message.as_ref().map(Message::text),
            Self::ArtifactUpdate(ev) => Some(
                ev.artifact
                    .parts
                    .iter()
                    .filter_map(Part::as_text)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        };
        text.filter(|t| !t.is_empty())
    }
}

impl Serialize for StreamResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Task(inner) => inner.serialize(serializer),
            Self::Message(inner) => inner.serialize(serializer),
            Self::StatusUpdate(inner) => inner.serialize(serializer),
            Self::ArtifactUpdate(inner) => inner.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StreamResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("missing 'kind' field"))?
            .to_string();

        match kind.as_str() {
            "task" => serde_json::from_value(value).map(Self::Task),
            "message" => serde_json::from_value(value).map(Self::Message),
            "status-update" => serde_json::from_value(value).map(Self::StatusUpdate),
            "artifact-update" => serde_json::from_value(value).map(Self::ArtifactUpdate),
            other => {
                return Err(D::Error::custom(format!(
                    "unknown kind '{}', expected task, message, status-update or artifact-update",
                    other
                )))
            }
        }
        .map_err(D::Error::custom)
    }
}

// ---- Agent card ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProvider {
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
    #[serde(default)]
    pub state_transition_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

fn default_card_version() -> String {
    "1.0.0".to_string()
}

fn default_modes() -> Vec<String> {
    vec!["text".to_string()]
}

/// Agent card served at `/.well-known/agent.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(default = "default_card_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<AgentProvider>,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default = "default_modes")]
    pub default_input_modes: Vec<String>,
    #[serde(default = "default_modes")]
    pub default_output_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

// ---- JSON-RPC ----

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    pub fn generate() -> Self {
        Self::String(Uuid::new_v4().simple().to_string())
    }
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: impl Serialize) -> Result<Self> {
        Ok(Self {
            jsonrpc: jsonrpc_version(),
            id: Some(RequestId::generate()),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const TASK_NOT_FOUND: i64 = -32001;
    pub const TASK_NOT_CANCELABLE: i64 = -32002;
    pub const UNSUPPORTED_OPERATION: i64 = -32004;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: impl Serialize) -> Result<Self> {
        Ok(Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    pub fn failure(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Decode the result, turning a JSON-RPC error into `ConduitError::Rpc`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if let Some(err) = self.error {
            return Err(ConduitError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = self
            .result
            .ok_or_else(|| ConduitError::Stream("JSON-RPC response has neither result nor error".into()))?;
        Ok(serde_json::from_value(result)?)
    }
}

// ---- Method params ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSendParams {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl MessageSendParams {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            configuration: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_length: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIdParams {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_wire_names() {
        let json = serde_json::to_string(&TaskState::InputRequired).unwrap();
        assert_eq!(json, "\"input-required\"");
        let parsed: TaskState = serde_json::from_str("\"auth-required\"").unwrap();
        assert_eq!(parsed, TaskState::AuthRequired);
        let unknown: TaskState = serde_json::from_str("\"paused-forever\"").unwrap();
        assert_eq!(unknown, TaskState::Unknown);
        assert_eq!(TaskState::InputRequired.to_string(), "input-required");
    }

    #[test]
    fn test_message_wire_format() {
        let msg = Message::user_text("Book return tickets to London");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["kind"], "message");
        assert_eq!(json["parts"][0]["kind"], "text");
        assert_eq!(json["parts"][0]["text"], "Book return tickets to London");
        assert_eq!(json["messageId"].as_str().unwrap().len(), 32);
        assert!(json.get("contextId").is_none());
    }

    #[test]
    fn test_status_update_pause_detection() {
        let raw = serde_json::json!({
            "kind": "status-update",
            "taskId": "t-1",
            "contextId": "ctx-1",
            "final": true,
            "status": {
                "state": "input-required",
                "message": {
                    "role": "agent",
                    "messageId": "m-1",
                    "parts": [{"kind": "text", "text": "Which dates?"}]
                }
            }
        });
        let resp: StreamResponse = serde_json::from_value(raw).unwrap();
        assert!(resp.is_input_required());
        assert_eq!(resp.context_id(), Some("ctx-1"));
        assert_eq!(resp.task_id(), Some("t-1"));
        assert_eq!(resp.text().as_deref(), Some("Which dates?"));
    }

    #[test]
    fn test_input_required_without_context_is_not_a_pause() {
        let ev = TaskStatusUpdateEvent::new("t-1", "", TaskStatus::new(TaskState::InputRequired), true);
        assert!(!StreamResponse::StatusUpdate(ev).is_input_required());

        let ev = TaskStatusUpdateEvent::new("t-1", "ctx", TaskStatus::new(TaskState::Working), false);
        assert!(!StreamResponse::StatusUpdate(ev).is_input_required());
    }

    #[test]
    fn test_stream_response_unknown_kind() {
        let raw = serde_json::json!({"kind": "telepathy"});
        let err = serde_json::from_value::<StreamResponse>(raw).unwrap_err();
        assert!(err.to_string().contains("unknown kind"));

        let err = serde_json::from_value::<StreamResponse>(serde_json::json!({"id": 1})).unwrap_err();
        assert!(err.to_string().contains("missing 'kind'"));
    }

    #[test]
    fn test_artifact_update_serializes_flat() {
        let artifact = Artifact {
            artifact_id: "a-1".into(),
            name: Some("plan".into()),
            description: None,
            parts: vec![Part::data(serde_json::json!({"tasks": ["one"]}))],
            metadata: None,
        };
        let resp = StreamResponse::ArtifactUpdate(TaskArtifactUpdateEvent::new("t", "c", artifact));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["kind"], "artifact-update");
        assert_eq!(json["artifact"]["artifactId"], "a-1");
        assert_eq!(json["artifact"]["parts"][0]["kind"], "data");
        assert!(json.get("Task").is_none());
    }

    #[test]
    fn test_agent_card_minimal() {
        let raw = r#"{"name":"Air Ticketing Agent","url":"http://localhost:10103/","capabilities":{"streaming":true}}"#;
        let card: AgentCard = serde_json::from_str(raw).unwrap();
        assert_eq!(card.version, "1.0.0");
        assert!(card.capabilities.streaming);
        assert_eq!(card.default_input_modes, vec!["text"]);
        assert!(card.skills.is_empty());
    }

    #[test]
    fn test_jsonrpc_error_into_result() {
        let resp = JsonRpcResponse::failure(
            Some(RequestId::Number(7)),
            JsonRpcError::method_not_found("tasks/explode"),
        );
        match resp.into_result::<Value>() {
            Err(ConduitError::Rpc { code, message }) => {
                assert_eq!(code, JsonRpcError::METHOD_NOT_FOUND);
                assert!(message.contains("tasks/explode"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_jsonrpc_request_id_forms() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"method":"message/send"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::Number(3)));
        assert!(req.params.is_null());

        let req = JsonRpcRequest::new(methods::MESSAGE_STREAM, serde_json::json!({})).unwrap();
        assert!(matches!(req.id, Some(RequestId::String(_))));
        assert_eq!(req.method, "message/stream");
    }
}
