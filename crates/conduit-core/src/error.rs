use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConduitError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Workflow errors
    #[error("Node not found in workflow graph: {0}")]
    NodeNotFound(String),

    #[error("Invalid edge {from} -> {to}: unknown node id")]
    InvalidEdge { from: String, to: String },

    #[error("Workflow graph contains a cycle")]
    CycleDetected,

    #[error("Query cannot be empty")]
    EmptyQuery,

    // Discovery errors
    #[error("No agent found for task: {0}")]
    AgentNotFound(String),

    #[error("Agent discovery failed: {0}")]
    Discovery(String),

    // MCP errors
    #[error("MCP error: {0}")]
    Mcp(String),

    // Remote agent errors
    #[error("HTTP {status} from remote agent: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConduitError>;
