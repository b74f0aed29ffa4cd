//! MCP-backed agent discovery.

mod client;
mod handler;
mod resolver;

pub use client::McpClientManager;
pub use handler::ConduitClientHandler;
pub use resolver::{parse_agent_card, parse_planner_resource, McpAgentResolver};
