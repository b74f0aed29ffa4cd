use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info};

use conduit_core::config::McpDiscoveryConfig;
use conduit_core::error::{ConduitError, Result};
use conduit_core::protocol::AgentCard;
use conduit_core::traits::AgentResolver;

use crate::client::McpClientManager;

const REGISTRY_SERVER: &str = "agent-registry";

/// Resolves agents through an MCP agent-registry server.
///
/// The planner card is read from a fixed resource; every other task is passed
/// to the registry's lookup tool as `{"query": task}`.
pub struct McpAgentResolver {
    manager: Arc<McpClientManager>,
    planner_resource: String,
    find_tool: String,
}

impl McpAgentResolver {
    pub fn new(manager: Arc<McpClientManager>, config: &McpDiscoveryConfig) -> Self {
        Self {
            manager,
            planner_resource: config.planner_resource.clone(),
            find_tool: config.find_tool.clone(),
        }
    }

    /// Open the registry session described by `config`.
    pub async fn connect(config: &McpDiscoveryConfig) -> Result<Self> {
        let manager = Arc::new(McpClientManager::new());
        manager.connect(REGISTRY_SERVER, &config.transport).await?;
        Ok(Self::new(manager, config))
    }

    pub fn manager(&self) -> &Arc<McpClientManager> {
        &self.manager
    }

    pub async fn shutdown(&self) {
        self.manager.disconnect_all().await;
    }
}

impl AgentResolver for McpAgentResolver {
    fn planner_card(&self) -> BoxFuture<'_, Result<AgentCard>> {
        Box::pin(async move {
            let text = self
                .manager
                .read_resource(REGISTRY_SERVER, &self.planner_resource)
                .await?;
            let card = parse_planner_resource(&text)?;
            info!(agent = %card.name, "Resolved planner agent");
            Ok(card)
        })
    }

    fn find_agent<'a>(&'a self, task: &'a str) -> BoxFuture<'a, Result<AgentCard>> {
        Box::pin(async move {
            let mut args = serde_json::Map::new();
            args.insert("query".into(), Value::String(task.to_string()));

            let text = self
                .manager
                .call_tool(REGISTRY_SERVER, &self.find_tool, Some(args))
                .await?;
            if text.trim().is_empty() {
                return Err(ConduitError::AgentNotFound(task.to_string()));
            }
            let card = parse_agent_card(&text)?;
            debug!(task = %task, agent = %card.name, "Resolved agent for task");
            Ok(card)
        })
    }
}

/// Parse the planner resource: `{"agent_card": [card, ...]}` or a bare card.
pub fn parse_planner_resource(text: &str) -> Result<AgentCard> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ConduitError::Discovery(format!("planner resource is not JSON: {}", e)))?;

    let card = match value.get("agent_card") {
        Some(Value::Array(cards)) => cards
            .first()
            .cloned()
            .ok_or_else(|| ConduitError::Discovery("planner resource lists no agent_card".into()))?,
        Some(other) => other.clone(),
        None => value,
    };
    card_from_value(card)
}

/// Parse a lookup-tool result into a card. The card may arrive as a JSON
/// object or as a JSON string holding the object.
pub fn parse_agent_card(text: &str) -> Result<AgentCard> {
    if text.trim().is_empty() {
        return Err(ConduitError::Discovery("lookup tool returned empty content".into()));
    }
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ConduitError::Discovery(format!("agent card is not JSON: {}", e)))?;
    card_from_value(value)
}

fn card_from_value(value: Value) -> Result<AgentCard> {
    let value = match value {
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|e| ConduitError::Discovery(format!("agent card is not JSON: {}", e)))?,
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| ConduitError::Discovery(format!("invalid agent card: {}", e)))
}
