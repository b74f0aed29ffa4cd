use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConduitError, Result};
use crate::protocol::{AgentCapabilities, AgentCard, AgentSkill};

/// Top-level Conduit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// How the orchestrator advertises itself to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_orchestrator_name")]
    pub name: String,
    #[serde(default = "default_orchestrator_description")]
    pub description: String,
    #[serde(default = "default_orchestrator_url")]
    pub url: String,
    #[serde(default = "default_orchestrator_version")]
    pub version: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            name: default_orchestrator_name(),
            description: default_orchestrator_description(),
            url: default_orchestrator_url(),
            version: default_orchestrator_version(),
        }
    }
}

impl OrchestratorConfig {
    /// Agent card served by the gateway.
    pub fn agent_card(&self) -> AgentCard {
        AgentCard {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            url: self.url.clone(),
            version: self.version.clone(),
            provider: None,
            capabilities: AgentCapabilities {
                streaming: true,
                push_notifications: false,
                state_transition_history: false,
            },
            default_input_modes: vec!["text".into(), "text/plain".into()],
            default_output_modes: vec!["text".into(), "text/plain".into()],
            skills: vec![AgentSkill {
                id: "executor".into(),
                name: "Task Executor".into(),
                description: Some(
                    "Plans a request and routes each step to a remote agent".into(),
                ),
                tags: vec!["orchestration".into(), "planning".into()],
                examples: vec![],
            }],
        }
    }
}

fn default_orchestrator_name() -> String { "Orchestrator Agent".to_string() }
fn default_orchestrator_description() -> String { "Facilitate inter agent communication".to_string() }
fn default_orchestrator_url() -> String { "http://127.0.0.1:10101/".to_string() }
fn default_orchestrator_version() -> String { "1.0.0".to_string() }

/// Outbound A2A client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for unary calls (card fetch, message/send, tasks/*).
    #[serde(default = "default_client_timeout")]
    pub timeout_secs: u64,
    /// Bearer token sent to remote agents.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_client_timeout(),
            token: None,
        }
    }
}

fn default_client_timeout() -> u64 { 300 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
            api_keys: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    pub name: String,
    pub key: String,
}

fn default_bind() -> String { "127.0.0.1:10101".to_string() }

/// Where remote agents are discovered.
///
/// Either an MCP agent registry (`[discovery.mcp]`) or a static list of peer
/// agents whose cards are fetched at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub mcp: Option<McpDiscoveryConfig>,
    /// Peer name of the planner agent (static discovery).
    #[serde(default)]
    pub planner: Option<String>,
    #[serde(default)]
    pub agents: Vec<PeerAgentConfig>,
}

impl DiscoveryConfig {
    /// Check that exactly one usable discovery source is configured.
    pub fn validate(&self) -> Result<()> {
        if self.mcp.is_some() {
            return Ok(());
        }
        if self.agents.is_empty() {
            return Err(ConduitError::Config(
                "no discovery configured: set [discovery.mcp] or [[discovery.agents]]".into(),
            ));
        }
        let planner = self.planner.as_deref().ok_or_else(|| {
            ConduitError::Config("static discovery requires discovery.planner".into())
        })?;
        if !self.agents.iter().any(|a| a.name == planner) {
            return Err(ConduitError::Config(format!(
                "planner '{}' is not one of the configured agents",
                planner
            )));
        }
        Ok(())
    }
}

/// A statically configured peer agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerAgentConfig {
    pub name: String,
    pub url: String,
}

/// MCP agent-registry discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpDiscoveryConfig {
    pub transport: McpTransport,
    /// Resource holding the planner's agent card.
    #[serde(default = "default_planner_resource")]
    pub planner_resource: String,
    /// Tool that maps a task description to an agent card.
    #[serde(default = "default_find_tool")]
    pub find_tool: String,
}

fn default_planner_resource() -> String { "resource://agent_cards/planner_agent".to_string() }
fn default_find_tool() -> String { "find_agent".to_string() }

/// MCP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
    },
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConduitError::ConfigNotFound(path.display().to_string()))?;

        Self::from_toml(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| ConduitError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_CONDUIT_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_CONDUIT_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_CONDUIT_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_CONDUIT_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_CONDUIT_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.orchestrator.name, "Orchestrator Agent");
        assert_eq!(config.client.timeout_secs, 300);
        assert!(config.gateway.is_none());
        assert!(config.discovery.mcp.is_none());
        assert!(config.discovery.validate().is_err());
    }

    #[test]
    fn test_static_discovery_validation() {
        let config = AppConfig::from_toml(
            r#"
[discovery]
planner = "planner"

[[discovery.agents]]
name = "planner"
url = "http://localhost:10102"

[[discovery.agents]]
name = "airfare"
url = "http://localhost:10103"
"#,
        )
        .unwrap();
        assert_eq!(config.discovery.agents.len(), 2);
        assert!(config.discovery.validate().is_ok());

        let mut bad = config.discovery.clone();
        bad.planner = Some("nobody".into());
        assert!(bad.validate().is_err());

        bad.planner = None;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_mcp_discovery_defaults() {
        let config = AppConfig::from_toml(
            r#"
[discovery.mcp.transport]
type = "sse"
url = "http://localhost:10100/mcp"
"#,
        )
        .unwrap();
        let mcp = config.discovery.mcp.as_ref().unwrap();
        assert_eq!(mcp.planner_resource, "resource://agent_cards/planner_agent");
        assert_eq!(mcp.find_tool, "find_agent");
        assert!(matches!(mcp.transport, McpTransport::Sse { .. }));
        assert!(config.discovery.validate().is_ok());
    }

    #[test]
    fn test_orchestrator_card() {
        let card = OrchestratorConfig::default().agent_card();
        assert!(card.capabilities.streaming);
        assert_eq!(card.url, "http://127.0.0.1:10101/");
        assert_eq!(card.skills.len(), 1);
    }
}
