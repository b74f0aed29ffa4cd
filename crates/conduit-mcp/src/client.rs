use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use rmcp::model::{CallToolRequestParams, RawContent, ReadResourceRequestParams, ResourceContents, Tool as McpTool};
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};

use conduit_core::config::McpTransport;
use conduit_core::error::{ConduitError, Result};

use crate::handler::ConduitClientHandler;

type McpConnection = RunningService<RoleClient, ConduitClientHandler>;

/// Named connections to MCP servers.
///
/// Calls are made once; a failed call surfaces as [`ConduitError::Mcp`]
/// without reconnecting.
#[derive(Default)]
pub struct McpClientManager {
    connections: Mutex<HashMap<String, McpConnection>>,
}

impl McpClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to an MCP server and keep the session under `name`.
    pub async fn connect(&self, name: &str, transport: &McpTransport) -> Result<()> {
        let handler = ConduitClientHandler::new(name);

        let client = match transport {
            McpTransport::Stdio { command, args, env } => {
                let mut cmd = tokio::process::Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = rmcp::transport::TokioChildProcess::new(cmd)
                    .map_err(|e| ConduitError::Mcp(format!("Failed to spawn {}: {}", command, e)))?;

                handler.serve(transport).await.map_err(|e| {
                    ConduitError::Mcp(format!("Failed to initialize MCP client for {}: {}", name, e))
                })?
            }
            McpTransport::Sse { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());

                <ConduitClientHandler as ServiceExt<RoleClient>>::serve(handler, transport)
                    .await
                    .map_err(|e| ConduitError::Mcp(format!("MCP init for '{}' failed: {}", name, e)))?
            }
        };

        info!(server = %name, "MCP server connected");
        self.connections.lock().await.insert(name.to_string(), client);
        Ok(())
    }

    pub async fn is_connected(&self, server_name: &str) -> bool {
        let conns = self.connections.lock().await;
        conns.get(server_name).map(|c| !c.is_closed()).unwrap_or(false)
    }

    pub async fn connected_servers(&self) -> Vec<String> {
        self.connections.lock().await.keys().cloned().collect()
    }

    /// List tools from a connected server.
    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<McpTool>> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| ConduitError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let tools = client.list_all_tools().await.map_err(|e| {
            ConduitError::Mcp(format!("Failed to list tools from '{}': {}", server_name, e))
        })?;

        debug!(server = %server_name, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    /// Call a tool and return its text content, one block per line.
    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<String> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| ConduitError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments,
            meta: None,
            task: None,
        };

        let result = client.call_tool(params).await.map_err(|e| {
            ConduitError::Mcp(format!("Tool call '{}.{}' failed: {}", server_name, tool_name, e))
        })?;

        if result.is_error == Some(true) {
            return Err(ConduitError::Mcp(format!(
                "Tool '{}.{}' reported an error",
                server_name, tool_name
            )));
        }

        let content: Vec<String> = result
            .content
            .iter()
            .filter_map(|c| match c.raw {
                RawContent::Text(ref t) => Some(t.text.to_string()),
                _ => None,
            })
            .collect();

        debug!(server = %server_name, tool = %tool_name, blocks = content.len(), "MCP tool returned");
        Ok(content.join("\n"))
    }

    /// Read a resource by URI and return its text contents.
    pub async fn read_resource(&self, server_name: &str, uri: &str) -> Result<String> {
        let conns = self.connections.lock().await;
        let client = conns
            .get(server_name)
            .ok_or_else(|| ConduitError::Mcp(format!("Server '{}' not connected", server_name)))?;

        let params = ReadResourceRequestParams {
            uri: uri.to_string(),
            meta: None,
        };

        let result = client.read_resource(params).await.map_err(|e| {
            ConduitError::Mcp(format!(
                "Failed to read resource '{}' from '{}': {}",
                uri, server_name, e
            ))
        })?;

        let text: Vec<String> = result
            .contents
            .iter()
            .filter_map(|c| match c {
                ResourceContents::TextResourceContents { text, .. } => Some(text.clone()),
                ResourceContents::BlobResourceContents { .. } => None,
            })
            .collect();

        if text.is_empty() {
            return Err(ConduitError::Mcp(format!("Resource '{}' has no text contents", uri)));
        }
        Ok(text.join("\n"))
    }

    /// Disconnect from a specific server.
    pub async fn disconnect(&self, server_name: &str) {
        let mut conns = self.connections.lock().await;
        if let Some(mut client) = conns.remove(server_name) {
            let _ = client.close().await;
            info!(server = %server_name, "MCP server disconnected");
        }
    }

    /// Disconnect from all servers.
    pub async fn disconnect_all(&self) {
        let mut conns = self.connections.lock().await;
        for (name, mut client) in conns.drain() {
            let _ = client.close().await;
            info!(server = %name, "MCP server disconnected");
        }
    }
}
