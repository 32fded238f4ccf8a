//! Per-turn tool discovery across every enabled server.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, ToolError};
use crate::llm::ToolDefinition;
use crate::mcp::client::McpHttpClient;
use crate::mcp::config::{ToolConfigSource, ToolServersConfig};

/// Where a tool name is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerBinding {
    pub server_name: String,
    pub server_url: String,
    pub headers: HashMap<String, String>,
}

/// Tools loaded for one orchestration turn.
#[derive(Debug, Clone, Default)]
pub struct LoadedTools {
    /// In registration order.
    pub tools: Vec<ToolDefinition>,
    pub bindings: HashMap<String, ToolServerBinding>,
    /// At least one server URL exists in config, whether or not any tools
    /// were actually loaded.
    pub configured: bool,
}

impl LoadedTools {
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn binding(&self, name: &str) -> Option<&ToolServerBinding> {
        self.bindings.get(name)
    }

    fn register(&mut self, tool: ToolDefinition, binding: &ToolServerBinding) -> bool {
        if self.bindings.contains_key(&tool.name) {
            return false;
        }
        self.bindings.insert(tool.name.clone(), binding.clone());
        self.tools.push(tool);
        true
    }
}

/// Builds the per-turn tool table from the configured servers.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    source: Arc<dyn ToolConfigSource>,
    client: McpHttpClient,
}

impl ToolRegistry {
    pub fn new(source: Arc<dyn ToolConfigSource>, client: McpHttpClient) -> Self {
        Self { source, client }
    }

    pub fn client(&self) -> &McpHttpClient {
        &self.client
    }

    /// Load tools from every enabled server.
    ///
    /// Only a malformed configuration is an error. Unreachable or
    /// misbehaving servers are skipped; servers are probed in config order
    /// and the first server to register a tool name keeps it.
    pub async fn load_enabled_tools(&self) -> Result<LoadedTools, ConfigError> {
        let raw = self.source.load().await?;
        let cfg = ToolServersConfig::from_raw(&raw)?;

        let mut loaded = LoadedTools {
            configured: cfg.servers.iter().any(|s| s.url.is_some()),
            ..LoadedTools::default()
        };

        for server in &cfg.servers {
            let Some(url) = &server.url else { continue };
            if !cfg.is_enabled(&server.name) {
                tracing::debug!(server = %server.name, "Tool server disabled, skipping");
                continue;
            }

            let tools = match self.client.list_tools(url, &server.headers).await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "Tool server unreachable, skipping");
                    continue;
                }
            };

            let binding = ToolServerBinding {
                server_name: server.name.clone(),
                server_url: url.clone(),
                headers: server.headers.clone(),
            };
            let mut registered = 0usize;
            for t in tools {
                let name = t.name.clone();
                let def = ToolDefinition {
                    name: t.name,
                    description: t.description,
                    parameters: t.input_schema,
                };
                if loaded.register(def, &binding) {
                    registered += 1;
                } else {
                    tracing::debug!(server = %server.name, tool = %name, "Duplicate tool name dropped");
                }
            }
            tracing::info!(server = %server.name, tool_count = registered, "Loaded tools from server");
        }

        Ok(loaded)
    }

    /// Invoke a tool through its binding.
    pub async fn call(
        &self,
        binding: &ToolServerBinding,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, ToolError> {
        self.client
            .call_tool(&binding.server_url, tool_name, Some(args), &binding.headers)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::StaticToolConfig;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: None,
            parameters: None,
        }
    }

    fn binding(server: &str) -> ToolServerBinding {
        ToolServerBinding {
            server_name: server.into(),
            server_url: format!("http://{server}"),
            headers: HashMap::new(),
        }
    }

    #[test]
    fn first_registration_wins() {
        let mut loaded = LoadedTools::default();
        assert!(loaded.register(def("search"), &binding("a")));
        assert!(!loaded.register(def("search"), &binding("b")));
        assert_eq!(loaded.tools.len(), 1);
        assert_eq!(loaded.binding("search").unwrap().server_name, "a");
    }

    #[tokio::test]
    async fn empty_config_is_not_configured() {
        let registry = ToolRegistry::new(
            Arc::new(StaticToolConfig::empty()),
            McpHttpClient::default(),
        );
        let loaded = registry.load_enabled_tools().await.unwrap();
        assert!(loaded.is_empty());
        assert!(!loaded.configured);
    }

    #[tokio::test]
    async fn servers_without_url_do_not_count_as_configured() {
        let registry = ToolRegistry::new(
            Arc::new(StaticToolConfig::new(r#"{"mcpServers": {"a": {}}}"#)),
            McpHttpClient::default(),
        );
        let loaded = registry.load_enabled_tools().await.unwrap();
        assert!(!loaded.configured);
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let registry = ToolRegistry::new(
            Arc::new(StaticToolConfig::new("{broken")),
            McpHttpClient::default(),
        );
        assert!(registry.load_enabled_tools().await.is_err());
    }
}
