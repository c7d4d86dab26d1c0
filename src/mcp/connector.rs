// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Aggregates many MCP servers behind one tool catalog.
//!
//! Servers are connected in id order. Tool names are global: the first
//! server to register a name owns it, later duplicates are dropped with a
//! warning, and the answer tool's name is never routed downstream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::client::McpClient;
use super::config::{McpServers, ServerConfig, TransportType, DEFAULT_TOOL_TIMEOUT};
use super::error::McpError;
use super::types::{Implementation, LogMessage, McpLogLevel, McpToolInfo, McpToolResult, ServerCapabilities};
use crate::agent::ToolExecutor;
use crate::error::ErrorCategory;
use crate::providers::RetryConfig;
use crate::types::{ToolCall, ToolDefinition, ANSWER_TOOL};

#[derive(Default)]
struct State {
    clients: HashMap<String, Arc<McpClient>>,
    configs: HashMap<String, ServerConfig>,
    tools: Vec<McpToolInfo>,
    /// tool name -> server id
    index: HashMap<String, String>,
    capabilities: HashMap<String, ServerCapabilities>,
}

/// Routes tool calls to the downstream server that owns each tool.
#[derive(Default)]
pub struct Connector {
    state: RwLock<State>,
}

impl Connector {
    /// A connector with no servers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Connect every configured server, discover and register its tools.
    ///
    /// Any failure closes the servers already connected and is returned.
    pub async fn connect(servers: &McpServers, client_info: &Implementation) -> Result<Self, McpError> {
        let connector = Self::empty();
        for (id, config) in servers {
            if let Err(e) = connector.add_server(id, config, client_info).await {
                error!(server = %id, error = %e, "Failed to start MCP server");
                connector.close().await;
                return Err(e);
            }
        }

        let state = connector.state.read().await;
        info!(
            servers = state.clients.len(),
            tools = state.tools.len(),
            "MCP connector ready"
        );
        drop(state);
        Ok(connector)
    }

    /// [`connect`](Self::connect), retried with `retry`'s backoff unless the
    /// failure is a configuration problem.
    pub async fn connect_with_retry(
        servers: &McpServers,
        client_info: &Implementation,
        retry: &RetryConfig,
    ) -> Result<Self, McpError> {
        let mut delays = retry.delays();
        loop {
            let err = match Self::connect(servers, client_info).await {
                Ok(connector) => return Ok(connector),
                Err(e) if e.category() == ErrorCategory::Validation => return Err(e),
                Err(e) => e,
            };
            let Some(delay) = delays.next() else {
                return Err(err);
            };
            warn!(error = %err, delay_secs = delay.as_secs_f64(), "MCP connect failed, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn add_server(&self, id: &str, config: &ServerConfig, client_info: &Implementation) -> Result<(), McpError> {
        let client = Arc::new(McpClient::connect(id, config, client_info).await?);
        route_logs(&client).await;

        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = client.close().await;
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        state.capabilities.insert(id.to_string(), client.capabilities().clone());
        state.clients.insert(id.to_string(), client);
        state.configs.insert(id.to_string(), config.clone());

        for tool in tools {
            if !config.is_tool_allowed(&tool.name) {
                debug!(server = %id, tool = %tool.name, "Tool filtered out");
                continue;
            }
            register(&mut state, tool);
        }
        Ok(())
    }

    /// Every registered tool, in registration order.
    pub async fn all_tools(&self) -> Vec<McpToolInfo> {
        self.state.read().await.tools.clone()
    }

    /// Registered tools as LLM tool definitions.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.state.read().await.tools.iter().map(McpToolInfo::to_definition).collect()
    }

    /// Run a tool on the server that owns it, within that server's timeout.
    pub async fn execute(&self, call: &ToolCall) -> Result<McpToolResult, McpError> {
        let (client, timeout) = {
            let state = self.state.read().await;
            let server = state
                .index
                .get(&call.name)
                .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))?;
            let client = state
                .clients
                .get(server)
                .cloned()
                .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))?;
            let timeout = state.configs.get(server).map(ServerConfig::tool_timeout).unwrap_or(DEFAULT_TOOL_TIMEOUT);
            (client, timeout)
        };

        debug!(server = %client.id(), tool = %call.name, timeout_secs = timeout.as_secs_f64(), "Calling tool");
        match client.call_tool_with_timeout(&call.name, call.input.clone(), timeout).await {
            Ok(result) => Ok(result),
            Err(e @ McpError::ToolCallTimeout { .. }) => Err(e),
            Err(e) => Err(McpError::tool_failed(&call.name, e.to_string())),
        }
    }

    /// Ids of connected servers, sorted.
    pub async fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn capabilities(&self, server: &str) -> Option<ServerCapabilities> {
        self.state.read().await.capabilities.get(server).cloned()
    }

    /// Close every client. Errors are logged, never returned.
    pub async fn close(&self) {
        let clients: Vec<Arc<McpClient>> = {
            let mut state = self.state.write().await;
            state.index.clear();
            state.tools.clear();
            state.clients.drain().map(|(_, c)| c).collect()
        };
        for client in clients {
            if let Err(e) = client.close().await {
                warn!(server = %client.id(), error = %e, "Error closing MCP server");
            }
        }
    }
}

fn register(state: &mut State, tool: McpToolInfo) {
    if tool.name == ANSWER_TOOL {
        warn!(server = %tool.server, tool = %tool.name, "Tool name is reserved, skipping");
        return;
    }
    if let Some(owner) = state.index.get(&tool.name) {
        warn!(
            server = %tool.server,
            tool = %tool.name,
            owner = %owner,
            "Duplicate tool name, keeping the first registration"
        );
        return;
    }
    state.index.insert(tool.name.clone(), tool.server.clone());
    state.tools.push(tool);
}

/// Where a downstream server's logs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogRoute {
    /// `notifications/message`, subscribed at debug level.
    Notifications,
    /// Lines the child process writes to stderr.
    Stderr,
    /// Nothing is forwarded.
    Silent,
}

fn log_route(capabilities: &ServerCapabilities, transport: TransportType) -> LogRoute {
    if capabilities.has_logging() {
        LogRoute::Notifications
    } else if transport == TransportType::Stdio {
        LogRoute::Stderr
    } else {
        LogRoute::Silent
    }
}

/// Subscribe to server logs, or fall back to stderr for stdio servers.
async fn route_logs(client: &McpClient) {
    let route = log_route(client.capabilities(), client.transport_type());
    debug!(server = %client.id(), ?route, "Routing server logs");
    client.set_stderr_forwarding(route == LogRoute::Stderr);
    if route != LogRoute::Notifications {
        return;
    }

    let server = client.id().to_string();
    client
        .on_notification(Arc::new(move |method: &str, params: &Value| {
            if method == "notifications/message" {
                emit_server_log(&server, params);
            }
        }))
        .await;
    // the local filter decides what is kept
    if let Err(e) = client.set_logging_level(McpLogLevel::Debug).await {
        warn!(server = %client.id(), error = %e, "Failed to set server log level");
    }
}

/// Re-emit a downstream `notifications/message` record through `tracing`.
pub fn emit_server_log(server: &str, params: &Value) {
    let record: LogMessage = match serde_json::from_value(params.clone()) {
        Ok(r) => r,
        Err(e) => {
            debug!(server, error = %e, "Malformed log notification");
            return;
        }
    };
    let data = match &record.data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let logger = record.logger.as_deref().unwrap_or_default();
    let level = record.level.to_tracing();
    if level == tracing::Level::ERROR {
        error!(server, logger, "{}", data);
    } else if level == tracing::Level::WARN {
        warn!(server, logger, "{}", data);
    } else if level == tracing::Level::INFO {
        info!(server, logger, "{}", data);
    } else {
        debug!(server, logger, "{}", data);
    }
}

#[async_trait]
impl ToolExecutor for Connector {
    async fn tools(&self) -> Vec<ToolDefinition> {
        self.tool_definitions().await
    }

    async fn execute(&self, call: &ToolCall) -> Result<McpToolResult, McpError> {
        Connector::execute(self, call).await
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector").finish_non_exhaustive()
    }
}
