// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON-RPC dispatch for the facade.

use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::logging::with_origin;
use super::{Envelope, McpServer, Session};
use crate::agent::RunOutcome;
use crate::error::{AgentError, ErrorCategory};
use crate::mcp::protocol::{self, Incoming, RpcError};
use crate::mcp::{InitializeResult, McpLogLevel, McpToolResult, ServerCapabilities, PROTOCOL_VERSION};
use crate::providers::sanitize;

/// Reserved tool (and method) that changes the log level.
pub const SET_LEVEL_TOOL: &str = "logging/setLevel";

/// Pull the required string argument out of a tool call's arguments.
///
/// The error is the message returned to the caller as an error-marked result.
pub fn extract_argument<'a>(arguments: &'a Value, name: &str) -> Result<&'a str, String> {
    match arguments.get(name) {
        None | Some(Value::Null) => Err(format!("missing or nil input argument: {name}")),
        Some(Value::String(s)) if s.trim().is_empty() => Err("empty input variable".to_string()),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(format!(
            "invalid input argument type: expected string, got {}",
            json_type(other)
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl McpServer {
    /// Handle one inbound JSON-RPC message. Returns the response, if any.
    ///
    /// Everything logged while handling it is forwarded to `session` only.
    pub async fn handle_message(&self, message: Value, session: &Session) -> Option<Value> {
        with_origin(session.id(), self.dispatch(message, session)).await
    }

    async fn dispatch(&self, message: Value, session: &Session) -> Option<Value> {
        match Incoming::parse(message) {
            Err(err) => Some(protocol::failure(Value::Null, err)),
            Ok(Incoming::Notification { method, .. }) => {
                self.handle_notification(&method, session);
                None
            }
            // this server never sends requests, so there is nothing to match
            Ok(Incoming::Response { id, .. }) => {
                debug!(session = session.id(), %id, "Ignoring unexpected response");
                None
            }
            Ok(Incoming::Request { id, method, params }) => {
                let response = match self.handle_request(&method, params, session).await {
                    Ok(result) => protocol::success(id, result),
                    Err(err) => protocol::failure(id, err),
                };
                Some(response)
            }
        }
    }

    fn handle_notification(&self, method: &str, session: &Session) {
        match method {
            "notifications/initialized" => {
                session.mark_initialized();
                info!(session = session.id(), "Client initialized");
            }
            other => debug!(session = session.id(), method = other, "Ignoring notification"),
        }
    }

    async fn handle_request(&self, method: &str, params: Value, session: &Session) -> Result<Value, RpcError> {
        match method {
            "initialize" => to_value(self.initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tool_list() })),
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::invalid_params("tools/call requires a string 'name'"))?;
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                to_value(self.call_tool(name, &arguments, session).await)
            }
            SET_LEVEL_TOOL if self.settings.logging => {
                let level = extract_argument(&params, "level").map_err(RpcError::invalid_params)?;
                self.apply_level(session, level).map_err(RpcError::invalid_params)?;
                Ok(json!({}))
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn initialize_result(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(json!({})),
                logging: self.settings.logging.then(|| json!({})),
                ..Default::default()
            },
            server_info: self.settings.info.clone(),
        }
    }

    /// Tools advertised by `tools/list`.
    pub fn tool_list(&self) -> Vec<Value> {
        let tool = &self.settings.tool;
        let mut properties = Map::new();
        properties.insert(
            tool.argument_name.clone(),
            json!({"type": "string", "description": tool.argument_description}),
        );
        let mut tools = vec![json!({
            "name": tool.name,
            "description": tool.description,
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": [tool.argument_name],
            },
        })];
        if self.settings.logging {
            let levels: Vec<&str> = McpLogLevel::ALL.iter().map(|l| l.as_str()).collect();
            tools.push(json!({
                "name": SET_LEVEL_TOOL,
                "description": "Set the minimum level of log messages sent to this client.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "level": {
                            "type": "string",
                            "enum": levels,
                            "description": "Minimum log level.",
                        }
                    },
                    "required": ["level"],
                },
            }));
        }
        tools
    }

    /// Run a `tools/call` for `session`. Every failure becomes an
    /// error-marked result. The run stops when the session is cancelled.
    pub async fn call_tool(&self, name: &str, arguments: &Value, session: &Session) -> McpToolResult {
        if name == self.settings.tool.name {
            let query = match extract_argument(arguments, &self.settings.tool.argument_name) {
                Ok(query) => query,
                Err(message) => return McpToolResult::error(message),
            };
            return match self.runner.run(query, session.cancelled()).await {
                Ok(RunOutcome::Answer { text, .. }) => McpToolResult::text(text),
                Ok(RunOutcome::ToolError { message, .. }) => McpToolResult::error(sanitize(&message)),
                Err(err) => McpToolResult::error(report_failure(&err)),
            };
        }

        if name == SET_LEVEL_TOOL && self.settings.logging {
            return match extract_argument(arguments, "level").and_then(|level| self.apply_level(session, level)) {
                Ok(()) => McpToolResult {
                    content: Vec::new(),
                    is_error: false,
                },
                Err(message) => McpToolResult::error(message),
            };
        }

        McpToolResult::error(format!("invalid tool name: {name}"))
    }

    /// Run the user tool and report in the direct-call envelope. The run
    /// stops when `cancel` turns true.
    pub async fn direct_call(&self, arguments: &Value, cancel: watch::Receiver<bool>) -> Envelope {
        let query = match extract_argument(arguments, &self.settings.tool.argument_name) {
            Ok(query) => query,
            Err(message) => return Envelope::failure(ErrorCategory::Validation, &message, None),
        };
        match self.runner.run(query, cancel).await {
            Ok(outcome) => Envelope::from_outcome(&outcome),
            Err(err) => {
                report_failure(&err);
                Envelope::from_agent_error(&err)
            }
        }
    }

    /// Change the forwarding level of one session.
    fn apply_level(&self, session: &Session, level: &str) -> Result<(), String> {
        let level: McpLogLevel = level.parse()?;
        session.set_min_level(level);
        self.refresh_log_floor()?;
        info!(session = session.id(), level = level.as_str(), "Log level changed");
        Ok(())
    }
}

/// Log a failed run and return its sanitized message.
fn report_failure(err: &AgentError) -> String {
    let message = sanitize(&err.to_string());
    match err {
        AgentError::Cancelled => info!("Agent run cancelled"),
        _ => error!(error = %message, "Agent run failed"),
    }
    message
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}
