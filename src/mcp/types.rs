// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP types for tools, content, capabilities and log levels.
//!
//! Field names follow the MCP wire format (camelCase).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::types::{InputSchema, ToolDefinition};

/// MCP protocol revision spoken on both sides.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Information about an MCP tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolInfo {
    /// Tool name.
    pub name: String,

    /// Tool description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for tool input.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,

    /// Server this tool belongs to. Not part of the wire format.
    #[serde(skip)]
    pub server: String,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

impl McpToolInfo {
    /// The provider-neutral definition sent to the LLM.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, self.description.clone().unwrap_or_default())
            .with_schema(InputSchema::from_value(self.input_schema.clone()))
    }
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    /// Result content (text, images, etc.).
    #[serde(default)]
    pub content: Vec<McpContent>,

    /// Whether the tool reported an error.
    #[serde(default)]
    pub is_error: bool,
}

impl McpToolResult {
    /// Create a successful text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: message.into() }],
            is_error: true,
        }
    }

    /// All parts as one string. Text parts are kept as is, others are JSON.
    pub fn as_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                McpContent::Text { text } => text.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Content types that can be returned by MCP tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    /// Plain text content.
    Text { text: String },

    /// Image content.
    Image {
        /// Base64-encoded image data.
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Embedded resource.
    Resource { resource: EmbeddedResource },

    /// Any content type this client does not model.
    #[serde(other)]
    Unknown,
}

/// A resource embedded in tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Name and version exchanged during initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Implementation {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl Default for Implementation {
    fn default() -> Self {
        Self::new("unknown", "0.0.0")
    }
}

/// Server capabilities reported during initialization.
///
/// Each capability is an object on the wire; presence is what matters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

impl ServerCapabilities {
    pub fn has_tools(&self) -> bool {
        self.tools.is_some()
    }

    pub fn has_logging(&self) -> bool {
        self.logging.is_some()
    }
}

/// The `initialize` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: Implementation,
}

/// One page of `tools/list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpToolInfo>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Syslog-style severities used by MCP logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpLogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl McpLogLevel {
    pub const ALL: [McpLogLevel; 8] = [
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warning,
        Self::Error,
        Self::Critical,
        Self::Alert,
        Self::Emergency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }

    /// Level used when re-emitting a downstream server's log record.
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info | Self::Notice => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error | Self::Critical | Self::Alert | Self::Emergency => tracing::Level::ERROR,
        }
    }

    /// Level used when forwarding a local record to the MCP caller.
    pub fn from_tracing(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            Self::Error
        } else if *level == tracing::Level::WARN {
            Self::Warning
        } else if *level == tracing::Level::INFO {
            Self::Info
        } else {
            Self::Debug
        }
    }
}

impl fmt::Display for McpLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for McpLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| format!("invalid log level: {s}"))
    }
}

/// Parameters of a `notifications/message` log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub level: McpLogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_info_from_wire() {
        let tool: McpToolInfo = serde_json::from_value(json!({
            "name": "current_time",
            "description": "Get the time",
            "inputSchema": {"type": "object", "properties": {"tz": {"type": "string"}}}
        }))
        .unwrap();
        assert_eq!(tool.name, "current_time");
        assert!(tool.server.is_empty());

        let def = tool.to_definition();
        assert_eq!(def.description, "Get the time");
        assert!(def.input_schema.properties.contains_key("tz"));
    }

    #[test]
    fn test_tool_info_without_schema() {
        let tool: McpToolInfo = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(tool.input_schema, json!({"type": "object"}));
        assert_eq!(tool.to_definition().input_schema.schema_type, "object");
    }

    #[test]
    fn test_tool_result_from_wire() {
        let result: McpToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "line one"},
                {"type": "image", "data": "AAA", "mimeType": "image/png"},
                {"type": "audio", "data": "BBB"}
            ],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.content.len(), 3);
        assert_eq!(result.content[2], McpContent::Unknown);

        let text = result.as_text();
        assert!(text.starts_with("line one\n"));
        assert!(text.contains(r#""mimeType":"image/png""#));
    }

    #[test]
    fn test_tool_result_helpers() {
        let ok = McpToolResult::text("Hello, world!");
        assert!(!ok.is_error);
        assert_eq!(ok.as_text(), "Hello, world!");

        let err = McpToolResult::error("Something went wrong");
        assert!(err.is_error);
        assert_eq!(serde_json::to_value(&err).unwrap()["isError"], json!(true));
    }

    #[test]
    fn test_capabilities_presence() {
        let init: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}, "logging": {}},
            "serverInfo": {"name": "time", "version": "1.0.0"}
        }))
        .unwrap();
        assert!(init.capabilities.has_tools());
        assert!(init.capabilities.has_logging());
        assert_eq!(init.server_info.name, "time");

        assert!(!ServerCapabilities::default().has_logging());
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(McpLogLevel::Notice.to_tracing(), tracing::Level::INFO);
        assert_eq!(McpLogLevel::Warning.to_tracing(), tracing::Level::WARN);
        assert_eq!(McpLogLevel::Emergency.to_tracing(), tracing::Level::ERROR);
        assert_eq!(McpLogLevel::from_tracing(&tracing::Level::TRACE), McpLogLevel::Debug);
        assert_eq!(McpLogLevel::from_tracing(&tracing::Level::WARN), McpLogLevel::Warning);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<McpLogLevel>().unwrap(), McpLogLevel::Warning);
        assert!("verbose".parse::<McpLogLevel>().is_err());
        assert!(McpLogLevel::Debug < McpLogLevel::Error);
    }
}
