// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP error types.

use thiserror::Error;

use crate::error::ErrorCategory;

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Server not found in connection manager.
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    /// No connected server provides the tool.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Connection failed.
    #[error("failed to connect to MCP server '{server}': {message}")]
    ConnectionFailed { server: String, message: String },

    /// Handshake did not finish in time.
    #[error("connection to MCP server '{server}' timed out after {timeout_secs}s")]
    ConnectionTimeout { server: String, timeout_secs: u64 },

    /// Initialization failed.
    #[error("failed to initialize MCP server '{server}': {message}")]
    InitializationFailed { server: String, message: String },

    /// The downstream server reported a failure.
    #[error("tool '{tool}' failed: {message}")]
    ToolCallFailed { tool: String, message: String },

    /// The per-tool timer fired.
    #[error("tool '{tool}' execution timed out after {timeout_secs} seconds")]
    ToolCallTimeout { tool: String, timeout_secs: f64 },

    /// Invalid response from server.
    #[error("invalid response from MCP server: {0}")]
    InvalidResponse(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection was closed while a request was pending.
    #[error("MCP server '{0}' connection closed")]
    Closed(String),

    /// Protocol error (JSON-RPC).
    #[error("protocol error: code={code}, message={message}")]
    Protocol { code: i64, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error from the SSE transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl McpError {
    /// Create a connection failed error.
    pub fn connection_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create an initialization failed error.
    pub fn init_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a tool call failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolCallFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ToolNotFound(_) | Self::ServerNotFound(_) | Self::Config(_) => ErrorCategory::Validation,
            Self::ToolCallTimeout { .. } | Self::ConnectionTimeout { .. } | Self::Closed(_) | Self::Http(_) => {
                ErrorCategory::Transient
            }
            Self::ConnectionFailed { .. } | Self::InitializationFailed { .. } | Self::Transport(_) | Self::Io(_) => {
                ErrorCategory::External
            }
            Self::ToolCallFailed { .. } | Self::Protocol { .. } | Self::InvalidResponse(_) | Self::Json(_) => {
                ErrorCategory::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = McpError::ToolCallTimeout {
            tool: "sleepy".to_string(),
            timeout_secs: 1.0,
        };
        assert_eq!(err.to_string(), "tool 'sleepy' execution timed out after 1 seconds");

        let err = McpError::ToolCallTimeout {
            tool: "sleepy".to_string(),
            timeout_secs: 2.5,
        };
        assert_eq!(err.to_string(), "tool 'sleepy' execution timed out after 2.5 seconds");
    }

    #[test]
    fn test_error_display() {
        let err = McpError::ServerNotFound("test_server".to_string());
        assert!(err.to_string().contains("test_server"));

        let err = McpError::ToolNotFound("lookup".to_string());
        assert_eq!(err.to_string(), "tool not found: lookup");

        let err = McpError::protocol(-32600, "Invalid Request");
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(McpError::ToolNotFound("x".into()).category(), ErrorCategory::Validation);
        assert_eq!(McpError::tool_failed("x", "boom").category(), ErrorCategory::Internal);
        assert_eq!(McpError::connection_failed("s", "refused").category(), ErrorCategory::External);
        assert_eq!(
            McpError::ToolCallTimeout {
                tool: "x".into(),
                timeout_secs: 30.0
            }
            .category(),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn test_error_helpers() {
        let err = McpError::init_failed("server", "handshake failed");
        assert!(matches!(err, McpError::InitializationFailed { .. }));
        assert!(err.to_string().contains("handshake failed"));
    }
}
