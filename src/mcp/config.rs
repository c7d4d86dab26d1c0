// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Downstream MCP server configuration.
//!
//! # Example Configuration
//!
//! ```yaml
//! agent:
//!   connections:
//!     mcpServers:
//!       time:
//!         command: uvx
//!         args: ["mcp-server-time"]
//!         environment:
//!           TZ: UTC
//!         excludeTools: ["convert_time"]
//!       search:
//!         url: https://search.example.com/sse
//!         apiKey: ${SEARCH_API_KEY}
//!         timeout: 10
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::error::McpError;
use crate::providers::retry::saturating_duration;

/// Timeout applied to a tool call when the server sets none.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Servers by id. Ordered so connection and first-wins registration are deterministic.
pub type McpServers = BTreeMap<String, ServerConfig>;

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Command for stdio transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for stdio transport.
    pub args: Vec<String>,

    /// Extra environment for the child process (supports `${VAR}`).
    pub environment: HashMap<String, String>,

    /// URL for the SSE transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bearer token for the SSE transport (supports `${VAR}`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// If non-empty, only these tools are registered.
    pub include_tools: Vec<String>,

    /// Tools never registered. Wins over `include_tools`.
    pub exclude_tools: Vec<String>,

    /// Tool call timeout in seconds; zero or negative means the default.
    pub timeout: f64,
}

/// How a server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// Child process speaking newline-delimited JSON-RPC.
    Stdio,
    /// HTTP with Server-Sent Events.
    Sse,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

impl ServerConfig {
    /// Create a stdio transport configuration.
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    /// Create an SSE transport configuration.
    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set environment variables.
    pub fn with_env(mut self, env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.environment = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_include(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_tools = tools.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn with_exclude(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude_tools = tools.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    /// The transport implied by the configured fields. A command wins over a URL.
    pub fn transport(&self) -> Result<TransportType, McpError> {
        match (&self.command, &self.url) {
            (Some(cmd), _) if !cmd.trim().is_empty() => Ok(TransportType::Stdio),
            (_, Some(url)) if !url.trim().is_empty() => Ok(TransportType::Sse),
            _ => Err(McpError::Config("server needs either a command or a url".to_string())),
        }
    }

    /// Whether discovery should register `tool_name`.
    ///
    /// Exclusion wins; a non-empty include list restricts; otherwise allowed.
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        if self.exclude_tools.iter().any(|t| t == tool_name) {
            return false;
        }
        self.include_tools.is_empty() || self.include_tools.iter().any(|t| t == tool_name)
    }

    /// Per-call timeout: the configured value if positive, else the default.
    /// Values too large to represent never expire.
    pub fn tool_timeout(&self) -> Duration {
        if self.timeout > 0.0 && self.timeout.is_finite() {
            saturating_duration(self.timeout)
        } else {
            DEFAULT_TOOL_TIMEOUT
        }
    }

    /// The API key with `${VAR}` references expanded.
    pub fn expanded_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(expand_env_vars).filter(|k| !k.is_empty())
    }

    /// The environment with `${VAR}` references expanded.
    pub fn expanded_environment(&self) -> HashMap<String, String> {
        self.environment
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect()
    }
}

static ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern"));

/// Replace `${VAR}` with the variable's value; unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    ENV_VAR
        .replace_all(value, |caps: &regex::Captures<'_>| std::env::var(&caps[1]).unwrap_or_default())
        .into_owned()
}
