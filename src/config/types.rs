// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Mirrors the YAML/JSON document: a `runtime` section for logging and
//! transports, and an `agent` section for the exposed tool, the chat limits,
//! the LLM and the downstream MCP servers. Keys are camelCase.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::agent::AgentConfig;
use crate::chat::{validate_template, DEFAULT_PROMPT_TEMPLATE};
use crate::cost::{CostCatalog, ModelCost};
use crate::error::ConfigError;
use crate::mcp::{Implementation, McpServers};
use crate::providers::{ProviderType, RetryConfig};

/// Root of the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub runtime: RuntimeConfig,
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub log: LogConfig,
    pub transports: TransportsConfig,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub default_level: String,
    pub format: LogFormat,
    /// `stdout`, `stderr`, or a file path.
    pub output: String,
    /// Do not forward log records to the MCP caller.
    #[serde(rename = "disableMCP")]
    pub disable_mcp: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            format: LogFormat::Auto,
            output: "stderr".to_string(),
            disable_mcp: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
    /// Text, with colors when writing to a terminal.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportsConfig {
    pub stdio: StdioTransportConfig,
    pub http: HttpTransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StdioTransportConfig {
    pub enabled: bool,
    /// Largest accepted request line, in bytes.
    pub buffer_size: usize,
}

impl Default for StdioTransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpTransportConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// The `agent` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Server name reported to callers and downstream servers.
    pub name: String,
    pub version: String,
    pub tool: ToolSettings,
    pub chat: ChatSettings,
    pub llm: LlmConfig,
    pub connections: ConnectionsConfig,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tool: ToolSettings::default(),
            chat: ChatSettings::default(),
            llm: LlmConfig::default(),
            connections: ConnectionsConfig::default(),
        }
    }
}

/// The single tool exposed to MCP callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    pub name: String,
    pub description: String,
    pub argument_name: String,
    pub argument_description: String,
}

impl Default for ToolSettings {
    fn default() -> Self {
        let defaults = AgentConfig::default();
        Self {
            name: defaults.tool_name,
            description: defaults.tool_description,
            argument_name: defaults.argument_name,
            argument_description: defaults.argument_description,
        }
    }
}

/// Per-request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Context size that triggers compaction; 0 disables it.
    pub max_tokens: u32,
    #[serde(rename = "maxLLMIterations")]
    pub max_llm_iterations: u32,
    /// USD per request; 0 means unlimited.
    pub request_budget: f64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        let defaults = AgentConfig::default();
        Self {
            max_tokens: defaults.max_tokens,
            max_llm_iterations: defaults.max_iterations,
            request_budget: defaults.request_budget,
        }
    }
}

/// LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    /// `openai` or `anthropic`.
    pub provider: String,
    pub model: String,
    /// May reference environment variables as `${VAR}`.
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// HTTP timeout per attempt, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<f64>,
    pub prompt_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub retry: RetryConfig,
    /// Extra or overriding model prices.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pricing: Vec<ModelCost>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            api_key: String::new(),
            base_url: None,
            request_timeout: None,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_tokens: None,
            temperature: None,
            retry: RetryConfig::default(),
            pricing: Vec::new(),
        }
    }
}

/// Downstream MCP servers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionsConfig {
    pub mcp_servers: McpServers,
    /// Applied to the initial connection of the whole server set.
    pub retry: RetryConfig,
}

impl AppConfig {
    /// Check the rules that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let transports = &self.runtime.transports;
        match (transports.stdio.enabled, transports.http.enabled) {
            (true, true) => {
                return Err(ConfigError::invalid(
                    "runtime.transports",
                    "only one of stdio and http may be enabled",
                ))
            }
            (false, false) => {
                return Err(ConfigError::invalid(
                    "runtime.transports",
                    "one of stdio or http must be enabled",
                ))
            }
            _ => {}
        }
        if transports.stdio.enabled && transports.stdio.buffer_size == 0 {
            return Err(ConfigError::invalid("runtime.transports.stdio.bufferSize", "must be positive"));
        }

        let agent = &self.agent;
        if agent.tool.name.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.tool.name".to_string()));
        }
        if agent.tool.argument_name.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.tool.argumentName".to_string()));
        }
        if agent.chat.max_llm_iterations < 1 {
            return Err(ConfigError::invalid("agent.chat.maxLLMIterations", "must be at least 1"));
        }
        if agent.chat.request_budget.is_nan() || agent.chat.request_budget < 0.0 {
            return Err(ConfigError::invalid("agent.chat.requestBudget", "must not be negative"));
        }

        let llm = &agent.llm;
        if llm.provider.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.llm.provider".to_string()));
        }
        llm.provider
            .parse::<ProviderType>()
            .map_err(|e| ConfigError::invalid("agent.llm.provider", e.to_string()))?;
        if llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.llm.model".to_string()));
        }
        if llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("agent.llm.apiKey".to_string()));
        }
        validate_template(&llm.prompt_template, &agent.tool.argument_name)?;
        if let Some(secs) = llm.request_timeout {
            if !seconds_in_range(secs) {
                return Err(ConfigError::invalid(
                    "agent.llm.requestTimeout",
                    format!("must be a non-negative number of seconds, got {secs}"),
                ));
            }
        }
        llm.retry
            .validate()
            .map_err(|e| ConfigError::invalid("agent.llm.retry", e))?;
        agent
            .connections
            .retry
            .validate()
            .map_err(|e| ConfigError::invalid("agent.connections.retry", e))?;

        for (id, server) in &agent.connections.mcp_servers {
            let field = format!("agent.connections.mcpServers.{id}");
            server
                .transport()
                .map_err(|e| ConfigError::invalid(field.as_str(), e.to_string()))?;
            if server.timeout.is_nan() || (server.timeout > 0.0 && !seconds_in_range(server.timeout)) {
                return Err(ConfigError::invalid(
                    format!("{field}.timeout"),
                    format!("must be a number of seconds, got {}", server.timeout),
                ));
            }
        }
        Ok(())
    }

    /// Parameters for the agent loop.
    pub fn agent_config(&self) -> AgentConfig {
        let agent = &self.agent;
        AgentConfig {
            tool_name: agent.tool.name.clone(),
            tool_description: agent.tool.description.clone(),
            argument_name: agent.tool.argument_name.clone(),
            argument_description: agent.tool.argument_description.clone(),
            prompt_template: agent.llm.prompt_template.clone(),
            max_tokens: agent.chat.max_tokens,
            max_iterations: agent.chat.max_llm_iterations,
            request_budget: agent.chat.request_budget,
        }
    }

    /// Name and version announced during MCP initialization.
    pub fn implementation(&self) -> Implementation {
        Implementation::new(&self.agent.name, &self.agent.version)
    }

    /// Built-in prices plus any configured overrides.
    pub fn cost_catalog(&self) -> CostCatalog {
        let mut catalog = CostCatalog::builtin();
        for model in &self.agent.llm.pricing {
            catalog.insert(model.clone());
        }
        catalog
    }
}

/// Whether `secs` is a non-negative number of seconds a [`Duration`] can hold.
fn seconds_in_range(secs: f64) -> bool {
    secs >= 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}
