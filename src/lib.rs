// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! spl-agent - an MCP server that answers requests with an LLM agent.
//!
//! The agent exposes a single tool to its MCP callers. Each call runs a
//! reason-act loop: the LLM sees the request and the tools of every
//! configured downstream MCP server, calls them, reads the results, and
//! finishes by calling the built-in `answer` tool.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Core type definitions (Message, ToolDefinition, LlmResponse, etc.)
//! - [`error`] - Error types, categories and result aliases
//! - [`config`] - Configuration loading, environment overrides and validation
//! - [`cost`] - Model prices and token estimation
//! - [`providers`] - LLM providers (Anthropic, OpenAI) and the retrying adapter
//! - [`chat`] - Prompt rendering and the per-request transcript
//! - [`mcp`] - MCP client, transports and the multi-server connector
//! - [`agent`] - The reason-act loop
//! - [`server`] - The MCP server facade (stdio or HTTP/SSE)
//! - [`telemetry`] - Logging setup and forwarding to MCP clients
//!
//! # Example
//!
//! ```rust,ignore
//! use spl_agent::agent::Agent;
//! use spl_agent::config::{load_config, CliOptions};
//! use spl_agent::mcp::Connector;
//!
//! let loaded = load_config(None, &CliOptions::default())?;
//! let config = loaded.config;
//! let connector = Connector::connect(&config.agent.connections.mcp_servers, &config.implementation()).await?;
//! let adapter = LlmAdapter::from_config(&config.agent.llm, Arc::new(config.cost_catalog()))?;
//! let agent = Agent::new(config.agent_config(), Arc::new(adapter), Arc::new(connector));
//! let outcome = agent.run("What time is it in Tokyo?").await?;
//! ```

pub mod agent;
pub mod chat;
pub mod config;
pub mod cost;
pub mod error;
pub mod mcp;
pub mod providers;
pub mod server;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use agent::{Agent, AgentConfig, AgentRunner, RunMeta, RunOutcome, ToolExecutor};
pub use error::{AgentError, ConfigError, ErrorCategory, ProviderError, Result};
pub use mcp::{Connector, McpError};
pub use providers::{create_provider, AnthropicProvider, LlmAdapter, OpenAIProvider, ProviderType};
pub use server::{McpServer, ServerError, ServerSettings};
pub use types::{
    // Message types
    ContentBlock, Message, MessageContent, Role,
    // Tool types
    ToolCall, ToolDefinition, ANSWER_TOOL,
    // Provider types
    LlmResponse, Provider, SharedProvider, TokenUsage,
};

/// spl-agent version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        // Verify key types are accessible
        let _msg = Message::user("test");
        let _config = AgentConfig::default();
        assert_eq!(ANSWER_TOOL, "answer");
    }
}
