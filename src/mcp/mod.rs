// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model Context Protocol (MCP) client side.
//!
//! The agent reaches its tools through downstream MCP servers. Each server
//! gets one [`McpClient`]; the [`Connector`] aggregates them into a single
//! catalog and routes every call to the server that registered the tool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Connector                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐      │
//! │  │ McpClient   │  │ McpClient   │  │ McpClient   │      │
//! │  │ (server1)   │  │ (server2)   │  │ (server3)   │      │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘      │
//! └─────────┼────────────────┼────────────────┼─────────────┘
//!           │     Peer (JSON-RPC ids, pending map)           │
//!     ┌─────▼─────┐    ┌─────▼─────┐    ┌─────▼─────┐
//!     │  Stdio    │    │   Stdio   │    │   SSE     │
//!     │ Transport │    │ Transport │    │ Transport │
//!     └───────────┘    └───────────┘    └───────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use spl_agent::mcp::{Connector, Implementation, McpServers, ServerConfig};
//!
//! let mut servers = McpServers::new();
//! servers.insert("time".into(), ServerConfig::stdio("uvx").with_args(["mcp-server-time"]));
//!
//! let connector = Connector::connect(&servers, &Implementation::new("spl-agent", "0.1.0")).await?;
//! let result = connector.execute(&call).await?;
//! connector.close().await;
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::{expand_env_vars, McpServers, ServerConfig, TransportType, DEFAULT_TOOL_TIMEOUT};
pub use connector::Connector;
pub use error::McpError;
pub use types::*;
