// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP client for a single downstream server.
//!
//! An [`McpClient`] is created already initialized: [`McpClient::connect`]
//! opens the transport, performs the `initialize` handshake and sends
//! `notifications/initialized`, all within the handshake timeout.

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::config::{ServerConfig, TransportType};
use super::error::McpError;
use super::peer::{NotificationHandler, Peer};
use super::transport::{self, Transport};
use super::types::{
    Implementation, InitializeResult, ListToolsResult, McpLogLevel, McpToolInfo, McpToolResult, ServerCapabilities,
    PROTOCOL_VERSION,
};

/// Bound on the whole connect + initialize handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on `tools/list` pages followed.
const MAX_TOOL_PAGES: usize = 100;

/// An initialized connection to one MCP server.
pub struct McpClient {
    id: String,
    peer: Peer,
    transport: Box<dyn Transport>,
    init: InitializeResult,
}

impl McpClient {
    /// Connect and initialize with the default handshake timeout.
    pub async fn connect(id: &str, config: &ServerConfig, client_info: &Implementation) -> Result<Self, McpError> {
        Self::connect_with_timeout(id, config, client_info, HANDSHAKE_TIMEOUT).await
    }

    /// Connect and initialize, failing with
    /// [`McpError::ConnectionTimeout`] if the handshake outlasts `timeout`.
    pub async fn connect_with_timeout(
        id: &str,
        config: &ServerConfig,
        client_info: &Implementation,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let start = Instant::now();
        let (peer, transport) = tokio::time::timeout(timeout, transport::open(id, config))
            .await
            .map_err(|_| McpError::ConnectionTimeout {
                server: id.to_string(),
                timeout_secs: timeout.as_secs(),
            })??;

        let remaining = timeout.saturating_sub(start.elapsed());
        let init = match tokio::time::timeout(remaining, initialize(&peer, client_info)).await {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                let _ = transport.close().await;
                return Err(McpError::init_failed(id, e.to_string()));
            }
            Err(_) => {
                let _ = transport.close().await;
                return Err(McpError::ConnectionTimeout {
                    server: id.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        info!(
            server = id,
            transport = %transport.kind(),
            name = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "Connected to MCP server"
        );

        Ok(Self {
            id: id.to_string(),
            peer,
            transport,
            init,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server_info(&self) -> &Implementation {
        &self.init.server_info
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.init.capabilities
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport.kind()
    }

    /// List every tool, following `nextCursor` pages.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = match cursor.take() {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let page: ListToolsResult = serde_json::from_value(self.peer.request("tools/list", params).await?)
                .map_err(|e| McpError::InvalidResponse(format!("tools/list: {e}")))?;

            tools.extend(page.tools.into_iter().map(|mut tool| {
                tool.server = self.id.clone();
                tool
            }));

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(server = %self.id, count = tools.len(), "Listed tools");
        Ok(tools)
    }

    /// Call a tool and wait for its result without a deadline.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        let id = self.peer.next_id();
        self.call_tool_with_id(id, name, arguments).await
    }

    /// Call a tool, cancelling it on the server if `timeout` fires first.
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<McpToolResult, McpError> {
        let id = self.peer.next_id();
        match tokio::time::timeout(timeout, self.call_tool_with_id(id, name, arguments)).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel(id, "timeout").await;
                Err(McpError::ToolCallTimeout {
                    tool: name.to_string(),
                    timeout_secs: timeout.as_secs_f64(),
                })
            }
        }
    }

    async fn call_tool_with_id(&self, id: u64, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let result = self
            .peer
            .request_with_id(id, "tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        serde_json::from_value(result).map_err(|e| McpError::InvalidResponse(format!("tools/call: {e}")))
    }

    /// Ask the server to send log records at `level` and above.
    pub async fn set_logging_level(&self, level: McpLogLevel) -> Result<(), McpError> {
        self.peer.request("logging/setLevel", json!({ "level": level })).await?;
        Ok(())
    }

    /// Tell the server to abandon a request. Failures are only logged.
    pub async fn cancel(&self, request_id: u64, reason: &str) {
        self.peer.forget(request_id).await;
        let params = json!({ "requestId": request_id, "reason": reason });
        if let Err(e) = self.peer.notify("notifications/cancelled", params).await {
            debug!(server = %self.id, error = %e, "Failed to send cancellation");
        }
    }

    /// Route server notifications to `handler`.
    pub async fn on_notification(&self, handler: NotificationHandler) {
        self.peer.set_notification_handler(handler).await;
    }

    pub fn set_stderr_forwarding(&self, enabled: bool) {
        self.transport.set_stderr_forwarding(enabled);
    }

    /// Close the connection; in-flight requests fail with [`McpError::Closed`].
    pub async fn close(&self) -> Result<(), McpError> {
        self.peer.shutdown().await;
        self.transport.close().await
    }
}

async fn initialize(peer: &Peer, client_info: &Implementation) -> Result<InitializeResult, McpError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": client_info,
    });
    let result = peer.request("initialize", params).await?;
    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InvalidResponse(format!("initialize: {e}")))?;

    if !init.protocol_version.is_empty() && init.protocol_version != PROTOCOL_VERSION {
        warn!(
            server = %peer.server(),
            requested = PROTOCOL_VERSION,
            offered = %init.protocol_version,
            "MCP server negotiated a different protocol version"
        );
    }

    peer.notify("notifications/initialized", json!({})).await?;
    Ok(init)
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("id", &self.id)
            .field("transport", &self.transport.kind())
            .field("server_info", &self.init.server_info)
            .finish()
    }
}
