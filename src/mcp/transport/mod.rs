// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Byte-level transports under the JSON-RPC [`Peer`](super::peer::Peer).

pub mod sse;
pub mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

use async_trait::async_trait;

use super::config::{ServerConfig, TransportType};
use super::error::McpError;
use super::peer::Peer;

/// Buffered outbound messages per connection.
pub(crate) const OUTBOUND_CAPACITY: usize = 64;

/// A live connection to one server.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportType;

    /// Whether stderr lines of a child process are re-emitted as logs.
    /// Only meaningful for stdio.
    fn set_stderr_forwarding(&self, _enabled: bool) {}

    /// Tear the connection down. Pending requests are failed by the caller.
    async fn close(&self) -> Result<(), McpError>;
}

/// Open the transport the configuration calls for.
pub async fn open(server: &str, config: &ServerConfig) -> Result<(Peer, Box<dyn Transport>), McpError> {
    match config.transport()? {
        TransportType::Stdio => {
            let (peer, transport) = StdioTransport::spawn(server, config)?;
            Ok((peer, Box::new(transport)))
        }
        TransportType::Sse => {
            let (peer, transport) = SseTransport::connect(server, config).await?;
            Ok((peer, Box::new(transport)))
        }
    }
}
