// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP + Server-Sent Events transport.
//!
//! The client opens `GET <url>` as an event stream. The first `endpoint`
//! event names the URL that requests are POSTed to; responses come back as
//! `message` events on the stream.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Transport, OUTBOUND_CAPACITY};
use crate::mcp::config::{ServerConfig, TransportType};
use crate::mcp::error::McpError;
use crate::mcp::peer::Peer;

/// How long to wait for the `endpoint` event.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(10);

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `message` when the stream gave none.
    pub event: String,
    pub data: String,
}

/// Decoded events of a `text/event-stream` body, or the decode error.
pub type EventStream = BoxStream<'static, Result<SseEvent, String>>;

/// Decode a `text/event-stream` body. Events and characters split across
/// chunks come out whole.
pub fn decode_events<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    body.eventsource()
        .map(|item| match item {
            Ok(event) => Ok(SseEvent {
                event: if event.event.is_empty() {
                    "message".to_string()
                } else {
                    event.event
                },
                data: event.data,
            }),
            Err(e) => Err(e.to_string()),
        })
        .boxed()
}

pub struct SseTransport {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream, wait for the endpoint, and start the pumps.
    pub async fn connect(server: &str, config: &ServerConfig) -> Result<(Peer, Self), McpError> {
        let raw_url = config
            .url
            .as_deref()
            .ok_or_else(|| McpError::Config(format!("server '{server}' has no url")))?;
        let base = Url::parse(raw_url).map_err(|e| McpError::Config(format!("invalid url '{raw_url}': {e}")))?;
        let api_key = config.expanded_api_key();

        let client = reqwest::Client::new();
        let mut request = client.get(base.clone()).header(ACCEPT, "text/event-stream");
        if let Some(ref key) = api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| McpError::connection_failed(server, e.to_string()))?;
        if !response.status().is_success() {
            return Err(McpError::connection_failed(
                server,
                format!("event stream returned {}", response.status()),
            ));
        }

        let mut events = decode_events(response.bytes_stream());

        let endpoint = tokio::time::timeout(ENDPOINT_TIMEOUT, async {
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| McpError::connection_failed(server, e))?;
                if event.event == "endpoint" {
                    return base
                        .join(event.data.trim())
                        .map_err(|e| McpError::connection_failed(server, format!("bad endpoint: {e}")));
                }
            }
            Err(McpError::connection_failed(server, "event stream ended before endpoint"))
        })
        .await
        .map_err(|_| McpError::ConnectionTimeout {
            server: server.to_string(),
            timeout_secs: ENDPOINT_TIMEOUT.as_secs(),
        })??;

        debug!(server, %endpoint, "SSE endpoint received");

        let (tx, rx) = mpsc::channel::<Value>(OUTBOUND_CAPACITY);
        let peer = Peer::new(server, tx);

        let reader_peer = peer.clone();
        let reader = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    Ok(event) => deliver(&reader_peer, event).await,
                    Err(e) => {
                        warn!(server = %reader_peer.server(), error = %e, "SSE stream error");
                        break;
                    }
                }
            }
            debug!(server = %reader_peer.server(), "SSE stream closed");
            reader_peer.shutdown().await;
        });

        let writer = tokio::spawn(post_messages(client, endpoint, api_key, rx, peer.clone()));

        Ok((peer, Self { reader, writer }))
    }
}

async fn deliver(peer: &Peer, event: SseEvent) {
    if event.event != "message" {
        debug!(server = %peer.server(), event = %event.event, "Ignoring SSE event");
        return;
    }
    match serde_json::from_str::<Value>(&event.data) {
        Ok(message) => peer.dispatch(message).await,
        Err(e) => warn!(server = %peer.server(), error = %e, "Invalid JSON in SSE message"),
    }
}

async fn post_messages(
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    mut rx: mpsc::Receiver<Value>,
    peer: Peer,
) {
    while let Some(message) = rx.recv().await {
        let mut request = client.post(endpoint.clone()).json(&message);
        if let Some(ref key) = api_key {
            request = request.bearer_auth(key);
        }
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(server = %peer.server(), error = %e, "Failed to POST to MCP server");
                continue;
            }
        };
        if !response.status().is_success() {
            warn!(server = %peer.server(), status = %response.status(), "MCP server rejected message");
            continue;
        }

        // some servers answer inline instead of on the stream
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if is_json {
            if let Ok(body) = response.json::<Value>().await {
                peer.dispatch(body).await;
            }
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportType {
        TransportType::Sse
    }

    async fn close(&self) -> Result<(), McpError> {
        self.reader.abort();
        self.writer.abort();
        Ok(())
    }
}
