// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client side of a JSON-RPC connection.
//!
//! A [`Peer`] owns request id allocation and the table of in-flight
//! requests. Transports feed every inbound message to [`Peer::dispatch`] and
//! drain the outbound channel the peer was created with.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{debug, warn};

use super::error::McpError;
use super::protocol::{self, Incoming, RpcError};

/// Callback for server notifications: `(method, params)`.
pub type NotificationHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

type Pending = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;

/// Shared handle to one JSON-RPC connection.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<Inner>,
}

struct Inner {
    server: String,
    outbound: mpsc::Sender<Value>,
    pending: Mutex<Pending>,
    next_id: AtomicU64,
    handler: RwLock<Option<NotificationHandler>>,
    closed: AtomicBool,
}

impl Peer {
    pub fn new(server: impl Into<String>, outbound: mpsc::Sender<Value>) -> Self {
        Self {
            inner: Arc::new(Inner {
                server: server.into(),
                outbound,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                handler: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn server(&self) -> &str {
        &self.inner.server
    }

    /// Allocate a request id.
    pub fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id();
        self.request_with_id(id, method, params).await
    }

    /// Send a request under a caller-chosen id, so the caller can cancel it.
    ///
    /// Dropping the returned future leaves the id registered until
    /// [`Peer::forget`] is called or the connection closes.
    pub async fn request_with_id(&self, id: u64, method: &str, params: Value) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(McpError::Closed(self.inner.server.clone()));
        }

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        if self
            .inner
            .outbound
            .send(protocol::request(id, method, params))
            .await
            .is_err()
        {
            self.inner.pending.lock().await.remove(&id);
            return Err(McpError::Closed(self.inner.server.clone()));
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(McpError::protocol(e.code, e.message)),
            Err(_) => Err(McpError::Closed(self.inner.server.clone())),
        }
    }

    /// Drop a pending request without waiting for it.
    pub async fn forget(&self, id: u64) {
        self.inner.pending.lock().await.remove(&id);
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        self.inner
            .outbound
            .send(protocol::notification(method, params))
            .await
            .map_err(|_| McpError::Closed(self.inner.server.clone()))
    }

    pub async fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.inner.handler.write().await = Some(handler);
    }

    /// Route one inbound message.
    pub async fn dispatch(&self, message: Value) {
        match Incoming::parse(message) {
            Ok(Incoming::Response { id, result }) => {
                let sender = match id.as_u64() {
                    Some(id) => self.inner.pending.lock().await.remove(&id),
                    None => None,
                };
                match sender {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => debug!(server = %self.inner.server, %id, "Response for unknown request"),
                }
            }
            Ok(Incoming::Request { id, method, .. }) => {
                let reply = if method == "ping" {
                    protocol::success(id, json!({}))
                } else {
                    protocol::failure(id, RpcError::method_not_found(&method))
                };
                // the writer may be the task calling us, so never wait for capacity
                if self.inner.outbound.try_send(reply).is_err() {
                    warn!(server = %self.inner.server, %method, "Could not answer server request");
                }
            }
            Ok(Incoming::Notification { method, params }) => {
                let handler = self.inner.handler.read().await.clone();
                match handler {
                    Some(handler) => handler(&method, &params),
                    None => debug!(server = %self.inner.server, %method, "Unhandled notification"),
                }
            }
            Err(e) => warn!(server = %self.inner.server, error = %e.message, "Malformed message from server"),
        }
    }

    /// Mark the connection closed and fail every pending request.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.pending.lock().await.clear();
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("server", &self.inner.server)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn peer() -> (Peer, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(16);
        (Peer::new("test", tx), rx)
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (peer, mut rx) = peer();
        let responder = peer.clone();
        tokio::spawn(async move {
            let sent = rx.recv().await.unwrap();
            assert_eq!(sent["method"], "tools/list");
            responder
                .dispatch(protocol::success(sent["id"].clone(), json!({"tools": []})))
                .await;
        });

        let result = peer.request("tools/list", json!({})).await.unwrap();
        assert_eq!(result, json!({"tools": []}));
    }

    #[tokio::test]
    async fn test_error_response_maps_to_protocol_error() {
        let (peer, mut rx) = peer();
        let responder = peer.clone();
        tokio::spawn(async move {
            let sent = rx.recv().await.unwrap();
            responder
                .dispatch(protocol::failure(sent["id"].clone(), RpcError::invalid_params("nope")))
                .await;
        });

        let err = peer.request("tools/call", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Protocol { code: -32602, .. }));
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending() {
        let (peer, _rx) = peer();
        let waiter = peer.clone();
        let handle = tokio::spawn(async move { waiter.request("slow", json!({})).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        peer.shutdown().await;

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, McpError::Closed(_)));
        assert!(matches!(peer.request("x", json!({})).await, Err(McpError::Closed(_))));
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (peer, mut rx) = peer();
        peer.dispatch(protocol::request(42, "ping", json!({}))).await;
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply["id"], 42);
        assert_eq!(reply["result"], json!({}));

        peer.dispatch(protocol::request(43, "sampling/createMessage", json!({}))).await;
        let reply = rx.recv().await.unwrap();
        assert_eq!(reply["error"]["code"], protocol::codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notifications_reach_handler() {
        let (peer, _rx) = peer();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        peer.set_notification_handler(Arc::new(move |method: &str, params: &Value| {
            sink.lock().unwrap().push((method.to_string(), params.clone()));
        }))
        .await;

        peer.dispatch(protocol::notification(
            "notifications/message",
            json!({"level": "info", "data": "hello"}),
        ))
        .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "notifications/message");
        assert_eq!(seen[0].1["data"], "hello");
    }
}
