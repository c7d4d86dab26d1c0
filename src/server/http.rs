// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP/SSE transport.
//!
//! - `GET /sse` opens a session. The first event is `endpoint`, carrying the
//!   URL to POST messages to; every reply and log notification follows as a
//!   `message` event.
//! - `POST /message?sessionId=...` accepts one JSON-RPC message (202).
//! - `POST /call` runs the tool directly and returns the JSON envelope.
//! - `GET /health` reports liveness.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use super::{McpServer, ServerError, OUTBOUND_CAPACITY};
use crate::mcp::protocol::{self, RpcError};

type SharedServer = Arc<McpServer>;

pub(super) async fn serve<F>(server: SharedServer, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Serving MCP over HTTP/SSE");

    let app = router(server.clone());
    // open event streams end once their sessions are dropped
    let closing = server.clone();
    let signal = async move {
        shutdown.await;
        info!("Shutting down HTTP/SSE transport");
        closing.close_sessions();
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .map_err(ServerError::Serve);

    // cancelled runs still deliver their results, or see the session is gone
    server.close_sessions();
    server.drain_tasks().await;
    result
}

fn router(server: SharedServer) -> Router {
    Router::new()
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .route("/call", post(call_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(server)
}

/// Unregisters the session, cancelling its runs, when the event stream is
/// dropped.
struct SessionGuard {
    server: SharedServer,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.server.unregister(&self.id);
    }
}

async fn sse_handler(State(server): State<SharedServer>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Value>(OUTBOUND_CAPACITY);
    server.register(server.new_session(id.clone(), tx));
    debug!(session = %id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={id}"));
    let guard = SessionGuard { server, id };
    let messages = ReceiverStream::new(rx).map(move |message| {
        let _open = &guard;
        Ok(Event::default().event("message").data(message.to_string()))
    });

    Sse::new(stream::once(async move { Ok(endpoint) }).chain(messages)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(server): State<SharedServer>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(session) = server.session(&query.session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };

    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(err) => {
            session
                .send(protocol::failure(Value::Null, RpcError::parse_error(&err)))
                .await;
            return (StatusCode::BAD_REQUEST, format!("invalid JSON: {err}")).into_response();
        }
    };

    let handler = server.clone();
    server.spawn_tracked(async move {
        if let Some(reply) = handler.handle_message(message, &session).await {
            session.send(reply).await;
        }
    });
    StatusCode::ACCEPTED.into_response()
}

async fn call_handler(State(server): State<SharedServer>, Json(arguments): Json<Value>) -> Response {
    let envelope = server.direct_call(&arguments, server.shutdown_signal()).await;
    let status = match envelope.error_kind() {
        None => StatusCode::OK,
        Some("validation") => StatusCode::BAD_REQUEST,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(envelope)).into_response()
}

async fn health_handler(State(server): State<SharedServer>) -> Json<Value> {
    let info = &server.settings().info;
    Json(json!({
        "status": "ok",
        "name": info.name,
        "version": info.version,
    }))
}
