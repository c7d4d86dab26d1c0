// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP server facade.
//!
//! Presents the agent as an MCP tool server with a single user-configured
//! tool (plus `logging/setLevel` when log forwarding is on), over exactly one
//! of two transports:
//!
//! ```text
//! stdio:    stdin  --lines-->  handle_message  --lines-->  stdout
//! http/sse: POST /message?sessionId  -->  handle_message  -->  GET /sse stream
//!           POST /call  -->  agent  -->  JSON envelope
//! ```
//!
//! Every connected client is a [`Session`] with its own outbound queue, log
//! level and cancellation flag, so responses and forwarded log notifications
//! from concurrent runs never mix. A run is cancelled when its client goes
//! away or the server shuts down.

pub mod envelope;
mod http;
pub mod logging;
mod rpc;
mod stdio;

pub use envelope::{AnswerPayload, Envelope, EnvelopeError};
pub use logging::{current_origin, with_origin, LogControl, LogSink, McpLogLayer, FORWARDING_TARGET};
pub use rpc::{extract_argument, SET_LEVEL_TOOL};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::agent::AgentRunner;
use crate::config::{AppConfig, ToolSettings};
use crate::mcp::{protocol, Implementation, LogMessage, McpLogLevel};

/// Capacity of each session's outbound queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Errors from the facade itself. Agent failures never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid transport configuration: {0}")]
    Transport(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the facade needs from the configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub info: Implementation,
    pub tool: ToolSettings,
    /// Advertise the logging capability and the `logging/setLevel` tool.
    pub logging: bool,
    /// Line buffer size when serving stdio.
    pub stdio: Option<usize>,
    /// `host:port` when serving HTTP/SSE.
    pub http: Option<String>,
}

impl ServerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let transports = &config.runtime.transports;
        Self {
            info: config.implementation(),
            tool: config.agent.tool.clone(),
            logging: !config.runtime.log.disable_mcp,
            stdio: transports.stdio.enabled.then_some(transports.stdio.buffer_size),
            http: transports
                .http
                .enabled
                .then(|| format!("{}:{}", transports.http.host, transports.http.port)),
        }
    }
}

/// One connected client.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    outbound: mpsc::Sender<Value>,
    initialized: Arc<AtomicBool>,
    min_level: Arc<AtomicUsize>,
    /// Also receives records no request can be blamed for.
    unattributed_logs: bool,
    cancel: Arc<watch::Sender<bool>>,
}

impl Session {
    pub fn new(id: impl Into<String>, outbound: mpsc::Sender<Value>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: id.into(),
            outbound,
            initialized: Arc::new(AtomicBool::new(false)),
            min_level: Arc::new(AtomicUsize::new(logging::level_index(McpLogLevel::Info))),
            unattributed_logs: false,
            cancel: Arc::new(cancel),
        }
    }

    /// Start forwarding at `level` instead of info.
    pub fn with_min_level(self, level: McpLogLevel) -> Self {
        self.set_min_level(level);
        self
    }

    /// Forward records produced outside any request too. Only for a
    /// transport with a single client.
    pub fn with_unattributed_logs(mut self) -> Self {
        self.unattributed_logs = true;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the client has sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub fn min_level(&self) -> McpLogLevel {
        McpLogLevel::ALL[self.min_level.load(Ordering::Relaxed)]
    }

    pub fn set_min_level(&self, level: McpLogLevel) {
        self.min_level.store(logging::level_index(level), Ordering::Relaxed);
    }

    fn wants(&self, origin: Option<&str>, level: McpLogLevel) -> bool {
        let routed = match origin {
            Some(id) => id == self.id,
            None => self.unattributed_logs,
        };
        routed && self.is_initialized() && level >= self.min_level()
    }

    /// Flag that turns true when the client goes away.
    pub fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    /// Cancel every run started for this client.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Queue a message for the client. Returns false once the client is gone.
    pub async fn send(&self, message: Value) -> bool {
        self.outbound.send(message).await.is_ok()
    }
}

/// The facade. Shared behind an `Arc` by every transport task.
pub struct McpServer {
    settings: ServerSettings,
    runner: Arc<dyn AgentRunner>,
    logs: Arc<LogControl>,
    sessions: Mutex<HashMap<String, Session>>,
    shutdown: watch::Sender<bool>,
    /// Requests handled off the transport's own task.
    tasks: Mutex<JoinSet<()>>,
}

impl McpServer {
    /// Fails unless exactly one transport is configured.
    pub fn new(
        settings: ServerSettings,
        runner: Arc<dyn AgentRunner>,
        logs: Arc<LogControl>,
    ) -> Result<Self, ServerError> {
        match (&settings.stdio, &settings.http) {
            (Some(_), Some(_)) => {
                return Err(ServerError::Transport(
                    "stdio and http transports are both enabled".to_string(),
                ))
            }
            (None, None) => return Err(ServerError::Transport("no transport is enabled".to_string())),
            _ => {}
        }
        if settings.stdio == Some(0) {
            return Err(ServerError::Transport("stdio buffer size must be positive".to_string()));
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            settings,
            runner,
            logs,
            sessions: Mutex::new(HashMap::new()),
            shutdown,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn log_control(&self) -> &Arc<LogControl> {
        &self.logs
    }

    /// Serve on the configured transport until `shutdown` resolves.
    pub async fn serve<F>(self: Arc<Self>, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(buffer_size) = self.settings.stdio {
            self.serve_io(tokio::io::stdin(), tokio::io::stdout(), buffer_size, shutdown)
                .await
        } else if let Some(addr) = self.settings.http.clone() {
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| ServerError::Bind { addr, source })?;
            self.serve_http(listener, shutdown).await
        } else {
            Err(ServerError::Transport("no transport is enabled".to_string()))
        }
    }

    /// Serve newline-delimited JSON-RPC over an arbitrary byte stream.
    pub async fn serve_io<R, W, F>(
        self: Arc<Self>,
        reader: R,
        writer: W,
        buffer_size: usize,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        stdio::serve(self, reader, writer, buffer_size, shutdown).await
    }

    /// Serve HTTP/SSE on an already bound listener.
    pub async fn serve_http<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        http::serve(self, listener, shutdown).await
    }

    /// A session for this server, starting at the configured log level.
    fn new_session(&self, id: impl Into<String>, outbound: mpsc::Sender<Value>) -> Session {
        Session::new(id, outbound).with_min_level(self.logs.default_level())
    }

    fn register(&self, session: Session) {
        self.lock_sessions().insert(session.id.clone(), session);
    }

    /// Drop the session and cancel whatever it still has running.
    fn unregister(&self, id: &str) {
        let removed = self.lock_sessions().remove(id);
        if let Some(session) = removed {
            session.cancel();
            if let Err(err) = self.refresh_log_floor() {
                debug!(session = id, error = %err, "Failed to relax log filter");
            }
        }
    }

    fn session(&self, id: &str) -> Option<Session> {
        self.lock_sessions().get(id).cloned()
    }

    /// Cancel every run and drop every session, so open streams end once
    /// in-flight replies drain.
    fn close_sessions(&self) {
        self.shutdown.send_replace(true);
        let sessions: Vec<Session> = self.lock_sessions().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.cancel();
        }
    }

    /// Flag that turns true when the server shuts down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run `task` in the background, tracked until [`drain_tasks`](Self::drain_tasks).
    fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Wait for every tracked task to finish.
    async fn drain_tasks(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        while tasks.join_next().await.is_some() {}
    }

    /// Point the forwarding floor at the most verbose session level.
    fn refresh_log_floor(&self) -> Result<(), String> {
        let floor = self
            .lock_sessions()
            .values()
            .map(Session::min_level)
            .min()
            .unwrap_or_else(|| self.logs.default_level());
        if floor == self.logs.min_level() {
            return Ok(());
        }
        self.logs.set_level(floor)
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    // Never log while holding this lock: the log sink takes it too.
    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for McpServer {
    /// Send the record to the session that produced it.
    fn forward(&self, origin: Option<&str>, record: &LogMessage) {
        if !self.settings.logging {
            return;
        }
        let targets: Vec<Session> = self
            .lock_sessions()
            .values()
            .filter(|s| s.wants(origin, record.level))
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }
        let Ok(params) = serde_json::to_value(record) else {
            return;
        };
        let note = protocol::notification("notifications/message", params);

        for session in targets {
            if let Err(err) = session.outbound.try_send(note.clone()) {
                trace!(target: FORWARDING_TARGET, session = %session.id, "Dropped log notification: {err}");
            }
        }
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("settings", &self.settings)
            .field("logs", &self.logs)
            .field("sessions", &self.session_count())
            .finish()
    }
}
