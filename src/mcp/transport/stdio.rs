// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Child process transport: newline-delimited JSON on stdin/stdout.

use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Transport, OUTBOUND_CAPACITY};
use crate::mcp::config::{ServerConfig, TransportType};
use crate::mcp::error::McpError;
use crate::mcp::peer::Peer;

/// Stderr lines held until the connector decides whether to forward them.
const STDERR_BACKLOG: usize = 64;

#[derive(Debug)]
enum StderrMode {
    /// Undecided; lines are held.
    Pending(Vec<String>),
    Forward,
    Discard,
}

/// Decides what happens to a child's stderr lines.
#[derive(Debug)]
struct StderrGate {
    mode: Mutex<StderrMode>,
}

impl StderrGate {
    fn new() -> Self {
        Self {
            mode: Mutex::new(StderrMode::Pending(Vec::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StderrMode> {
        self.mode.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a line; returns it if it should be logged now.
    fn offer(&self, line: String) -> Option<String> {
        match &mut *self.lock() {
            StderrMode::Forward => Some(line),
            StderrMode::Discard => None,
            StderrMode::Pending(held) => {
                if held.len() < STDERR_BACKLOG {
                    held.push(line);
                }
                None
            }
        }
    }

    /// Decide; returns held lines that should be logged now.
    fn decide(&self, forward: bool) -> Vec<String> {
        let next = if forward { StderrMode::Forward } else { StderrMode::Discard };
        match std::mem::replace(&mut *self.lock(), next) {
            StderrMode::Pending(held) if forward => held,
            _ => Vec::new(),
        }
    }

    /// Held lines of a child that exited before any decision.
    fn take_pending(&self) -> Vec<String> {
        match &mut *self.lock() {
            StderrMode::Pending(held) => std::mem::take(held),
            _ => Vec::new(),
        }
    }
}

pub struct StdioTransport {
    server: String,
    child: tokio::sync::Mutex<Option<Child>>,
    stderr: Arc<StderrGate>,
    /// Stdin and stdout pumps. The stderr reader ends with the child.
    pumps: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawn the configured command and wire its pipes to a new peer.
    pub fn spawn(server: &str, config: &ServerConfig) -> Result<(Peer, Self), McpError> {
        let program = config
            .command
            .as_deref()
            .ok_or_else(|| McpError::Config(format!("server '{server}' has no command")))?;

        let mut cmd = Command::new(program);
        cmd.args(&config.args)
            .envs(config.expanded_environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::connection_failed(server, format!("failed to spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::connection_failed(server, "failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::connection_failed(server, "failed to get stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::connection_failed(server, "failed to get stderr"))?;

        let (tx, rx) = mpsc::channel::<Value>(OUTBOUND_CAPACITY);
        let peer = Peer::new(server, tx);
        let gate = Arc::new(StderrGate::new());

        let pumps = vec![
            tokio::spawn(write_messages(server.to_string(), stdin, rx)),
            tokio::spawn(read_messages(stdout, peer.clone())),
        ];
        tokio::spawn(read_stderr(server.to_string(), stderr, gate.clone()));

        debug!(server, command = program, "Spawned MCP server");

        Ok((
            peer,
            Self {
                server: server.to_string(),
                child: tokio::sync::Mutex::new(Some(child)),
                stderr: gate,
                pumps,
            },
        ))
    }
}

async fn write_messages(server: String, mut stdin: tokio::process::ChildStdin, mut rx: mpsc::Receiver<Value>) {
    while let Some(message) = rx.recv().await {
        let mut line = message.to_string();
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!(server = %server, error = %e, "Failed to write to MCP server");
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

/// Read newline-delimited messages until stdout closes. Lines that are not
/// JSON, or not even UTF-8, are skipped.
async fn read_messages<R>(stdout: R, peer: Peer)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                match serde_json::from_slice::<Value>(&line) {
                    Ok(message) => peer.dispatch(message).await,
                    Err(e) => debug!(server = %peer.server(), error = %e, "Ignoring non-JSON output"),
                }
            }
            Err(e) => {
                warn!(server = %peer.server(), error = %e, "Failed to read from MCP server");
                break;
            }
        }
    }
    debug!(server = %peer.server(), "MCP server closed stdout");
    peer.shutdown().await;
}

async fn read_stderr(server: String, stderr: tokio::process::ChildStderr, gate: Arc<StderrGate>) {
    let mut reader = BufReader::new(stderr);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if line.is_empty() {
            continue;
        }
        if let Some(line) = gate.offer(line) {
            info!(server = %server, "[{}] {}", server, line);
        }
    }
    // a child that dies during startup explains itself here
    for line in gate.take_pending() {
        info!(server = %server, "[{}] {}", server, line);
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportType {
        TransportType::Stdio
    }

    fn set_stderr_forwarding(&self, enabled: bool) {
        for line in self.stderr.decide(enabled) {
            info!(server = %self.server, "[{}] {}", self.server, line);
        }
    }

    async fn close(&self) -> Result<(), McpError> {
        for task in &self.pumps {
            task.abort();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            match child.try_wait()? {
                Some(status) => debug!(server = %self.server, %status, "MCP server already exited"),
                None => {
                    child.kill().await?;
                    debug!(server = %self.server, "MCP server stopped");
                }
            }
        }
        Ok(())
    }
}
