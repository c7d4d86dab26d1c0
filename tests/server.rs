// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The MCP facade over its real transports, backed by a real agent.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;

use common::{agent, answer, call, reply, MemoryExecutor, ScriptedProvider};
use spl_agent::agent::{AgentConfig, AgentRunner, RunOutcome};
use spl_agent::config::ToolSettings;
use spl_agent::mcp::transport::sse::{decode_events, EventStream};
use spl_agent::mcp::{Implementation, LogMessage, McpLogLevel};
use spl_agent::server::{LogControl, LogSink, McpServer, ServerError, ServerSettings};
use spl_agent::types::ProviderResponse;
use spl_agent::AgentError;

fn time_agent(provider: Arc<ScriptedProvider>, config: AgentConfig) -> Arc<dyn AgentRunner> {
    let executor = Arc::new(MemoryExecutor::new().with_tool("now", "2025-01-01T00:00:00Z"));
    Arc::new(agent(config, provider, executor))
}

fn time_script() -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::new(vec![
        reply(vec![call("c1", "now", json!({}))]),
        reply(vec![answer("c2", "It is 2025-01-01T00:00:00Z.")]),
    ]))
}

fn settings(stdio: Option<usize>, http: Option<String>) -> ServerSettings {
    ServerSettings {
        info: Implementation::new("spl-agent", "test"),
        tool: ToolSettings::default(),
        logging: true,
        stdio,
        http,
    }
}

// ============================================================================
// stdio
// ============================================================================

struct StdioClient {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl StdioClient {
    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("no reply within 5s")
            .unwrap()
            .expect("stream closed");
        serde_json::from_str(&line).unwrap()
    }

    async fn handshake(&mut self) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"},
            },
        }))
        .await;
        let init = self.recv().await;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "spl-agent");
        self.send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
    }
}

fn start_stdio(
    runner: Arc<dyn AgentRunner>,
    buffer_size: usize,
) -> (Arc<McpServer>, StdioClient, tokio::task::JoinHandle<()>) {
    let server = Arc::new(
        McpServer::new(settings(Some(buffer_size), None), runner, Arc::new(LogControl::default())).unwrap(),
    );
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_side);
    let (client_read, client_write) = tokio::io::split(client_side);

    let serving = server.clone();
    let handle = tokio::spawn(async move {
        serving
            .serve_io(server_read, server_write, buffer_size, std::future::pending())
            .await
            .unwrap();
    });
    let client = StdioClient {
        lines: BufReader::new(client_read).lines(),
        writer: client_write,
    };
    (server, client, handle)
}

#[tokio::test]
async fn test_stdio_session_answers_tool_call() {
    let (_server, mut client, handle) = start_stdio(time_agent(time_script(), AgentConfig::default()), 4096);
    client.handshake().await;

    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let list = client.recv().await;
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ask", "logging/setLevel"]);

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "ask", "arguments": {"query": "What time is it?"}},
        }))
        .await;
    let result = client.recv().await;
    assert_eq!(result["id"], 3);
    assert_eq!(result["result"]["isError"], false);
    assert_eq!(result["result"]["content"][0]["text"], "It is 2025-01-01T00:00:00Z.");

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_stdio_budget_termination_is_error_result() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        ProviderResponse::with_calls(vec![call("c1", "now", json!({}))]).with_usage(1000, 500),
    ]));
    let config = AgentConfig {
        request_budget: 0.01,
        ..Default::default()
    };
    let (_server, mut client, _handle) = start_stdio(time_agent(provider, config), 4096);
    client.handshake().await;

    client
        .send(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {"name": "ask", "arguments": {"query": "What time is it?"}},
        }))
        .await;
    let result = client.recv().await;
    assert!(result.get("error").is_none());
    assert_eq!(result["result"]["isError"], true);
    assert!(result["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with("exceeded request budget"));
}

#[tokio::test]
async fn test_stdio_rejects_bad_input() {
    let (_server, mut client, _handle) = start_stdio(time_agent(time_script(), AgentConfig::default()), 128);

    client.send_raw("{not json").await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["error"]["code"], -32700);

    client.send_raw(&format!("\"{}\"", "x".repeat(512))).await;
    let reply = client.recv().await;
    assert_eq!(reply["error"]["code"], -32700);

    // the session survives both
    client
        .send(json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}))
        .await;
    let pong = client.recv().await;
    assert_eq!(pong["id"], 9);
    assert!(pong.get("result").is_some());
}

#[tokio::test]
async fn test_stdio_forwards_logs_after_initialized() {
    let (server, mut client, _handle) = start_stdio(time_agent(time_script(), AgentConfig::default()), 4096);
    client.handshake().await;
    // ping round trip orders the initialized notification before the log
    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}))
        .await;
    client.recv().await;

    server.forward(None, &LogMessage {
        level: McpLogLevel::Warning,
        logger: Some("spl_agent::agent".to_string()),
        data: json!("Agent run terminated"),
    });

    let notification = client.recv().await;
    assert_eq!(notification["method"], "notifications/message");
    assert_eq!(notification["params"]["level"], "warning");
    assert_eq!(notification["params"]["data"], "Agent run terminated");
}

// ============================================================================
// HTTP / SSE
// ============================================================================

struct HttpFacade {
    base: String,
    server: Arc<McpServer>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ServerError>>,
}

async fn start_http(runner: Arc<dyn AgentRunner>) -> HttpFacade {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(
        McpServer::new(
            settings(None, Some(addr.to_string())),
            runner,
            Arc::new(LogControl::default()),
        )
        .unwrap(),
    );
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.clone().serve_http(listener, async {
        let _ = stopped.await;
    }));
    HttpFacade {
        base: format!("http://{addr}"),
        server,
        stop,
        handle,
    }
}

#[tokio::test]
async fn test_http_health_and_direct_call() {
    let facade = start_http(time_agent(time_script(), AgentConfig::default())).await;
    let base = &facade.base;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["name"], "spl-agent");

    let response = client
        .post(format!("{base}/call"))
        .json(&json!({"query": "What time is it?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["result"]["answer"], "It is 2025-01-01T00:00:00Z.");
    assert_eq!(envelope["meta"]["iterations"], 2);

    let response = client
        .post(format!("{base}/call"))
        .json(&json!({"query": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let envelope: Value = response.json().await.unwrap();
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["type"], "validation");
    assert_eq!(envelope["error"]["message"], "empty input variable");
}

/// Skip events until one named `event` arrives, returning its data.
async fn next_event(events: &mut EventStream, event: &str) -> String {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("no event within 5s")
            .expect("stream ended")
            .unwrap();
        if next.event == event {
            return next.data;
        }
    }
}

/// Open an SSE session, returning its events and its message URL.
async fn open_session(client: &reqwest::Client, base: &str) -> (EventStream, String) {
    let response = client.get(format!("{base}/sse")).send().await.unwrap();
    assert!(response.status().is_success());
    let mut events = decode_events(response.bytes_stream());
    let endpoint = next_event(&mut events, "endpoint").await;
    assert!(endpoint.starts_with("/message?sessionId="));
    (events, format!("{base}{endpoint}"))
}

async fn post(client: &reqwest::Client, url: &str, message: Value) -> reqwest::StatusCode {
    client.post(url).json(&message).send().await.unwrap().status()
}

/// Initialize the session behind `url` and wait for the reply.
async fn initialize(client: &reqwest::Client, url: &str, events: &mut EventStream) {
    let status = post(
        client,
        url,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test", "version": "1.0"},
            },
        }),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    let init: Value = serde_json::from_str(&next_event(events, "message").await).unwrap();
    assert_eq!(init["id"], 1);
    post(client, url, json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;
}

#[tokio::test]
async fn test_sse_session_round_trip() {
    let facade = start_http(time_agent(time_script(), AgentConfig::default())).await;
    let base = facade.base.clone();
    let client = reqwest::Client::new();

    let (mut events, url) = open_session(&client, &base).await;

    let status = post(&client, &url, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let message: Value = serde_json::from_str(&next_event(&mut events, "message").await).unwrap();
    assert_eq!(message["id"], 1);
    assert_eq!(message["result"]["tools"][0]["name"], "ask");

    let status = post(
        &client,
        &format!("{base}/message?sessionId=unknown"),
        json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

    // shutdown closes open streams
    facade.stop.send(()).unwrap();
    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.next().await {
            if event.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(rest.is_ok());
}

#[tokio::test]
async fn test_sse_logs_stay_with_their_session() {
    let facade = start_http(time_agent(time_script(), AgentConfig::default())).await;
    let client = reqwest::Client::new();

    let (mut first, first_url) = open_session(&client, &facade.base).await;
    let (mut second, second_url) = open_session(&client, &facade.base).await;
    initialize(&client, &first_url, &mut first).await;
    initialize(&client, &second_url, &mut second).await;
    // ping round trips order the initialized notifications before the log
    for (url, events) in [(&first_url, &mut first), (&second_url, &mut second)] {
        post(&client, url, json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
        next_event(events, "message").await;
    }

    let first_id = first_url.rsplit('=').next().unwrap();
    facade.server.forward(Some(first_id), &LogMessage {
        level: McpLogLevel::Warning,
        logger: Some("spl_agent::agent".to_string()),
        data: json!("only for the first session"),
    });

    let log: Value = serde_json::from_str(&next_event(&mut first, "message").await).unwrap();
    assert_eq!(log["method"], "notifications/message");
    assert_eq!(log["params"]["data"], "only for the first session");

    // the second session's next message is its own reply, not the log
    post(&client, &second_url, json!({"jsonrpc": "2.0", "id": 3, "method": "ping"})).await;
    let next: Value = serde_json::from_str(&next_event(&mut second, "message").await).unwrap();
    assert_eq!(next["id"], 3);
}

/// Runs until cancelled.
struct Stalled {
    started: Arc<Notify>,
}

#[async_trait]
impl AgentRunner for Stalled {
    async fn run(&self, _query: &str, mut cancel: watch::Receiver<bool>) -> Result<RunOutcome, AgentError> {
        self.started.notify_one();
        let _ = cancel.wait_for(|cancelled| *cancelled).await;
        Err(AgentError::Cancelled)
    }
}

#[tokio::test]
async fn test_http_shutdown_cancels_direct_call() {
    let started = Arc::new(Notify::new());
    let facade = start_http(Arc::new(Stalled {
        started: started.clone(),
    }))
    .await;

    let url = format!("{}/call", facade.base);
    let pending = tokio::spawn(async move {
        let response = reqwest::Client::new()
            .post(url)
            .json(&json!({"query": "never finishes"}))
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.json::<Value>().await.unwrap())
    });
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("run never started");

    facade.stop.send(()).unwrap();
    let (status, envelope) = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("run was not cancelled")
        .unwrap();
    assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["error"]["message"], "agent run cancelled");

    tokio::time::timeout(Duration::from_secs(5), facade.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
