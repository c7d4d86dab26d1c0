// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use spl_agent::agent::{Agent, AgentConfig, ToolExecutor};
use spl_agent::cost::{CostCatalog, ModelCost};
use spl_agent::mcp::{McpError, McpToolResult};
use spl_agent::providers::{LlmAdapter, RetryConfig};
use spl_agent::types::{ChatOptions, Message, Provider, ProviderResponse, ToolCall, ToolDefinition, ANSWER_TOOL};
use spl_agent::ProviderError;

/// Model name priced in [`catalog`].
pub const TEST_MODEL: &str = "test-model";

/// A provider that replays canned replies in order.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ProviderResponse>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// The transcript sent with each call so far.
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _options: &ChatOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::InvalidRequest("script exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        TEST_MODEL
    }
}

/// Prices `test-model` at $10 / $20 per million input / output tokens.
pub fn catalog() -> Arc<CostCatalog> {
    Arc::new(CostCatalog::new().with_model(ModelCost::new(TEST_MODEL, 10.0, 20.0)))
}

pub fn adapter(provider: Arc<ScriptedProvider>) -> Arc<LlmAdapter> {
    Arc::new(LlmAdapter::new(provider, catalog()).with_retry(RetryConfig::none()))
}

pub fn agent(config: AgentConfig, provider: Arc<ScriptedProvider>, executor: Arc<dyn ToolExecutor>) -> Agent {
    Agent::new(config, adapter(provider), executor)
}

/// A reply carrying `calls` and a small usage report.
pub fn reply(calls: Vec<ToolCall>) -> ProviderResponse {
    ProviderResponse::with_calls(calls).with_usage(10, 5)
}

pub fn call(id: &str, name: &str, input: Value) -> ToolCall {
    ToolCall::new(id, name, input)
}

pub fn answer(id: &str, text: &str) -> ToolCall {
    ToolCall::new(id, ANSWER_TOOL, json!({ "text": text }))
}

/// A tool executor backed by fixed replies.
#[derive(Default)]
pub struct MemoryExecutor {
    tools: Vec<ToolDefinition>,
    replies: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<ToolCall>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, reply: &str) -> Self {
        self.tools.push(ToolDefinition::new(name, format!("The {name} tool")));
        self.replies.insert(name.to_string(), reply.to_string());
        self
    }

    pub fn with_delay(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Names of the tools called so far, in order.
    pub fn called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.name.clone()).collect()
    }
}

#[async_trait]
impl ToolExecutor for MemoryExecutor {
    async fn tools(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    async fn execute(&self, call: &ToolCall) -> Result<McpToolResult, McpError> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(delay) = self.delays.get(&call.name) {
            tokio::time::sleep(*delay).await;
        }
        self.replies
            .get(&call.name)
            .map(McpToolResult::text)
            .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))
    }
}

/// One tool of a scripted stdio server.
pub struct ScriptTool<'a> {
    pub name: &'a str,
    pub reply: &'a str,
    /// Seconds to sleep before replying.
    pub delay: u32,
}

impl<'a> ScriptTool<'a> {
    pub fn new(name: &'a str, reply: &'a str) -> Self {
        Self { name, reply, delay: 0 }
    }

    pub fn slow(name: &'a str, reply: &'a str, delay: u32) -> Self {
        Self { name, reply, delay }
    }
}

/// Extra behavior for a scripted stdio server.
#[derive(Default)]
pub struct ScriptOptions<'a> {
    /// Advertise `logging` and answer `logging/setLevel` with one warning
    /// `notifications/message` carrying this text.
    pub log: Option<&'a str>,
    /// A line written to stderr at startup.
    pub stderr: Option<&'a str>,
}

/// Write a `/bin/sh` MCP server speaking newline-delimited JSON-RPC that
/// offers `tools`, and return its path. Run it with `sh <path>`.
pub fn write_stdio_server(dir: &Path, server: &str, tools: &[ScriptTool<'_>]) -> PathBuf {
    write_stdio_server_with(dir, server, tools, &ScriptOptions::default())
}

pub fn write_stdio_server_with(dir: &Path, server: &str, tools: &[ScriptTool<'_>], options: &ScriptOptions<'_>) -> PathBuf {
    let listing: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": format!("{} from {server}", t.name),
                "inputSchema": {"type": "object", "properties": {}},
            })
        })
        .collect();
    let listing = Value::Array(listing).to_string();

    let mut arms = String::new();
    for tool in tools {
        let result = json!({
            "content": [{"type": "text", "text": tool.reply}],
            "isError": false,
        });
        let sleep = if tool.delay > 0 {
            format!("sleep {}; ", tool.delay)
        } else {
            String::new()
        };
        arms.push_str(&format!(
            "    *'\"name\":\"{name}\"'*) {sleep}reply \"$id\" '{result}' ;;\n",
            name = tool.name,
        ));
    }

    let mut capabilities = json!({"tools": {}});
    let mut logging = String::new();
    if let Some(text) = options.log {
        capabilities["logging"] = json!({});
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {"level": "warning", "logger": "disk", "data": text},
        });
        logging = format!(
            "    *'\"method\":\"logging/setLevel\"'*)\n      reply \"$id\" '{{}}'; printf '%s\\n' '{notification}' ;;\n"
        );
    }
    let init = json!({
        "protocolVersion": "2024-11-05",
        "capabilities": capabilities,
        "serverInfo": {"name": server, "version": "1.0.0"},
    });
    let banner = options
        .stderr
        .map(|line| format!("printf '%s\\n' '{line}' >&2\n"))
        .unwrap_or_default();

    let script = format!(
        r#"#!/bin/sh
reply() {{
  printf '{{"jsonrpc":"2.0","id":%s,"result":%s}}\n' "$1" "$2"
}}
{banner}while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  case "$line" in
    *'"method":"initialize"'*)
      reply "$id" '{init}' ;;
    *'"method":"tools/list"'*)
      reply "$id" '{{"tools":{listing}}}' ;;
    *'"method":"ping"'*)
      reply "$id" '{{}}' ;;
{logging}    *'"method":"tools/call"'*)
      case "$line" in
{arms}        *) printf '{{"jsonrpc":"2.0","id":%s,"error":{{"code":-32602,"message":"unknown tool"}}}}\n' "$id" ;;
      esac ;;
    *)
      printf '{{"jsonrpc":"2.0","id":%s,"error":{{"code":-32601,"message":"method not found"}}}}\n' "$id" ;;
  esac
done
"#
    );

    let path = dir.join(format!("{server}.sh"));
    std::fs::write(&path, script).unwrap();
    path
}

/// One event seen by [`LogCapture`].
#[derive(Debug, Clone)]
pub struct CapturedLog {
    pub level: Level,
    /// The `server` field, empty when absent.
    pub server: String,
    pub message: String,
}

#[derive(Default)]
struct CapturedFields {
    server: String,
    message: String,
}

impl Visit for CapturedFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }
}

impl CapturedFields {
    fn record(&mut self, field: &Field, value: String) {
        match field.name() {
            "server" => self.server = value,
            "message" => self.message = value,
            _ => {}
        }
    }
}

/// A `tracing` layer that keeps every event for later assertions.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedLog>>>,
}

impl LogCapture {
    pub fn events(&self) -> Vec<CapturedLog> {
        self.events.lock().unwrap().clone()
    }

    /// Wait up to five seconds for an event matching `predicate`.
    pub async fn wait_for(&self, predicate: impl Fn(&CapturedLog) -> bool) -> CapturedLog {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(found) = self.events().into_iter().find(|e| predicate(e)) {
                return found;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no matching event in {:#?}",
                self.events()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = CapturedFields::default();
        event.record(&mut fields);
        self.events.lock().unwrap().push(CapturedLog {
            level: *event.metadata().level(),
            server: fields.server,
            message: fields.message,
        });
    }
}
