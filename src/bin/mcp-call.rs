// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! mcp-call - call one tool on one MCP server from the command line.
//!
//! Exit codes: 0 on success, 1 for user or configuration errors (bad
//! arguments, unknown tool, tool reported an error), 2 for internal errors
//! (connection, protocol, timeouts).

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use serde_json::{json, Value};
use tracing::Level;

use spl_agent::mcp::{Implementation, McpClient, McpError, McpToolInfo, ServerConfig};
use spl_agent::providers::sanitize;
use spl_agent::server::Envelope;
use spl_agent::telemetry::{init_telemetry, TelemetryConfig};

/// Call a tool on an MCP server.
#[derive(Parser, Debug)]
#[command(name = "mcp-call")]
#[command(author, version, about = "Call a tool on an MCP server", long_about = None)]
struct Cli {
    /// Command that starts a stdio server
    #[arg(long, conflicts_with = "url", required_unless_present = "url")]
    command: Option<String>,

    /// Argument for the server command (repeatable)
    #[arg(long = "arg", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Environment variable for the server process, as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// URL of an SSE server
    #[arg(long)]
    url: Option<String>,

    /// Bearer token for the SSE server
    #[arg(long, requires = "url")]
    api_key: Option<String>,

    /// Tool to call
    #[arg(long, required_unless_present = "list")]
    tool: Option<String>,

    /// Tool arguments as a JSON object
    #[arg(long = "args", default_value = "{}")]
    args_json: String,

    /// List the server's tools instead of calling one
    #[arg(long)]
    list: bool,

    /// Seconds allowed for connecting and initializing
    #[arg(long, default_value_t = 10.0)]
    init_timeout: f64,

    /// Seconds allowed for listing tools
    #[arg(long, default_value_t = 10.0)]
    list_timeout: f64,

    /// Seconds allowed for the tool call
    #[arg(long, default_value_t = 30.0)]
    call_timeout: f64,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Why the call failed, which decides the exit code.
#[derive(Debug)]
enum Failure {
    User(String),
    Internal(String),
}

impl Failure {
    fn exit_code(&self) -> ExitCode {
        match self {
            Self::User(_) => ExitCode::from(1),
            Self::Internal(_) => ExitCode::from(2),
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::User(m) | Self::Internal(m) => m,
        }
    }
}

impl From<McpError> for Failure {
    fn from(err: McpError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let telemetry = TelemetryConfig {
        default_level: Level::WARN,
        forward_to_mcp: false,
        ..Default::default()
    };
    if let Err(e) = init_telemetry(&telemetry) {
        eprintln!("warning: logging unavailable: {e}");
    }

    match run(&cli).await {
        Ok(code) => code,
        Err(failure) => {
            let message = sanitize(failure.message());
            if cli.json {
                let envelope = match failure {
                    Failure::User(_) => Envelope::failure(spl_agent::ErrorCategory::Validation, &message, None),
                    Failure::Internal(_) => Envelope::failure(spl_agent::ErrorCategory::Internal, &message, None),
                };
                println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
            } else {
                eprintln!("{} {}", "Error:".red().bold(), message);
            }
            failure.exit_code()
        }
    }
}

async fn run(cli: &Cli) -> Result<ExitCode, Failure> {
    let arguments: Value = if cli.list {
        Value::Null
    } else {
        match serde_json::from_str(&cli.args_json) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => return Err(Failure::User("--args must be a JSON object".to_string())),
            Err(e) => return Err(Failure::User(format!("invalid --args: {e}"))),
        }
    };

    let config = server_config(cli);
    let info = Implementation::new("mcp-call", env!("CARGO_PKG_VERSION"));
    let client = McpClient::connect_with_timeout("target", &config, &info, seconds(cli.init_timeout)?)
        .await
        .map_err(|e| match e {
            McpError::Config(m) => Failure::User(m),
            other => other.into(),
        })?;

    let outcome = call(cli, &client, arguments).await;
    if let Err(e) = client.close().await {
        tracing::debug!(error = %e, "Error closing server");
    }
    outcome
}

async fn call(cli: &Cli, client: &McpClient, arguments: Value) -> Result<ExitCode, Failure> {
    let tools = tokio::time::timeout(seconds(cli.list_timeout)?, client.list_tools())
        .await
        .map_err(|_| Failure::Internal(format!("listing tools timed out after {} seconds", cli.list_timeout)))??;

    if cli.list {
        print_tools(&tools, cli.json);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(name) = cli.tool.as_deref() else {
        return Err(Failure::User("--tool is required".to_string()));
    };
    if !tools.iter().any(|t| t.name == name) {
        return Err(Failure::User(format!("unknown tool: {name}")));
    }

    let result = client
        .call_tool_with_timeout(name, arguments, seconds(cli.call_timeout)?)
        .await?;

    if cli.json {
        let envelope = Envelope::from_tool_result(&result);
        println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default());
    } else if result.is_error {
        eprintln!("{} {}", "Tool error:".red().bold(), sanitize(&result.as_text()));
    } else {
        println!("{}", result.as_text());
    }
    Ok(if result.is_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn server_config(cli: &Cli) -> ServerConfig {
    match (&cli.command, &cli.url) {
        (Some(command), _) => ServerConfig::stdio(command)
            .with_args(cli.args.iter().cloned())
            .with_env(cli.env.iter().cloned()),
        (None, Some(url)) => {
            let config = ServerConfig::sse(url);
            match &cli.api_key {
                Some(key) => config.with_api_key(key),
                None => config,
            }
        }
        (None, None) => ServerConfig::default(),
    }
}

fn seconds(value: f64) -> Result<Duration, Failure> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(Failure::User(format!("timeouts must be positive, got {value}"))),
    }
}

fn print_tools(tools: &[McpToolInfo], as_json: bool) {
    if as_json {
        let list: Vec<Value> = tools
            .iter()
            .map(|t| json!({"name": t.name, "description": t.description, "inputSchema": t.input_schema}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list).unwrap_or_default());
        return;
    }
    for tool in tools {
        println!(
            "{} {}",
            tool.name.cyan().bold(),
            tool.description.as_deref().unwrap_or_default()
        );
    }
}
