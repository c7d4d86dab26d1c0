// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! spl-agent main entry point - CLI, commands, and server assembly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use tokio::signal;
use tracing::{info, warn};

use spl_agent::agent::Agent;
use spl_agent::config::{self, AppConfig, CliOptions, LoadedConfig};
use spl_agent::mcp::Connector;
use spl_agent::providers::{sanitize, LlmAdapter};
use spl_agent::server::{McpServer, ServerSettings};
use spl_agent::telemetry::{init_telemetry, TelemetryConfig};

/// spl-agent version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// spl-agent - answer MCP tool calls with an LLM agent.
#[derive(Parser)]
#[command(name = "spl-agent")]
#[command(author, version, about = "An MCP server that answers requests with an LLM agent", long_about = None)]
struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve over HTTP/SSE instead of stdio
    #[arg(short, long)]
    daemon: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Subcommands for spl-agent.
#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, then print a summary
    Validate,

    /// Connect to the configured MCP servers and list their tools
    Tools {
        /// Print the catalog as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let options = CliOptions {
        daemon: cli.daemon,
        log_level: cli.log_level.clone(),
    };

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("spl-agent {VERSION}");
            Ok(())
        }
        Some(Commands::Validate) => validate(cli.config.as_deref(), &options),
        Some(Commands::Tools { json }) => list_tools(cli.config.as_deref(), &options, json).await,
        None => serve(cli.config.as_deref(), &options).await,
    };

    // errors can carry provider or server messages
    result.map_err(|e| anyhow::anyhow!(sanitize(&format!("{e:#}"))))
}

fn validate(path: Option<&Path>, options: &CliOptions) -> anyhow::Result<()> {
    let LoadedConfig { config, source } = config::load_config(path, options)?;

    println!("{}", "✓ Configuration is valid".green().bold());
    match source {
        Some(path) => println!("  {} {}", "Source:".dimmed(), path.display()),
        None => println!("  {} defaults and environment", "Source:".dimmed()),
    }
    println!("  {} {}", "Transport:".dimmed(), transport_summary(&config));
    println!(
        "  {} {} ({})",
        "LLM:".dimmed(),
        config.agent.llm.model.cyan(),
        config.agent.llm.provider
    );
    println!(
        "  {} {}({})",
        "Tool:".dimmed(),
        config.agent.tool.name.cyan(),
        config.agent.tool.argument_name
    );
    println!(
        "  {} max {} iterations, budget {}",
        "Limits:".dimmed(),
        config.agent.chat.max_llm_iterations,
        if config.agent.chat.request_budget > 0.0 {
            format!("${:.4}", config.agent.chat.request_budget)
        } else {
            "unlimited".to_string()
        }
    );
    let servers = &config.agent.connections.mcp_servers;
    println!("  {} {}", "MCP servers:".dimmed(), servers.len());
    for id in servers.keys() {
        println!("    - {id}");
    }
    Ok(())
}

fn transport_summary(config: &AppConfig) -> String {
    let transports = &config.runtime.transports;
    if transports.http.enabled {
        format!("http/sse on {}:{}", transports.http.host, transports.http.port)
    } else {
        format!("stdio (buffer {} bytes)", transports.stdio.buffer_size)
    }
}

async fn list_tools(path: Option<&Path>, options: &CliOptions, json: bool) -> anyhow::Result<()> {
    let LoadedConfig { config, .. } = config::load_config(path, options)?;
    let mut telemetry = TelemetryConfig::from_config(&config.runtime.log, true)?;
    telemetry.forward_to_mcp = false;
    init_telemetry(&telemetry)?;

    let connector = Connector::connect_with_retry(
        &config.agent.connections.mcp_servers,
        &config.implementation(),
        &config.agent.connections.retry,
    )
    .await
    .context("failed to connect MCP servers")?;
    let tools = connector.all_tools().await;
    connector.close().await;

    if json {
        let catalog: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "server": tool.server,
                    "name": tool.name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("{}", format!("{} tools", tools.len()).bright_blue().bold());
    for tool in &tools {
        println!(
            "  {} {} {}",
            tool.name.cyan(),
            format!("[{}]", tool.server).dimmed(),
            tool.description.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

async fn serve(path: Option<&Path>, options: &CliOptions) -> anyhow::Result<()> {
    let LoadedConfig { config, source } = config::load_config(path, options)?;
    let serving_stdio = config.runtime.transports.stdio.enabled;
    let telemetry = init_telemetry(&TelemetryConfig::from_config(&config.runtime.log, serving_stdio)?)?;
    info!(
        version = VERSION,
        source = %source.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
        transport = %transport_summary(&config),
        "Starting spl-agent"
    );

    let catalog = Arc::new(config.cost_catalog());
    let adapter = Arc::new(LlmAdapter::from_config(&config.agent.llm, catalog)?);
    let connector = Arc::new(
        Connector::connect_with_retry(
            &config.agent.connections.mcp_servers,
            &config.implementation(),
            &config.agent.connections.retry,
        )
        .await
        .context("failed to connect MCP servers")?,
    );

    let agent = Agent::new(config.agent_config(), adapter, connector.clone());
    let server = Arc::new(McpServer::new(
        ServerSettings::from_config(&config),
        Arc::new(agent),
        telemetry.log_control(),
    )?);
    if server.settings().logging {
        telemetry.log_control().attach(server.clone());
    }

    let result = server.serve(shutdown_signal()).await;

    telemetry.log_control().detach();
    connector.close().await;
    info!("Shutdown complete");
    result.map_err(Into::into)
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
