// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry initialization and configuration.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogConfig, LogFormat};
use crate::error::ConfigError;
use crate::mcp::McpLogLevel;
use crate::server::{LogControl, McpLogLayer};

/// Where formatted log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogOutput {
    /// `stdout`, `stderr` (also the empty string), or a file path.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "stderr" => Self::Stderr,
            "stdout" => Self::Stdout,
            path => Self::File(PathBuf::from(path)),
        }
    }

    fn is_terminal(&self) -> bool {
        match self {
            Self::Stdout => io::stdout().is_terminal(),
            Self::Stderr => io::stderr().is_terminal(),
            Self::File(_) => false,
        }
    }

    fn make_writer(&self) -> io::Result<BoxMakeWriter> {
        Ok(match self {
            Self::Stdout => BoxMakeWriter::new(io::stdout),
            Self::Stderr => BoxMakeWriter::new(io::stderr),
            Self::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                BoxMakeWriter::new(Arc::new(file))
            }
        })
    }
}

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Text, JSON, or text with colors on a terminal.
    pub format: LogFormat,

    pub output: LogOutput,

    /// Whether to include target module path.
    pub include_target: bool,

    /// Install the layer that forwards records to MCP clients.
    pub forward_to_mcp: bool,

    /// Custom filter directive (overrides default_level).
    pub filter_directive: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            format: LogFormat::Auto,
            output: LogOutput::Stderr,
            include_target: true,
            forward_to_mcp: true,
            filter_directive: None,
        }
    }
}

impl TelemetryConfig {
    /// Build from `runtime.log`. When serving stdio, stdout carries the
    /// protocol, so log output is moved to stderr.
    pub fn from_config(log: &LogConfig, serving_stdio: bool) -> Result<Self, ConfigError> {
        let default_level = parse_level(&log.default_level)
            .ok_or_else(|| ConfigError::invalid("runtime.log.defaultLevel", format!("unknown level '{}'", log.default_level)))?;
        let mut output = LogOutput::parse(&log.output);
        if serving_stdio && output == LogOutput::Stdout {
            output = LogOutput::Stderr;
        }
        Ok(Self {
            default_level,
            format: log.format,
            output,
            include_target: true,
            forward_to_mcp: !log.disable_mcp,
            filter_directive: None,
        })
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set a custom filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }
}

/// Parse a level name. Accepts `warning` as well as `warn`.
pub fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn level_directive(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

/// Handle kept by the binary after initialization.
///
/// Carries the [`LogControl`] that the MCP facade attaches itself to.
#[derive(Debug, Clone)]
pub struct TelemetryGuard {
    log_control: Arc<LogControl>,
}

impl TelemetryGuard {
    pub fn log_control(&self) -> Arc<LogControl> {
        self.log_control.clone()
    }
}

/// Initialize telemetry with the given configuration.
///
/// This should be called once at application startup. `RUST_LOG` takes
/// precedence over the configured level until a client calls
/// `logging/setLevel`.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let filter = match &config.filter_directive {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(level_directive(config.default_level))),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level_directive(config.default_level))),
    };
    let (filter, filter_handle) = reload::Layer::new(filter);

    let log_control = Arc::new(LogControl::new(McpLogLevel::from_tracing(&config.default_level)));
    log_control.set_filter_reload(move |level| {
        filter_handle
            .reload(EnvFilter::new(level_directive(level)))
            .map_err(|e| e.to_string())
    });

    let writer = config.output.make_writer()?;
    let (json_layer, text_layer) = match config.format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_target(config.include_target)
                    .with_writer(writer),
            ),
            None,
        ),
        LogFormat::Text | LogFormat::Auto => {
            let ansi = config.format == LogFormat::Auto && config.output.is_terminal();
            (
                None,
                Some(
                    fmt::layer()
                        .compact()
                        .with_ansi(ansi)
                        .with_target(config.include_target)
                        .with_writer(writer),
                ),
            )
        }
    };
    let mcp_layer = config
        .forward_to_mcp
        .then(|| McpLogLayer::new(log_control.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(mcp_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(TelemetryGuard { log_control })
}
