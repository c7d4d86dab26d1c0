// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging infrastructure.
//!
//! One global `tracing` subscriber, built from `runtime.log`:
//!
//! - **Filter**: `RUST_LOG`, else `defaultLevel`; reloadable through
//!   `logging/setLevel`
//! - **Formatter**: compact text or JSON, to stdout, stderr or a file
//! - **MCP forwarding**: records sent to connected clients as
//!   `notifications/message` (unless `disableMCP`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use spl_agent::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let guard = init_telemetry(&TelemetryConfig::from_config(&config.runtime.log, true)?)?;
//! // later, once the facade exists
//! guard.log_control().attach(server.clone());
//! ```

mod init;

pub use init::{init_telemetry, parse_level, LogOutput, TelemetryConfig, TelemetryGuard};
