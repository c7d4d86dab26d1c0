// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the agent orchestrator.
//!
//! Each subsystem has its own `thiserror` enum. Every enum can be classified
//! into an [`ErrorCategory`], which drives retry decisions in the LLM adapter
//! and how failures are reported at the MCP boundary.

use std::fmt;

use thiserror::Error;

use crate::mcp::McpError;
use crate::providers::sanitize::sanitize;

/// Broad classification shared by every error in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Contract violation by the caller or the configuration.
    Validation,
    /// Retryable I/O fault.
    Transient,
    /// Fault in a downstream service.
    External,
    /// Bug or broken invariant.
    Internal,
    /// Unclassified.
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::External => "external",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("empty-response: LLM returned no tool calls")]
    EmptyResponse,

    #[error("failed after {retries} retries: {last}")]
    RetriesExhausted {
        retries: u32,
        last: Box<ProviderError>,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create an API error without status code.
    pub fn api_message(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: None,
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthError(_)
            | Self::ModelNotFound(_)
            | Self::InvalidRequest(_)
            | Self::NotConfigured(_) => ErrorCategory::Validation,
            Self::RateLimited(_)
            | Self::NetworkError(_)
            | Self::Timeout(_)
            | Self::RetriesExhausted { .. } => ErrorCategory::Transient,
            Self::ApiError { status_code, .. } => match status_code {
                Some(code) if *code >= 500 => ErrorCategory::Transient,
                _ => ErrorCategory::External,
            },
            Self::ParseError(_) => ErrorCategory::External,
            Self::EmptyResponse => ErrorCategory::Internal,
            Self::Cancelled => ErrorCategory::Unknown,
        }
    }

    /// Check if this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::RetriesExhausted { .. }) && self.category() == ErrorCategory::Transient
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Redact credentials from every message this error carries.
    ///
    /// The variant, and therefore the category, is unchanged.
    pub fn sanitized(self) -> Self {
        match self {
            Self::AuthError(m) => Self::AuthError(sanitize(&m)),
            Self::ApiError { message, status_code } => Self::ApiError {
                message: sanitize(&message),
                status_code,
            },
            Self::RateLimited(m) => Self::RateLimited(sanitize(&m)),
            Self::ModelNotFound(m) => Self::ModelNotFound(sanitize(&m)),
            Self::InvalidRequest(m) => Self::InvalidRequest(sanitize(&m)),
            Self::NetworkError(m) => Self::NetworkError(sanitize(&m)),
            Self::ParseError(m) => Self::ParseError(sanitize(&m)),
            Self::NotConfigured(m) => Self::NotConfigured(sanitize(&m)),
            Self::RetriesExhausted { retries, last } => Self::RetriesExhausted {
                retries,
                last: Box::new(last.sanitized()),
            },
            other @ (Self::Timeout(_) | Self::EmptyResponse | Self::Cancelled) => other,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors that end an agent run.
///
/// Budget, iteration and empty-response terminations are reported to the
/// MCP caller as error-marked tool results, not as protocol errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{}", .0)]
    Provider(#[from] ProviderError),

    #[error("{}", .0)]
    Tool(#[from] McpError),

    #[error("exceeded request budget: total cost {cost:.4} > budget {budget:.4}")]
    BudgetExceeded { cost: f64, budget: f64 },

    #[error("exceeded maximum number of LLM iterations ({0})")]
    MaxIterationsExceeded(u32),

    #[error("LLM returned no tool calls")]
    EmptyResponse,

    #[error("agent run cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl AgentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Provider(e) => e.category(),
            Self::Tool(e) => e.category(),
            Self::BudgetExceeded { .. } | Self::MaxIterationsExceeded(_) => ErrorCategory::Validation,
            Self::EmptyResponse | Self::InvalidState(_) => ErrorCategory::Internal,
            Self::Cancelled => ErrorCategory::Unknown,
        }
    }

    /// Whether this is one of the loop's own termination conditions.
    pub fn is_termination(&self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded { .. } | Self::MaxIterationsExceeded(_) | Self::EmptyResponse
        )
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
