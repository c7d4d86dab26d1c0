// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! LLM provider implementations and the adapter the agent talks to.
//!
//! - [`anthropic::AnthropicProvider`] - Claude models via the Messages API
//! - [`openai::OpenAIProvider`] - OpenAI Chat Completions and compatible APIs
//! - [`adapter::LlmAdapter`] - retry, timing, cost and sanitization around a provider
//!
//! # Example
//!
//! ```rust,ignore
//! use spl_agent::providers::{create_provider, ProviderConfig, ProviderType};
//!
//! let config = ProviderConfig::new("your-api-key", "gpt-4o");
//! let provider = create_provider(ProviderType::OpenAI, config)?;
//! ```

pub mod adapter;
pub mod anthropic;
pub mod openai;
pub mod retry;
pub mod sanitize;

pub use adapter::LlmAdapter;
pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;
pub use retry::RetryConfig;
pub use sanitize::sanitize;

use std::sync::Arc;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::SharedProvider;

/// Supported provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Anthropic Claude models
    Anthropic,
    /// OpenAI GPT models
    OpenAI,
}

impl ProviderType {
    /// Get the default base URL for this provider.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => anthropic::ANTHROPIC_BASE_URL,
            Self::OpenAI => openai::OPENAI_BASE_URL,
        }
    }
}

/// Error type for parsing a provider type from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProviderTypeError(pub String);

impl std::fmt::Display for ParseProviderTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported provider '{}' (expected openai or anthropic)", self.0)
    }
}

impl std::error::Error for ParseProviderTypeError {}

impl std::str::FromStr for ProviderType {
    type Err = ParseProviderTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "gpt" => Ok(Self::OpenAI),
            _ => Err(ParseProviderTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

/// Connection settings for a provider instance.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the HTTP timeout for a single request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Create a provider instance from type and configuration.
///
/// # Errors
///
/// Returns [`ProviderError::NotConfigured`] when the API key or model is empty.
pub fn create_provider(provider_type: ProviderType, config: ProviderConfig) -> Result<SharedProvider, ProviderError> {
    if config.api_key.trim().is_empty() {
        return Err(ProviderError::NotConfigured(format!("API key required for {provider_type}")));
    }
    if config.model.trim().is_empty() {
        return Err(ProviderError::NotConfigured(format!("model required for {provider_type}")));
    }

    let base_url = config
        .base_url
        .unwrap_or_else(|| provider_type.default_base_url().to_string());

    Ok(match provider_type {
        ProviderType::Anthropic => Arc::new(AnthropicProvider::new(
            config.api_key,
            config.model,
            base_url,
            config.timeout,
        )?),
        ProviderType::OpenAI => Arc::new(OpenAIProvider::new(
            config.api_key,
            config.model,
            base_url,
            config.timeout,
        )?),
    })
}
