// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The provider-agnostic LLM entry point used by the agent.
//!
//! [`LlmAdapter::send`] forces a tool call on every turn, retries transient
//! failures, resolves cost through the [`CostCatalog`], and redacts
//! credentials from any error it returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::retry::{with_backoff, RetryConfig};
use super::{create_provider, ProviderConfig, ProviderType};
use crate::config::LlmConfig;
use crate::cost::CostCatalog;
use crate::error::ProviderError;
use crate::types::{ChatOptions, LlmResponse, Message, SharedProvider, ToolChoice, ToolDefinition};

/// Sends transcripts to the configured provider.
pub struct LlmAdapter {
    provider: SharedProvider,
    catalog: Arc<CostCatalog>,
    retry: RetryConfig,
    options: ChatOptions,
}

impl LlmAdapter {
    /// Wrap an existing provider with default retry and no optional parameters.
    pub fn new(provider: SharedProvider, catalog: Arc<CostCatalog>) -> Self {
        Self {
            provider,
            catalog,
            retry: RetryConfig::default(),
            options: ChatOptions {
                tool_choice: ToolChoice::Required,
                ..Default::default()
            },
        }
    }

    /// Build the provider named in the configuration.
    pub fn from_config(config: &LlmConfig, catalog: Arc<CostCatalog>) -> Result<Self, ProviderError> {
        if config.provider.trim().is_empty() {
            return Err(ProviderError::NotConfigured("LLM provider is required".to_string()));
        }
        let provider_type: ProviderType = config
            .provider
            .parse()
            .map_err(|e: super::ParseProviderTypeError| ProviderError::NotConfigured(e.to_string()))?;

        let mut provider_config = ProviderConfig::new(config.api_key.clone(), config.model.clone());
        if let Some(ref url) = config.base_url {
            provider_config = provider_config.with_base_url(url.clone());
        }
        if let Some(secs) = config.request_timeout.filter(|s| *s > 0.0) {
            let timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| ProviderError::NotConfigured(format!("invalid request timeout {secs}: {e}")))?;
            provider_config = provider_config.with_timeout(timeout);
        }

        let provider = create_provider(provider_type, provider_config)?;
        Ok(Self::new(provider, catalog)
            .with_retry(config.retry.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sampling temperature; `None` leaves it out of the request.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.options.temperature = temperature;
        self
    }

    /// Completion token limit; `None` leaves it out of the request.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.options.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn catalog(&self) -> &CostCatalog {
        &self.catalog
    }

    /// Send the transcript and tool catalog, returning a response that carries
    /// at least one tool call.
    pub async fn send(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmResponse, ProviderError> {
        let start = Instant::now();

        let raw = with_backoff(&self.retry, || self.provider.chat(messages, tools, &self.options))
            .await
            .map_err(ProviderError::sanitized)?;

        let duration_ms = start.elapsed().as_millis() as u64;

        if !raw.has_tool_calls() {
            return Err(ProviderError::EmptyResponse);
        }

        let mut response = LlmResponse {
            text: raw.content,
            calls: raw.tool_calls,
            usage: raw.usage.unwrap_or_default(),
            tokens: 0,
            cost: 0.0,
            duration_ms,
            approximate: false,
            messages: messages.to_vec(),
        };

        match self.catalog.evaluate(self.model(), &response) {
            Ok(eval) => {
                response.tokens = eval.total_tokens;
                response.cost = eval.cost;
                response.approximate = eval.approximate;
            }
            Err(e) => {
                debug!(model = %self.model(), error = %e, "No pricing for model, cost recorded as zero");
                response.tokens = response.usage.total();
            }
        }

        debug!(
            model = %self.model(),
            calls = response.calls.len(),
            tokens = response.tokens,
            cost = response.cost,
            duration_ms,
            "LLM response"
        );

        Ok(response)
    }
}

impl std::fmt::Debug for LlmAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAdapter")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("retry", &self.retry)
            .field("options", &self.options)
            .finish()
    }
}
