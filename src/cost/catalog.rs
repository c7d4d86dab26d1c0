// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Built-in model price table with alias-aware lookup.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::estimate::{estimate_messages, estimate_tokens};
use super::CostError;
use crate::types::LlmResponse;

const PER_MILLION: f64 = 1_000_000.0;

/// Pricing and limits for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    /// Canonical model name.
    pub name: String,
    /// Alternative names that resolve to this model.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Provider that serves the model.
    #[serde(default)]
    pub provider: String,
    /// USD per million prompt tokens.
    pub prompt_per_million: f64,
    /// USD per million completion tokens.
    pub completion_per_million: f64,
    /// Context window in tokens.
    #[serde(default)]
    pub context_window: u32,
    /// Maximum completion tokens.
    #[serde(default)]
    pub max_output_tokens: u32,
}

impl ModelCost {
    pub fn new(name: impl Into<String>, prompt_per_million: f64, completion_per_million: f64) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            provider: String::new(),
            prompt_per_million,
            completion_per_million,
            context_window: 0,
            max_output_tokens: 0,
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_limits(mut self, context_window: u32, max_output_tokens: u32) -> Self {
        self.context_window = context_window;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// USD cost of the given token counts.
    pub fn price(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        prompt_tokens as f64 * self.prompt_per_million / PER_MILLION
            + completion_tokens as f64 * self.completion_per_million / PER_MILLION
    }
}

/// Token and cost figures for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost: f64,
    /// True when the counts were estimated from text length.
    pub approximate: bool,
}

static BUILTIN: Lazy<CostCatalog> = Lazy::new(|| {
    let openai = |m: ModelCost| m.with_provider("openai");
    let anthropic = |m: ModelCost| m.with_provider("anthropic");
    CostCatalog::from_models(vec![
        openai(ModelCost::new("gpt-4o", 2.5, 10.0))
            .with_aliases(&["gpt-4o-2024-08-06", "gpt-4o-2024-11-20", "chatgpt-4o-latest"])
            .with_limits(128_000, 16_384),
        openai(ModelCost::new("gpt-4o-mini", 0.15, 0.6))
            .with_aliases(&["gpt-4o-mini-2024-07-18"])
            .with_limits(128_000, 16_384),
        openai(ModelCost::new("gpt-4.1", 2.0, 8.0))
            .with_aliases(&["gpt-4.1-2025-04-14"])
            .with_limits(1_047_576, 32_768),
        openai(ModelCost::new("gpt-4.1-mini", 0.4, 1.6))
            .with_aliases(&["gpt-4.1-mini-2025-04-14"])
            .with_limits(1_047_576, 32_768),
        openai(ModelCost::new("gpt-4.1-nano", 0.1, 0.4))
            .with_aliases(&["gpt-4.1-nano-2025-04-14"])
            .with_limits(1_047_576, 32_768),
        openai(ModelCost::new("o3-mini", 1.1, 4.4))
            .with_aliases(&["o3-mini-2025-01-31"])
            .with_limits(200_000, 100_000),
        openai(ModelCost::new("gpt-4-turbo", 10.0, 30.0))
            .with_aliases(&["gpt-4-turbo-2024-04-09", "gpt-4-turbo-preview"])
            .with_limits(128_000, 4_096),
        openai(ModelCost::new("gpt-3.5-turbo", 0.5, 1.5))
            .with_aliases(&["gpt-3.5-turbo-0125"])
            .with_limits(16_385, 4_096),
        anthropic(ModelCost::new("claude-opus-4", 15.0, 75.0))
            .with_aliases(&["claude-opus-4-20250514", "claude-opus-4-0"])
            .with_limits(200_000, 32_000),
        anthropic(ModelCost::new("claude-sonnet-4", 3.0, 15.0))
            .with_aliases(&["claude-sonnet-4-20250514", "claude-sonnet-4-0"])
            .with_limits(200_000, 64_000),
        anthropic(ModelCost::new("claude-3-7-sonnet", 3.0, 15.0))
            .with_aliases(&["claude-3-7-sonnet-20250219", "claude-3-7-sonnet-latest"])
            .with_limits(200_000, 64_000),
        anthropic(ModelCost::new("claude-3-5-sonnet", 3.0, 15.0))
            .with_aliases(&[
                "claude-3-5-sonnet-20241022",
                "claude-3-5-sonnet-20240620",
                "claude-3-5-sonnet-latest",
            ])
            .with_limits(200_000, 8_192),
        anthropic(ModelCost::new("claude-3-5-haiku", 0.8, 4.0))
            .with_aliases(&["claude-3-5-haiku-20241022", "claude-3-5-haiku-latest"])
            .with_limits(200_000, 8_192),
        anthropic(ModelCost::new("claude-3-opus", 15.0, 75.0))
            .with_aliases(&["claude-3-opus-20240229", "claude-3-opus-latest"])
            .with_limits(200_000, 4_096),
        anthropic(ModelCost::new("claude-3-haiku", 0.25, 1.25))
            .with_aliases(&["claude-3-haiku-20240307"])
            .with_limits(200_000, 4_096),
    ])
});

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Model price catalog.
#[derive(Debug, Clone, Default)]
pub struct CostCatalog {
    models: Vec<ModelCost>,
    index: HashMap<String, usize>,
}

impl CostCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in OpenAI and Anthropic price table.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn from_models(models: Vec<ModelCost>) -> Self {
        models.into_iter().fold(Self::new(), |c, m| c.with_model(m))
    }

    /// Register a model. Names already present are re-pointed at the new entry.
    pub fn with_model(mut self, model: ModelCost) -> Self {
        self.insert(model);
        self
    }

    pub fn insert(&mut self, model: ModelCost) {
        let slot = self.models.len();
        for key in std::iter::once(&model.name).chain(model.aliases.iter()) {
            self.index.insert(normalize(key), slot);
        }
        self.models.push(model);
    }

    /// Find a model by canonical name or alias, ignoring case and surrounding whitespace.
    pub fn lookup(&self, name: &str) -> Option<&ModelCost> {
        self.index.get(&normalize(name)).map(|&i| &self.models[i])
    }

    /// Number of distinct models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// USD cost of a prompt/completion pair.
    pub fn cost(&self, model: &str, prompt_tokens: u32, completion_tokens: u32) -> Result<f64, CostError> {
        self.lookup(model)
            .map(|m| m.price(prompt_tokens, completion_tokens))
            .ok_or_else(|| CostError::UnknownModel(model.to_string()))
    }

    /// Resolve tokens and cost for a response.
    ///
    /// Reported usage is used when its total is non-zero. Otherwise the prompt
    /// is estimated from the request messages and the completion from the
    /// response text, and the evaluation is marked approximate.
    pub fn evaluate(&self, model: &str, response: &LlmResponse) -> Result<Evaluation, CostError> {
        let entry = self
            .lookup(model)
            .ok_or_else(|| CostError::UnknownModel(model.to_string()))?;

        let (prompt, completion, approximate) = if response.usage.total() != 0 {
            (response.usage.input_tokens, response.usage.output_tokens, false)
        } else {
            (
                estimate_messages(&response.messages),
                estimate_tokens(&response.text),
                true,
            )
        };

        Ok(Evaluation {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
            cost: entry.price(prompt, completion),
            approximate,
        })
    }
}
