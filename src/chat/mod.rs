// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-request conversation state.
//!
//! A [`Transcript`] starts with a rendered system prompt and grows by
//! assistant turns, tool calls and tool results. It tracks the running token
//! count and cost so the agent can enforce the request budget, and it can
//! compact itself when the estimated context size passes `max_tokens`.

pub mod compaction;
pub mod prompt;

pub use compaction::{CompactionStrategy, DeleteOld};
pub use prompt::{render_system_prompt, render_tools, validate_template, TemplateError, DEFAULT_PROMPT_TEMPLATE};

use serde::Serialize;
use tracing::debug;

use crate::cost::estimate_messages;
use crate::mcp::McpToolResult;
use crate::types::{ContentBlock, LlmResponse, Message, Role, ToolCall, ToolDefinition};

/// Settings a transcript is created from.
#[derive(Debug, Clone)]
pub struct TranscriptConfig {
    pub template: String,
    pub argument_name: String,
    /// Context size that triggers compaction; 0 disables it.
    pub max_tokens: u32,
    /// Cost ceiling for the request; 0 means unlimited.
    pub request_budget: f64,
}

/// Counters reported for a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptInfo {
    pub messages: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub max_tokens: u32,
    pub request_budget: f64,
}

/// Ordered conversation for a single agent request.
pub struct Transcript {
    messages: Vec<Message>,
    total_tokens: u64,
    total_cost: f64,
    max_tokens: u32,
    request_budget: f64,
    strategy: Box<dyn CompactionStrategy>,
}

impl Transcript {
    /// Render the system prompt and start a new transcript.
    ///
    /// The system prompt is the first message and is never removed. The query
    /// follows as a user message.
    pub fn begin(config: &TranscriptConfig, query: &str, tools: &[ToolDefinition]) -> Result<Self, TemplateError> {
        let system = render_system_prompt(&config.template, &config.argument_name, query, tools)?;
        Ok(Self {
            messages: vec![Message::system(system), Message::user(query)],
            total_tokens: 0,
            total_cost: 0.0,
            max_tokens: config.max_tokens,
            request_budget: config.request_budget,
            strategy: Box::new(DeleteOld),
        })
    }

    pub fn with_strategy(mut self, strategy: impl CompactionStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Record an assistant turn: its text, its tool calls, and its usage.
    pub fn append_assistant(&mut self, response: &LlmResponse) {
        self.total_tokens += u64::from(response.tokens);
        self.total_cost += response.cost;

        let mut blocks = Vec::with_capacity(response.calls.len() + 1);
        if !response.text.is_empty() {
            blocks.push(ContentBlock::text(&response.text));
        }
        blocks.extend(
            response
                .calls
                .iter()
                .map(|call| ContentBlock::tool_use(&call.id, &call.name, call.input.clone())),
        );
        if !blocks.is_empty() {
            self.messages.push(Message::with_blocks(Role::Assistant, blocks));
        }
    }

    /// Record a tool call unless a call with the same id is already present.
    ///
    /// Returns whether a message was added.
    pub fn append_tool_call(&mut self, call: &ToolCall) -> bool {
        if self.has_call(&call.id) {
            return false;
        }
        self.messages.push(Message::with_blocks(
            Role::Assistant,
            vec![ContentBlock::tool_use(&call.id, &call.name, call.input.clone())],
        ));
        true
    }

    /// Record the outcome of a tool call.
    pub fn append_tool_result(&mut self, call: &ToolCall, result: &McpToolResult) {
        let content = if result.is_error {
            format!("Error: {}", result.as_text())
        } else {
            format!("Result: {}", result.as_text())
        };
        self.messages.push(Message::with_blocks(
            Role::Tool,
            vec![ContentBlock::tool_result(&call.id, content, result.is_error)],
        ));
    }

    fn has_call(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.tool_use_ids().any(|existing| existing == id))
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn info(&self) -> TranscriptInfo {
        TranscriptInfo {
            messages: self.messages.len(),
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            max_tokens: self.max_tokens,
            request_budget: self.request_budget,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// True when a positive budget has been passed. A zero budget never trips.
    pub fn budget_exceeded(&self) -> bool {
        self.request_budget > 0.0 && self.total_cost > self.request_budget
    }

    /// Compact when the estimated context size exceeds `max_tokens`.
    ///
    /// Returns whether anything was removed.
    pub fn compact_if_needed(&mut self) -> bool {
        if self.max_tokens == 0 {
            return false;
        }
        let current = estimate_messages(&self.messages) as usize;
        let max = self.max_tokens as usize;
        if current <= max {
            return false;
        }

        let before = self.messages.len();
        let (messages, tokens) = self.strategy.compact(&self.messages, current, max);
        self.messages = messages;
        debug!(before, after = self.messages.len(), tokens, max, "Compacted transcript");
        self.messages.len() < before
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript").field("info", &self.info()).finish()
    }
}
