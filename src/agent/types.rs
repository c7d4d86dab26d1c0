// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent types and configuration.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::chat::{TranscriptConfig, DEFAULT_PROMPT_TEMPLATE};
use crate::error::ErrorCategory;
use crate::mcp::{McpError, McpToolResult};
use crate::types::{InputSchema, ToolCall, ToolDefinition, ANSWER_TOOL};

/// Where the agent gets its tools from.
///
/// The [`Connector`](crate::mcp::Connector) is the production implementation;
/// tests plug in in-memory executors.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// The current tool catalog, without the answer tool.
    async fn tools(&self) -> Vec<ToolDefinition>;

    /// Run one tool call.
    async fn execute(&self, call: &ToolCall) -> Result<McpToolResult, McpError>;
}

/// Immutable parameters of every agent run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name of the tool the facade exposes.
    pub tool_name: String,
    /// Description of the exposed tool.
    pub tool_description: String,
    /// Name of the exposed tool's single string argument.
    pub argument_name: String,
    /// Description of that argument.
    pub argument_description: String,
    /// System prompt template. Must reference `argument_name` and `tools`.
    pub prompt_template: String,
    /// Context size that triggers compaction; 0 disables it.
    pub max_tokens: u32,
    /// Upper bound on LLM round trips per request.
    pub max_iterations: u32,
    /// Cost ceiling in USD per request; 0 means unlimited.
    pub request_budget: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tool_name: "ask".to_string(),
            tool_description: "Answer a natural-language request using the available tools.".to_string(),
            argument_name: "query".to_string(),
            argument_description: "The request to answer.".to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_tokens: 0,
            max_iterations: 10,
            request_budget: 0.0,
        }
    }
}

impl AgentConfig {
    pub(crate) fn transcript_config(&self) -> TranscriptConfig {
        TranscriptConfig {
            template: self.prompt_template.clone(),
            argument_name: self.argument_name.clone(),
            max_tokens: self.max_tokens,
            request_budget: self.request_budget,
        }
    }
}

/// The built-in tool the model calls to finish a run.
pub fn answer_tool() -> ToolDefinition {
    ToolDefinition::new(
        ANSWER_TOOL,
        "Deliver the final answer to the user. Call this once you have everything you need.",
    )
    .with_schema(
        InputSchema::new()
            .with_property(
                "text",
                json!({"type": "string", "description": "The complete final answer."}),
            )
            .with_required(vec!["text".to_string()]),
    )
}

/// Totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub duration_ms: u64,
    pub iterations: u32,
    /// Whether any token count in the run was estimated.
    pub approximate: bool,
}

/// How a run ended.
///
/// Budget exhaustion, iteration exhaustion and an empty LLM response are not
/// faults of the system; they end the run with a [`RunOutcome::ToolError`]
/// that the facade reports as an error-marked tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Answer { text: String, meta: RunMeta },
    ToolError {
        message: String,
        category: ErrorCategory,
        meta: RunMeta,
    },
}

impl RunOutcome {
    pub fn meta(&self) -> &RunMeta {
        match self {
            Self::Answer { meta, .. } | Self::ToolError { meta, .. } => meta,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer { .. })
    }

    /// The answer text or the error message.
    pub fn text(&self) -> &str {
        match self {
            Self::Answer { text, .. } => text,
            Self::ToolError { message, .. } => message,
        }
    }
}
