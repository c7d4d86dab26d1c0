// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Anthropic Claude provider implementation.
//!
//! Uses the Messages API. System messages are lifted into the top-level
//! `system` field and tool results travel as `user` turns, so consecutive
//! turns with the same API role are merged into one message.
//!
//! See [Anthropic Messages API](https://docs.anthropic.com/en/api/messages) for details.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{
    ChatOptions, ContentBlock, ContentBlockType, Message, MessageContent, Provider,
    ProviderResponse, Role, TokenUsage, ToolCall, ToolChoice, ToolDefinition,
};

/// Default Anthropic API base URL.
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Max tokens sent when none is configured; the API requires the field.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Model identifier (e.g., "claude-sonnet-4-20250514")
    /// * `base_url` - API base URL
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build the request body for the Messages API.
    fn build_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> AnthropicRequest {
        let system: Vec<String> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(crate::cost::message_text)
            .collect();

        let mut api_messages: Vec<ApiMessage> = Vec::new();
        for msg in messages.iter().filter(|m| m.role != Role::System) {
            let role = match msg.role {
                Role::Assistant => "assistant",
                _ => "user",
            };
            let blocks: Vec<ApiContentBlock> = match &msg.content {
                MessageContent::Text(s) => vec![ApiContentBlock::from(&ContentBlock::text(s.clone()))],
                MessageContent::Blocks(blocks) => blocks.iter().map(ApiContentBlock::from).collect(),
            };
            match api_messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => api_messages.push(ApiMessage {
                    role: role.to_string(),
                    content: blocks,
                }),
            }
        }

        let api_tools: Vec<ApiTool> = tools.iter().map(ApiTool::from).collect();
        let tool_choice = match options.tool_choice {
            ToolChoice::Required if !api_tools.is_empty() => Some(serde_json::json!({"type": "any"})),
            _ => None,
        };

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: api_messages,
            system: if system.is_empty() { None } else { Some(system.join("\n\n")) },
            tools: if api_tools.is_empty() { None } else { Some(api_tools) },
            tool_choice,
            temperature: options.temperature,
        }
    }

    /// Handle an error response from the API.
    fn handle_error_response(&self, status_code: u16, body: &str) -> ProviderError {
        if let Ok(error) = serde_json::from_str::<ApiError>(body) {
            match error.error.error_type.as_str() {
                "authentication_error" | "permission_error" => ProviderError::AuthError(error.error.message),
                "rate_limit_error" => ProviderError::RateLimited(error.error.message),
                "not_found_error" if error.error.message.contains("model") => {
                    ProviderError::ModelNotFound(error.error.message)
                }
                "invalid_request_error" => {
                    if error.error.message.contains("model") {
                        ProviderError::ModelNotFound(error.error.message)
                    } else {
                        ProviderError::InvalidRequest(error.error.message)
                    }
                }
                "overloaded_error" | "api_error" => ProviderError::api(error.error.message, status_code.max(500)),
                _ => ProviderError::api(error.error.message, status_code),
            }
        } else if status_code == 401 {
            ProviderError::AuthError(body.to_string())
        } else {
            ProviderError::api(body.to_string(), status_code)
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, tools, options);

        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Sending chat request");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.handle_error_response(status.as_u16(), &error_text));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(api_response.into())
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Request body for the Messages API.
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// API message format.
#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: Vec<ApiContentBlock>,
}

/// A content block in the API format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_error: Option<bool>,
}

/// Tool definition in API format.
#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

/// API response format.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

/// Token usage in API format.
#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

// ============================================================================
// Type Conversions
// ============================================================================

impl From<&ContentBlock> for ApiContentBlock {
    fn from(block: &ContentBlock) -> Self {
        match block.block_type {
            ContentBlockType::Text => Self {
                block_type: "text".to_string(),
                text: block.text.clone(),
                ..Default::default()
            },
            ContentBlockType::ToolUse => Self {
                block_type: "tool_use".to_string(),
                id: block.id.clone(),
                name: block.name.clone(),
                input: Some(block.input.clone().unwrap_or_else(|| serde_json::json!({}))),
                ..Default::default()
            },
            ContentBlockType::ToolResult => Self {
                block_type: "tool_result".to_string(),
                tool_use_id: block.tool_use_id.clone(),
                content: block.content.clone(),
                is_error: block.is_error,
                ..Default::default()
            },
        }
    }
}

impl From<&ToolDefinition> for ApiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: serde_json::to_value(&tool.input_schema).unwrap_or_default(),
        }
    }
}

impl From<ApiResponse> for ProviderResponse {
    fn from(response: ApiResponse) -> Self {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block.block_type.as_str() {
                "text" => {
                    if let Some(text) = block.text {
                        content.push_str(&text);
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name)) = (block.id, block.name) {
                        let input = block.input.unwrap_or_else(|| serde_json::json!({}));
                        tool_calls.push(ToolCall { id, name, input });
                    }
                }
                _ => {}
            }
        }

        Self {
            content,
            tool_calls,
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        }
    }
}
