// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI Chat Completions provider.
//!
//! Works with OpenAI and any endpoint that speaks the same API; set
//! `baseUrl` in the LLM configuration to point elsewhere.
//!
//! See [OpenAI Chat Completions API](https://platform.openai.com/docs/api-reference/chat)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{
    ChatOptions, ContentBlockType, Message, MessageContent, Provider, ProviderResponse, Role,
    TokenUsage, ToolCall, ToolChoice, ToolDefinition,
};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// OpenAI-compatible provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
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

    /// Create a provider for the public OpenAI endpoint.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(api_key, model, OPENAI_BASE_URL, None)
    }

    /// Build the request body for the Chat Completions API.
    fn build_request(&self, messages: &[Message], tools: &[ToolDefinition], options: &ChatOptions) -> ChatRequest {
        let tools_json: Vec<ChatTool> = tools.iter().map(ChatTool::from).collect();
        let tool_choice = match options.tool_choice {
            ToolChoice::Required if !tools_json.is_empty() => Some("required".to_string()),
            _ => None,
        };

        ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            tools: if tools_json.is_empty() { None } else { Some(tools_json) },
            tool_choice,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }

    /// Handle an error response from the API.
    fn handle_error_response(&self, status_code: u16, body: &str) -> ProviderError {
        if let Ok(error) = serde_json::from_str::<ApiError>(body) {
            let message = error.error.message;
            let kind = error.error.error_type.as_deref().or(error.error.code.as_deref());
            match (status_code, kind) {
                (401, _) | (_, Some("authentication_error")) | (_, Some("invalid_api_key")) => {
                    ProviderError::AuthError(message)
                }
                (429, _) | (_, Some("rate_limit_error")) | (_, Some("rate_limit_exceeded")) => {
                    ProviderError::RateLimited(message)
                }
                (_, Some("model_not_found")) => ProviderError::ModelNotFound(message),
                (400, Some("invalid_request_error")) => ProviderError::InvalidRequest(message),
                _ => ProviderError::api(message, status_code),
            }
        } else if status_code == 401 {
            ProviderError::AuthError(body.to_string())
        } else {
            ProviderError::api(body.to_string(), status_code)
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
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
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.handle_error_response(status.as_u16(), &error_text));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(api_response.into())
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Request body for Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Chat message format.
#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Tool call in a message.
#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatFunction,
}

fn function_type() -> String {
    "function".to_string()
}

/// Function details in a tool call.
#[derive(Debug, Serialize, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Tool definition in Chat API format.
#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: ChatToolFunction,
}

/// Function definition within a tool.
#[derive(Debug, Serialize)]
struct ChatToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// A choice in the response.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Token usage.
#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

// ============================================================================
// Type Conversions
// ============================================================================

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let blocks = match &msg.content {
            MessageContent::Text(s) => {
                return Self {
                    role: role.to_string(),
                    content: Some(s.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }
            }
            MessageContent::Blocks(blocks) => blocks,
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block.block_type {
                ContentBlockType::Text => {
                    if let Some(ref t) = block.text {
                        text.push_str(t);
                    }
                }
                ContentBlockType::ToolUse => tool_calls.push(ChatToolCall {
                    id: block.id.clone(),
                    call_type: function_type(),
                    function: ChatFunction {
                        name: block.name.clone().unwrap_or_default(),
                        arguments: block
                            .input
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "{}".to_string()),
                    },
                }),
                ContentBlockType::ToolResult => {
                    // One tool result per tool-role message
                    return Self {
                        role: "tool".to_string(),
                        content: block.content.clone(),
                        tool_calls: None,
                        tool_call_id: block.tool_use_id.clone(),
                    };
                }
            }
        }

        Self {
            role: role.to_string(),
            content: if text.is_empty() && !tool_calls.is_empty() { None } else { Some(text) },
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
        }
    }
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: function_type(),
            function: ChatToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: serde_json::to_value(&tool.input_schema).unwrap_or_default(),
            },
        }
    }
}

impl From<ChatResponse> for ProviderResponse {
    fn from(response: ChatResponse) -> Self {
        let (content, tool_calls) = match response.choices.into_iter().next() {
            Some(choice) => {
                let tool_calls = choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| {
                        let input = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        ToolCall {
                            id: tc.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                            name: tc.function.name,
                            input,
                        }
                    })
                    .collect();
                (choice.message.content.unwrap_or_default(), tool_calls)
            }
            None => (String::new(), Vec::new()),
        };

        Self {
            content,
            tool_calls,
            usage: response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
        }
    }
}
