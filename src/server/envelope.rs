// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON envelope returned by the direct-call endpoint and `mcp-call --json`.

use serde::Serialize;
use serde_json::Value;

use crate::agent::{RunMeta, RunOutcome};
use crate::error::{AgentError, ErrorCategory};
use crate::mcp::McpToolResult;
use crate::providers::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnswerPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RunMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Envelope {
    pub fn answer(text: impl Into<String>, meta: Option<RunMeta>) -> Self {
        Self {
            success: true,
            result: Some(AnswerPayload { answer: text.into() }),
            meta,
            error: None,
        }
    }

    /// A failed envelope. The message is sanitized.
    pub fn failure(category: ErrorCategory, message: &str, meta: Option<RunMeta>) -> Self {
        Self {
            success: false,
            result: None,
            meta,
            error: Some(EnvelopeError {
                kind: category.as_str().to_string(),
                message: sanitize(message),
                details: None,
            }),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        if let Some(ref mut error) = self.error {
            error.details = Some(details);
        }
        self
    }

    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::Answer { text, meta } => Self::answer(text.clone(), Some(*meta)),
            RunOutcome::ToolError { message, category, meta } => Self::failure(*category, message, Some(*meta)),
        }
    }

    pub fn from_agent_error(err: &AgentError) -> Self {
        Self::failure(err.category(), &err.to_string(), None)
    }

    /// Wrap a raw tool result, as returned by a downstream server.
    pub fn from_tool_result(result: &McpToolResult) -> Self {
        if result.is_error {
            Self::failure(ErrorCategory::External, &result.as_text(), None)
        } else {
            Self::answer(result.as_text(), None)
        }
    }

    /// Category of the error, if any.
    pub fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_answer_envelope_shape() {
        let meta = RunMeta {
            total_tokens: 1500,
            total_cost: 0.02,
            duration_ms: 12,
            iterations: 1,
            approximate: false,
        };
        let env = Envelope::from_outcome(&RunOutcome::Answer {
            text: "It is noon.".to_string(),
            meta,
        });
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["result"]["answer"], "It is noon.");
        assert_eq!(value["meta"]["totalTokens"], 1500);
        assert_eq!(value["meta"]["iterations"], 1);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_failure_is_sanitized() {
        let env = Envelope::failure(
            ErrorCategory::External,
            "auth failed sk-abcdefghijklmnop12 invalid",
            None,
        )
        .with_details(json!({"server": "time"}));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["type"], "external");
        assert_eq!(value["error"]["message"], "auth failed [REDACTED] invalid");
        assert_eq!(value["error"]["details"]["server"], "time");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_termination_keeps_category() {
        let err = AgentError::MaxIterationsExceeded(2);
        let outcome = RunOutcome::ToolError {
            message: err.to_string(),
            category: err.category(),
            meta: RunMeta::default(),
        };
        let env = Envelope::from_outcome(&outcome);
        assert_eq!(env.error_kind(), Some(err.category().as_str()));
        assert_eq!(
            env.error.unwrap().message,
            "exceeded maximum number of LLM iterations (2)"
        );
    }

    #[test]
    fn test_from_tool_result() {
        assert!(Envelope::from_tool_result(&McpToolResult::text("ok")).success);
        let failed = Envelope::from_tool_result(&McpToolResult::error("boom"));
        assert!(!failed.success);
        assert_eq!(failed.error_kind(), Some("external"));
    }
}
