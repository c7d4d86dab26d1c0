// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent module - the reason-act loop behind the exposed tool.
//!
//! One [`Agent::run`] handles one request: it renders the system prompt,
//! then alternates between the LLM and the tools until the model calls the
//! `answer` tool, the request budget is spent, or the iteration limit is hit.
//! Tool calls within a turn run sequentially, in the order the model emitted
//! them, and tool failures are fed back to the model instead of ending the run.
//!
//! # Example
//!
//! ```rust,ignore
//! use spl_agent::agent::{Agent, AgentConfig, RunOutcome};
//! use std::sync::Arc;
//!
//! let agent = Agent::new(AgentConfig::default(), Arc::new(adapter), Arc::new(connector));
//! match agent.run("What time is it in Tokyo?").await? {
//!     RunOutcome::Answer { text, meta } => println!("{text} ({} tokens)", meta.total_tokens),
//!     RunOutcome::ToolError { message, .. } => eprintln!("{message}"),
//! }
//! ```

mod types;

pub use types::{answer_tool, AgentConfig, RunMeta, RunOutcome, ToolExecutor};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chat::Transcript;
use crate::error::{AgentError, ProviderError};
use crate::mcp::McpToolResult;
use crate::providers::LlmAdapter;
use crate::types::{ToolCall, ANSWER_TOOL};

/// Something that can answer a request. The MCP facade depends on this
/// rather than on [`Agent`] directly.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Answer `query`, stopping with [`AgentError::Cancelled`] once `cancel`
    /// turns true.
    async fn run(&self, query: &str, cancel: watch::Receiver<bool>) -> Result<RunOutcome, AgentError>;
}

/// Orchestrates the LLM and the tool executor for each request.
///
/// An agent holds no per-request state, so one instance serves concurrent
/// requests.
pub struct Agent {
    config: AgentConfig,
    adapter: Arc<LlmAdapter>,
    executor: Arc<dyn ToolExecutor>,
}

impl Agent {
    pub fn new(config: AgentConfig, adapter: Arc<LlmAdapter>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            config,
            adapter,
            executor,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answer one request.
    pub async fn run(&self, query: &str) -> Result<RunOutcome, AgentError> {
        self.run_internal(query, None).await
    }

    /// Answer one request, giving up with [`AgentError::Cancelled`] as soon
    /// as `cancel` turns true.
    pub async fn run_with_cancel(&self, query: &str, cancel: watch::Receiver<bool>) -> Result<RunOutcome, AgentError> {
        self.run_internal(query, Some(cancel)).await
    }

    async fn run_internal(
        &self,
        query: &str,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<RunOutcome, AgentError> {
        let mut cancel = cancel;
        let start = Instant::now();

        let mut tools = self.executor.tools().await;
        tools.retain(|t| t.name != ANSWER_TOOL);
        tools.push(answer_tool());

        let mut transcript = Transcript::begin(&self.config.transcript_config(), query, &tools)
            .map_err(|e| AgentError::InvalidState(format!("failed to render system prompt: {e}")))?;

        let mut iterations = 0u32;
        let mut approximate = false;
        let meta = |transcript: &Transcript, iterations: u32, approximate: bool| RunMeta {
            total_tokens: transcript.total_tokens(),
            total_cost: transcript.total_cost(),
            duration_ms: start.elapsed().as_millis() as u64,
            iterations,
            approximate,
        };

        debug!(tools = tools.len(), max_iterations = self.config.max_iterations, "Starting agent run");

        while iterations < self.config.max_iterations {
            if is_cancelled(&cancel) {
                return Err(AgentError::Cancelled);
            }
            iterations += 1;
            transcript.compact_if_needed();

            let sent = until_cancelled(&mut cancel, self.adapter.send(transcript.messages(), &tools)).await?;
            let response = match sent {
                Ok(response) => response,
                Err(ProviderError::EmptyResponse) => {
                    return Ok(terminate(AgentError::EmptyResponse, meta(&transcript, iterations, approximate)));
                }
                Err(e) => return Err(e.into()),
            };

            transcript.append_assistant(&response);
            approximate |= response.approximate;

            info!(
                iteration = iterations,
                calls = response.calls.len(),
                tokens = response.tokens,
                cost = response.cost,
                total_cost = transcript.total_cost(),
                duration_ms = response.duration_ms,
                "LLM turn complete"
            );

            if transcript.budget_exceeded() {
                let err = AgentError::BudgetExceeded {
                    cost: transcript.total_cost(),
                    budget: self.config.request_budget,
                };
                return Ok(terminate(err, meta(&transcript, iterations, approximate)));
            }

            if response.calls.is_empty() {
                return Ok(terminate(AgentError::EmptyResponse, meta(&transcript, iterations, approximate)));
            }

            if let Some(text) = final_answer(&response.calls) {
                let meta = meta(&transcript, iterations, approximate);
                info!(
                    iterations,
                    total_tokens = meta.total_tokens,
                    total_cost = meta.total_cost,
                    duration_ms = meta.duration_ms,
                    "Agent answered"
                );
                return Ok(RunOutcome::Answer {
                    text: text.to_string(),
                    meta,
                });
            }

            for call in &response.calls {
                transcript.append_tool_call(call);
                let result = if call.name == ANSWER_TOOL {
                    warn!(call_id = %call.id, "Answer tool called without a string 'text' argument");
                    McpToolResult::error("the answer tool requires a string argument 'text'")
                } else {
                    self.dispatch(call, &mut cancel).await?
                };
                transcript.append_tool_result(call, &result);
            }
        }

        let err = AgentError::MaxIterationsExceeded(self.config.max_iterations);
        Ok(terminate(err, meta(&transcript, iterations, approximate)))
    }

    /// Run one tool call. Tool failures become error-marked results.
    async fn dispatch(
        &self,
        call: &ToolCall,
        cancel: &mut Option<watch::Receiver<bool>>,
    ) -> Result<McpToolResult, AgentError> {
        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        let start = Instant::now();

        let result = match until_cancelled(cancel, self.executor.execute(call)).await? {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, category = %e.category(), "Tool call failed");
                McpToolResult::error(e.to_string())
            }
        };

        debug!(
            tool = %call.name,
            is_error = result.is_error,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        Ok(result)
    }
}

#[async_trait]
impl AgentRunner for Agent {
    async fn run(&self, query: &str, cancel: watch::Receiver<bool>) -> Result<RunOutcome, AgentError> {
        self.run_with_cancel(query, cancel).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("provider", &self.adapter.provider_name())
            .field("model", &self.adapter.model())
            .finish()
    }
}

/// The `text` of the first well-formed answer call, if any.
fn final_answer(calls: &[ToolCall]) -> Option<&str> {
    calls
        .iter()
        .filter(|c| c.name == ANSWER_TOOL)
        .find_map(|c| c.str_arg("text"))
}

fn terminate(err: AgentError, meta: RunMeta) -> RunOutcome {
    warn!(error = %err, iterations = meta.iterations, total_cost = meta.total_cost, "Agent run terminated");
    RunOutcome::ToolError {
        message: err.to_string(),
        category: err.category(),
        meta,
    }
}

fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Await `fut` unless the cancellation flag turns true first.
async fn until_cancelled<F: Future>(
    cancel: &mut Option<watch::Receiver<bool>>,
    fut: F,
) -> Result<F::Output, AgentError> {
    let Some(rx) = cancel.as_mut() else {
        return Ok(fut.await);
    };
    if *rx.borrow() {
        return Err(AgentError::Cancelled);
    }

    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => return Ok(out),
            changed = rx.changed() => {
                if changed.is_err() {
                    // sender gone, nobody can cancel any more
                    return Ok(fut.await);
                }
                if *rx.borrow() {
                    return Err(AgentError::Cancelled);
                }
            }
        }
    }
}
