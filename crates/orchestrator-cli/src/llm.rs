//! Anthropic Messages API client: the `LlmClient` implementation
//! `orchestrator-core`'s driver speaks to in production. Grounded on
//! `GQAdonis-sidecar`'s `llm_client::clients::anthropic::AnthropicClient`
//! (bare `reqwest::Client` against `https://api.anthropic.com/v1/messages`,
//! a client-local request/response struct pair rather than a generated SDK)
//! but non-streaming and tool-use aware, since that file only carries
//! plain-text completions.

use async_trait::async_trait;
use orchestrator_core::agentic_loop::{
    CompletionResponse, ContentBlock, LlmApiError, LlmClient, Message, Role, StopReason,
    StopReasonOrOther,
};
use orchestrator_core::types::Tool;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: ANTHROPIC_API_BASE.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireContentBlock>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<WireContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

fn to_wire_message(message: &Message) -> WireMessage {
    WireMessage {
        role: match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        content: message.content.iter().map(to_wire_block).collect(),
    }
}

fn to_wire_block(block: &ContentBlock) -> WireContentBlock {
    match block {
        ContentBlock::Text(text) => WireContentBlock::Text { text: text.clone() },
        ContentBlock::ToolUse { id, name, input } => WireContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult { tool_use_id, content, is_error } => WireContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: is_error.then_some(true),
        },
    }
}

fn from_wire_block(block: WireContentBlock) -> ContentBlock {
    match block {
        WireContentBlock::Text { text } => ContentBlock::Text(text),
        WireContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
        WireContentBlock::ToolResult { tool_use_id, content, is_error } => ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error: is_error.unwrap_or(false),
        },
    }
}

fn stop_reason_of(raw: Option<String>) -> StopReasonOrOther {
    match raw.as_deref() {
        Some("end_turn") | Some("stop_sequence") => StopReasonOrOther::Known(StopReason::EndTurn),
        Some("tool_use") => StopReasonOrOther::Known(StopReason::ToolUse),
        Some("max_tokens") => StopReasonOrOther::Known(StopReason::MaxTokens),
        Some(other) => StopReasonOrOther::Other(other.to_string()),
        None => StopReasonOrOther::Other("missing".to_string()),
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        max_tokens: u32,
    ) -> Result<CompletionResponse, LlmApiError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens,
            messages: messages.iter().map(to_wire_message).collect(),
            tools: tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.to_string(),
                    description: t.description.to_string(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmApiError::Other(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &text));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmApiError::Other(format!("malformed Anthropic response: {e}")))?;

        Ok(CompletionResponse {
            content: parsed.content.into_iter().map(from_wire_block).collect(),
            stop_reason: stop_reason_of(parsed.stop_reason),
        })
    }
}

/// HTTP 429 and the `rate_limit_error` type classify as transient rate
/// limiting; 503/529 and `overloaded_error` classify as transient overload.
/// Everything else is non-retryable.
fn classify_error(status: u16, body: &str) -> LlmApiError {
    let kind = serde_json::from_str::<AnthropicErrorBody>(body).ok().map(|b| b.error.kind);
    match (status, kind.as_deref()) {
        (429, _) | (_, Some("rate_limit_error")) => LlmApiError::RateLimit,
        (503, _) | (529, _) | (_, Some("overloaded_error")) => LlmApiError::Overload,
        _ => LlmApiError::Other(format!("anthropic error ({status}): {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_rate_limit() {
        assert!(matches!(classify_error(429, ""), LlmApiError::RateLimit));
    }

    #[test]
    fn classifies_529_as_overload() {
        assert!(matches!(classify_error(529, ""), LlmApiError::Overload));
    }

    #[test]
    fn classifies_named_error_type_over_status() {
        let body = r#"{"error":{"type":"overloaded_error","message":"busy"}}"#;
        assert!(matches!(classify_error(500, body), LlmApiError::Overload));
    }

    #[test]
    fn stop_reason_end_turn_maps_known() {
        assert!(matches!(
            stop_reason_of(Some("end_turn".to_string())),
            StopReasonOrOther::Known(StopReason::EndTurn)
        ));
    }

    #[test]
    fn stop_reason_unrecognized_maps_other() {
        assert!(matches!(
            stop_reason_of(Some("refusal".to_string())),
            StopReasonOrOther::Other(_)
        ));
    }
}
