//! Anthropic messages-API provider.
//!
//! Wire-format notes: the system prompt is a top-level field, assistant
//! tool calls are `tool_use` content blocks, and tool results travel as
//! `tool_result` blocks inside a user-role message. The conversion is
//! confined to this file; callers only see the canonical four-role model.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ProviderConfig;

use super::provider::{
    GatewayError, LlmProvider, Result, TextStream, error_for_status, error_for_transport,
};
use super::types::{ChatMessage, LlmResponse, Role, ToolCall, ToolDefinition};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// One SSE event in a streaming response; only text deltas are surfaced.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

// ─── AnthropicProvider ────────────────────────────────────────────────────────

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
        }
    }

    /// Convert canonical messages to Anthropic wire messages.
    ///
    /// System messages are dropped here; the caller's system prompt travels
    /// in the request's top-level `system` field instead.
    fn convert_messages(messages: &[ChatMessage]) -> Vec<Value> {
        let mut converted = Vec::with_capacity(messages.len());
        for msg in messages {
            match msg.role {
                Role::System => continue,
                Role::Tool => converted.push(json!({
                    "role": "user",
                    "content": [{
                        "type": "tool_result",
                        "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                        "content": msg.content,
                    }],
                })),
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let mut content = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(json!({"type": "text", "text": msg.content}));
                    }
                    for call in &msg.tool_calls {
                        content.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": call.arguments,
                        }));
                    }
                    converted.push(json!({"role": "assistant", "content": content}));
                }
                _ => converted.push(json!({
                    "role": msg.role.as_str(),
                    "content": msg.content,
                })),
            }
        }
        converted
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters,
                })
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
        stream: bool,
    ) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: Self::convert_messages(messages),
            system: system_prompt.map(str::to_string),
            temperature: self.temperature,
            tools: tools.filter(|t| !t.is_empty()).map(Self::convert_tools),
            stream: stream.then_some(true),
        }
    }

    async fn post(&self, request: &MessagesRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
            .map_err(error_for_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, body));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    #[tracing::instrument(name = "llm.anthropic", skip_all, fields(model = %self.model))]
    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools, system_prompt, false);
        let response = self.post(&request).await?;
        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("malformed response: {e}")))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            model: parsed.model,
            stop_reason: parsed.stop_reason,
        })
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<TextStream> {
        let request = self.build_request(messages, None, system_prompt, true);
        let response = self.post(&request).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => {
                        let parsed: StreamEvent = serde_json::from_str(&event.data).ok()?;
                        let delta = parsed.delta?;
                        (delta.kind == "text_delta" && !delta.text.is_empty())
                            .then_some(Ok(delta.text))
                    }
                    Err(e) => Some(Err(GatewayError::Network(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
