//! OpenAI chat-completions provider (also serves OpenAI-compatible
//! endpoints such as OpenRouter via `base_url`).
//!
//! Tool results keep their native `tool` role on this wire; assistant tool
//! calls are serialized with JSON-string arguments and parsed back on the
//! way in.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// ─── OpenAiProvider ───────────────────────────────────────────────────────────

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAiProvider {
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

    fn convert_messages(messages: &[ChatMessage], system_prompt: Option<&str>) -> Vec<Value> {
        let mut converted = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            converted.push(json!({"role": "system", "content": system}));
        }
        for msg in messages {
            match msg.role {
                Role::Tool => converted.push(json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content,
                })),
                Role::Assistant if !msg.tool_calls.is_empty() => {
                    let tool_calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                },
                            })
                        })
                        .collect();
                    let content = (!msg.content.is_empty()).then(|| msg.content.clone());
                    converted.push(json!({
                        "role": "assistant",
                        "content": content,
                        "tool_calls": tool_calls,
                    }));
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
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    },
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
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(messages, system_prompt),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: tools.filter(|t| !t.is_empty()).map(Self::convert_tools),
            stream: stream.then_some(true),
        }
    }

    async fn post(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
impl LlmProvider for OpenAiProvider {
    #[tracing::instrument(name = "llm.openai", skip_all, fields(model = %self.model))]
    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools, system_prompt, false);
        let response = self.post(&request).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Provider(format!("malformed response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Provider("response contained no choices".into()))?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            let arguments: Value = if call.function.arguments.is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    GatewayError::Provider(format!("malformed tool arguments: {e}"))
                })?
            };
            tool_calls.push(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
        });

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            model: parsed.model,
            stop_reason: choice.finish_reason,
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
                    Ok(event) if event.data == "[DONE]" => None,
                    Ok(event) => {
                        let chunk: StreamChunk = serde_json::from_str(&event.data).ok()?;
                        let delta = chunk.choices.into_iter().next()?.delta.content?;
                        (!delta.is_empty()).then_some(Ok(delta))
                    }
                    Err(e) => Some(Err(GatewayError::Network(e.to_string()))),
                }
            });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
