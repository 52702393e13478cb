//! The `LlmProvider` trait, the gateway error taxonomy, and the provider
//! factory.
//!
//! Providers never retry on their own: a completion that already produced
//! tool calls has side effects attached, and replaying it from inside the
//! gateway would duplicate them. Retry policy belongs to the caller.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use reqwest::StatusCode;

use crate::config::ProviderConfig;

use super::types::{ChatMessage, LlmResponse, ToolDefinition};

// ─── GatewayError ─────────────────────────────────────────────────────────────

/// Failure kinds surfaced by every provider.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Connection, DNS, or timeout problems; usually worth retrying later.
    #[error("network error: {0}")]
    Network(String),
    /// The provider asked us to slow down (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Bad or missing credentials (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The request itself was malformed (HTTP 400/422).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Provider-side failure (HTTP 5xx or an unparseable response).
    #[error("provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Map an HTTP error status onto the gateway taxonomy.
pub(crate) fn error_for_status(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited(body),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            GatewayError::InvalidRequest(body)
        }
        s if s.is_server_error() => GatewayError::Provider(format!("{s}: {body}")),
        s => GatewayError::Provider(format!("unexpected status {s}: {body}")),
    }
}

/// Map a transport-level reqwest failure onto the gateway taxonomy.
pub(crate) fn error_for_transport(err: reqwest::Error) -> GatewayError {
    GatewayError::Network(err.to_string())
}

// ─── LlmProvider ──────────────────────────────────────────────────────────────

/// Streaming text chunks from a provider.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Abstraction over one LLM provider.
///
/// A `Role::Tool` message is always associated, through its `tool_call_id`,
/// with a prior assistant tool call of the same id; providers whose wire
/// format differs (e.g. tool results as synthetic user content) convert in
/// both directions without loss.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one completion and return the full response, including any tool
    /// calls the model decided to make.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        system_prompt: Option<&str>,
    ) -> Result<LlmResponse>;

    /// Stream a text-only completion as it is produced.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<TextStream>;

    /// Stable provider identifier (e.g. `"anthropic"`).
    fn provider_name(&self) -> &str;

    /// The model this provider was configured with.
    fn model(&self) -> &str;
}

// ─── Factory ──────────────────────────────────────────────────────────────────

/// Create a provider from configuration.
///
/// `"openai"` also covers OpenAI-compatible endpoints (OpenRouter, local
/// gateways) via `base_url`.
pub fn create_provider(config: &ProviderConfig) -> std::result::Result<Arc<dyn LlmProvider>, String> {
    match config.id.as_str() {
        "anthropic" => Ok(Arc::new(super::anthropic::AnthropicProvider::new(config))),
        "openai" => Ok(Arc::new(super::openai::OpenAiProvider::new(config))),
        other => Err(format!(
            "unknown provider '{other}': expected 'anthropic' or 'openai'"
        )),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
