//! LLM gateway: canonical message types, the provider trait, and the two
//! concrete providers.

pub mod anthropic;
pub mod openai;
pub mod provider;
pub mod types;

pub use provider::{GatewayError, LlmProvider, TextStream, create_provider};
pub use types::{ChatMessage, LlmResponse, Role, ToolCall, ToolDefinition};
