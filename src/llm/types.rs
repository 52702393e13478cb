//! Canonical message and tool-call types shared by every LLM provider.
//!
//! Upstream code (agent loop, compaction, session store) operates on the
//! four-role model below; each provider converts to and from its own wire
//! shape without loss.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── Role ─────────────────────────────────────────────────────────────────────

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a tool execution, tied to a prior assistant tool call.
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

// ─── ToolCall ─────────────────────────────────────────────────────────────────

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Provider-assigned call id; tool-result messages refer back to it.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// JSON object of arguments, passed to the tool verbatim.
    pub arguments: Value,
}

// ─── ToolDefinition ───────────────────────────────────────────────────────────

/// Schema handed to the model so it can call a registered tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object (`type: "object"` with `properties`/`required`).
    pub parameters: Value,
}

// ─── ChatMessage ──────────────────────────────────────────────────────────────

/// One ordered entry in a conversation log.
///
/// Messages are immutable once appended; the compactor replaces the whole
/// log rather than editing entries in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    /// May be empty for assistant messages that only carry tool calls.
    pub content: String,
    /// Tool calls issued by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `Role::Tool`: the id of the assistant tool call this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For `Role::Tool`: the name of the tool that produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Opaque transport/session metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, content)
    }

    /// An assistant turn carrying tool calls (content may be empty).
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::bare(Role::Assistant, content)
        }
    }

    /// A tool-result message answering the call with id `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::bare(Role::Tool, content)
        }
    }

    fn bare(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            metadata: None,
        }
    }
}

// ─── LlmResponse ──────────────────────────────────────────────────────────────

/// Provider-neutral result of one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    /// Empty when the model produced text only.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
    pub stop_reason: Option<String>,
}

impl LlmResponse {
    /// A plain-text response with no tool calls (used by tests and fallbacks).
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            model: model.into(),
            stop_reason: Some("stop".to_string()),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
