use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of executing a [`Tool`].
///
/// `success` is a tool-side signal only; the agent loop feeds the result
/// back to the model either way and lets it decide how to proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    /// Human-readable output (search results, confirmation text, etc.).
    pub output: String,
    /// Populated when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional structured payload for machine consumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            data: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A capability the agent loop can invoke.
///
/// Implementations must be `Send + Sync` so they can be held in a shared
/// `Arc<dyn Tool>` registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable machine identifier (snake_case), e.g. `"set_reminder"`.
    fn name(&self) -> &str;

    /// Human-readable description included in LLM tool schemas.
    fn description(&self) -> &str;

    /// JSON Schema object (`type: "object"`, `properties`, `required`)
    /// describing the accepted arguments. Passed to the LLM verbatim.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. Argument validation beyond the schema is at the
    /// tool's own discretion; the registry dispatches without validating.
    async fn execute(&self, args: Value) -> Result<ToolResult, String>;
}
