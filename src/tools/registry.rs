use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::llm::ToolDefinition;

use super::traits::{Tool, ToolResult};

/// Central registry of available tools.
///
/// Dispatch never raises: an unknown name or a tool-level error both come
/// back as a failed [`ToolResult`] so the agent loop can hand the failure
/// to the model as context instead of aborting the turn.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        tracing::debug!(tool = tool.name(), "tool registered");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Remove a tool by name.
    pub fn unregister(&mut self, name: &str) {
        if self.tools.remove(name).is_some() {
            tracing::debug!(tool = name, "tool unregistered");
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All registered tool names.
    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Schemas for every registered tool, for inclusion in LLM requests.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Dispatch a call by name.
    #[tracing::instrument(name = "tool.execute", skip(self, arguments))]
    pub async fn execute(&self, name: &str, arguments: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::err(format!("Tool '{name}' not found"));
        };

        match tool.execute(arguments).await {
            Ok(result) => {
                tracing::debug!(tool = name, success = result.success, "tool executed");
                result
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool execution error");
                ToolResult::err(e)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"],
            })
        }
        async fn execute(&self, args: Value) -> Result<ToolResult, String> {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .ok_or("missing required argument 'message'")?;
            Ok(ToolResult::ok(message))
        }
    }

    #[tokio::test]
    async fn execute_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let result = registry.execute("echo", json!({"message": "ping"})).await;
        assert!(result.success);
        assert_eq!(result.output, "ping");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failed_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute("nonexistent", json!({})).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn tool_error_becomes_failed_result() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        // Missing argument makes the tool itself return Err.
        let result = registry.execute("echo", json!({})).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("message"));
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_removes_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.unregister("echo");
        assert!(registry.get("echo").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn definitions_expose_schema_with_required_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        let required = defs[0].parameters["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "message"));
    }
}
