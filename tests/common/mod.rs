//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use adjutant::prelude::*;

/// Provider that replays a scripted list of responses and counts calls.
pub struct ScriptedProvider {
    responses: Vec<LlmResponse>,
    index: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<LlmResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            index: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _tools: Option<&[ToolDefinition]>,
        _system_prompt: Option<&str>,
    ) -> Result<LlmResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(i)
            .cloned()
            .ok_or_else(|| GatewayError::Provider("no more scripted responses".into()))
    }

    async fn stream(
        &self,
        _messages: &[ChatMessage],
        _system_prompt: Option<&str>,
    ) -> Result<adjutant::llm::TextStream, GatewayError> {
        Err(GatewayError::Provider("stream unused in tests".into()))
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// A text-only response.
pub fn text(content: &str) -> LlmResponse {
    LlmResponse::text(content, "scripted")
}

/// A response that calls one tool.
pub fn tool_call(id: &str, name: &str, arguments: Value) -> LlmResponse {
    LlmResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }],
        input_tokens: 0,
        output_tokens: 0,
        model: "scripted".into(),
        stop_reason: Some("tool_use".into()),
    }
}

/// Simple tool returning a fixed payload, counting its executions.
pub struct FixedTool {
    pub name: &'static str,
    pub output: &'static str,
    pub executions: Arc<AtomicUsize>,
}

impl FixedTool {
    pub fn new(name: &'static str, output: &'static str) -> (Arc<dyn Tool>, Arc<AtomicUsize>) {
        let executions = Arc::new(AtomicUsize::new(0));
        let tool: Arc<dyn Tool> = Arc::new(Self {
            name,
            output,
            executions: executions.clone(),
        });
        (tool, executions)
    }
}

#[async_trait]
impl Tool for FixedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test tool with a fixed result"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, String> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(self.output))
    }
}

/// Registry preloaded with the given tools.
pub fn registry(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool);
    }
    Arc::new(registry)
}

/// Approval gate over the default risk map.
pub fn gate(required: bool) -> Arc<ApprovalGate> {
    Arc::new(ApprovalGate::new(Arc::new(RiskClassifier::default()), required))
}
