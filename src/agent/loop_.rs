//! `AgentLoop` — the bounded tool-using reasoning cycle for one user turn.
//!
//! # Algorithm
//!
//! ```text
//! compact history if over budget
//!       │
//!       ▼
//! append user message
//!       │
//!       ▼
//! LLM.generate()  ──► no tool calls? ──► append reply, trim, return
//!       │
//!       ▼ tool calls present
//! for each call (in declared order):
//!   dangerous?  → record PendingApproval, inform the model, move on
//!   otherwise   → execute via registry → append tool result
//!       │
//!       ▼
//! iteration += 1; if < max_iterations → repeat
//!       │
//!       ▼
//! return last text + iteration-cap notice
//! ```
//!
//! Gateway failures become a single assistant message so the conversation
//! stays usable; tool failures become tool-result context for the model.
//! The loop never retries either; the model decides what to do next from
//! what it sees. Approval requests do not block the loop: the model is told
//! the id and may re-issue the call after the user approves.

use std::sync::Arc;

use crate::approval::ApprovalGate;
use crate::conversation::{CompactionConfig, Conversation, compact, needs_compaction};
use crate::event_bus::{AgentEvent, EventBus};
use crate::llm::{LlmProvider, ToolCall};
use crate::tools::ToolRegistry;

// ─── LoopConfig ───────────────────────────────────────────────────────────────

/// Runtime limits for an [`AgentLoop`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum tool-call → response iterations per turn.
    pub max_iterations: usize,
    /// Message-count cap applied after a completed turn.
    pub max_context_messages: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_context_messages: 50,
        }
    }
}

// ─── AgentLoop ────────────────────────────────────────────────────────────────

/// The stateless reasoning loop.
///
/// Conversation state lives with the caller; each [`process`] call mutates
/// the passed-in [`Conversation`] by appending (or, via the compactor,
/// replacing) messages.
///
/// [`process`]: AgentLoop::process
pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    approvals: Arc<ApprovalGate>,
    bus: Option<Arc<dyn EventBus>>,
    compaction: CompactionConfig,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        approvals: Arc<ApprovalGate>,
        config: LoopConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            approvals,
            bus: None,
            compaction: CompactionConfig::default(),
            config,
        }
    }

    /// Attach an event bus for progress signals.
    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Override the compaction policy.
    pub fn with_compaction(mut self, compaction: CompactionConfig) -> Self {
        self.compaction = compaction;
        self
    }

    // ── Public entry point ────────────────────────────────────────────────────

    /// Drive one user turn to completion and return the final reply text.
    #[tracing::instrument(
        name = "agent.process",
        skip_all,
        fields(
            history_len = conversation.len(),
            max_iterations = self.config.max_iterations,
        )
    )]
    pub async fn process(&self, user_text: &str, conversation: &mut Conversation) -> String {
        if needs_compaction(&conversation.messages, &self.compaction) {
            let (compacted, report) =
                compact(self.provider.as_ref(), &conversation.messages, &self.compaction).await;
            tracing::info!(
                from = report.original_message_count,
                to = report.compacted_message_count,
                fallback = report.used_fallback,
                "history compacted"
            );
            conversation.replace_after_compaction(compacted);
        }

        conversation.add_user_message(user_text);

        let mut definitions = self.tools.definitions();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        let tool_schemas = (!definitions.is_empty()).then_some(definitions.as_slice());

        let mut last_content = String::new();

        for iteration in 0..self.config.max_iterations {
            let response = match self
                .provider
                .generate(
                    &conversation.messages,
                    tool_schemas,
                    Some(&conversation.system_prompt),
                )
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, iteration, "LLM generation error");
                    let message = format!("I encountered an error processing your message: {e}");
                    conversation.add_assistant_message(&message);
                    return message;
                }
            };

            if response.tool_calls.is_empty() {
                conversation.add_assistant_message(&response.content);
                conversation.truncate(self.config.max_context_messages);
                return response.content;
            }

            last_content = response.content.clone();
            conversation.add_assistant_tool_calls(response.content, response.tool_calls.clone());

            for call in &response.tool_calls {
                let result_text = self.run_tool_call(call).await;
                conversation.add_tool_result(&call.id, &call.name, result_text);
            }
        }

        let mut message = "I've reached the maximum number of tool iterations.".to_string();
        if !last_content.is_empty() {
            message = format!("{message} Here's what I have so far:\n\n{last_content}");
        }
        conversation.add_assistant_message(&message);
        message
    }

    // ── Internal ──────────────────────────────────────────────────────────────

    /// Execute (or defer) one tool call and return the tool-role text that
    /// goes back to the model.
    #[tracing::instrument(name = "agent.tool", skip_all, fields(tool = %call.name))]
    async fn run_tool_call(&self, call: &ToolCall) -> String {
        if self.approvals.needs_approval(&call.name) {
            let request = self.approvals.create(&call.name, call.arguments.clone());
            tracing::info!(approval_id = %request.id, "tool call parked for approval");
            self.publish(AgentEvent::ApprovalRequested {
                approval_id: request.id.clone(),
                tool_name: call.name.clone(),
                risk_level: request.risk_level,
            });
            return format!(
                "Approval required before '{}' can run (risk: {}). \
                 Approval id: {}. Ask the user to reply /approve {} or /deny {}; \
                 the request expires in 5 minutes. Re-issue this tool call once approved.",
                call.name, request.risk_level, request.id, request.id, request.id
            );
        }

        self.publish(AgentEvent::ToolStarted {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let result = self.tools.execute(&call.name, call.arguments.clone()).await;

        self.publish(AgentEvent::ToolFinished {
            tool_name: call.name.clone(),
            success: result.success,
        });

        if result.success {
            result.output
        } else {
            format!(
                "Error: {}",
                result.error.unwrap_or_else(|| "tool failed".to_string())
            )
        }
    }

    fn publish(&self, event: AgentEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
