//! Adjutant — a per-user conversational agent runtime.
//!
//! The core is four tightly-coupled subsystems: the agent loop (bounded
//! LLM↔tool cycle), the conversation store and compactor, the tool
//! registry with its exec-approval gate, and the scheduler that fires
//! prompts on behalf of an absent user. Chat transports stay thin: they
//! feed [`runtime::IncomingMessage`]s in and deliver reply strings out.

pub mod agent;
pub mod approval;
pub mod config;
pub mod conversation;
pub mod event_bus;
pub mod llm;
pub mod prompt;
pub mod ratelimit;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod tools;

/// Convenience re-exports for the most commonly used types.
///
/// ```rust
/// use adjutant::prelude::*;
/// ```
pub mod prelude {
    // Runtime surface
    pub use crate::runtime::{AgentRuntime, IncomingMessage};

    // LLM gateway
    pub use crate::llm::{
        ChatMessage, GatewayError, LlmProvider, LlmResponse, Role, ToolCall, ToolDefinition,
    };

    // Tool system
    pub use crate::tools::{RiskClassifier, RiskLevel, Tool, ToolRegistry, ToolResult};

    // Approval gate
    pub use crate::approval::{ApprovalGate, ApprovalState, PendingApproval};

    // Conversation
    pub use crate::conversation::{CompactionConfig, Conversation};

    // Agent loop
    pub use crate::agent::{AgentLoop, LoopConfig};

    // Sessions
    pub use crate::session::{MemorySessionStore, SessionManager, SessionStore};

    // Scheduler
    pub use crate::scheduler::{ActiveWindow, ScheduledTask, Scheduler, TaskKind};

    // Events
    pub use crate::event_bus::{AgentEvent, BroadcastBus, EventBus};

    // Configuration
    pub use crate::config::{AppConfig, load_default_config};
}
