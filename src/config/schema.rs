//! TOML configuration schema.
//!
//! Every section carries `#[serde(default)]` so a partially-filled
//! `config.toml` works; missing sections fall back to their `Default`.
//!
//! Example `~/.adjutant/config.toml`:
//! ```toml
//! [provider]
//! id = "anthropic"
//! model = "claude-sonnet-4-20250514"
//!
//! [approval]
//! required = true
//!
//! [compaction]
//! max_context_tokens = 100000
//!
//! [scheduler]
//! tick_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};

use crate::conversation::CompactionConfig;

// ─── ProviderConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// `"anthropic"` or `"openai"`.
    pub id: String,
    pub model: String,
    /// API key; usually supplied via environment instead of the file.
    pub api_key: String,
    /// Override for OpenAI-compatible gateways (e.g. OpenRouter).
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "anthropic".to_owned(),
            model: "claude-sonnet-4-20250514".to_owned(),
            api_key: String::new(),
            base_url: None,
            max_tokens: 4096,
            temperature: 0.7,
            request_timeout_secs: 60,
        }
    }
}

// ─── AgentConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum tool-call iterations per turn.
    pub max_tool_iterations: usize,
    /// Message-count cap applied after each completed turn.
    pub max_context_messages: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 10,
            max_context_messages: 50,
        }
    }
}

// ─── ApprovalConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Master switch for the exec-approval gate.
    pub required: bool,
    /// How long a pending request stays approvable.
    pub timeout_secs: u64,
    /// Risk assigned to tools missing from the classification map:
    /// `"safe"`, `"moderate"`, or `"dangerous"`.
    pub default_risk: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            required: true,
            timeout_secs: 5 * 60,
            default_risk: "moderate".to_owned(),
        }
    }
}

// ─── SessionConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle longer than this are treated as closed.
    pub idle_timeout_hours: i64,
    /// Bounded size of the in-memory conversation cache.
    pub cache_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_hours: 24,
            cache_size: 64,
        }
    }
}

// ─── SchedulerConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduling passes (capped at 30).
    pub tick_interval_secs: u64,
    /// Override for the data directory holding `scheduled_tasks.json`
    /// (default: `~/.adjutant`).
    pub data_dir: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            data_dir: None,
        }
    }
}

// ─── LimitsConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Per-user inbound message budget per minute.
    pub messages_per_minute: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: 30,
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub agent: AgentConfig,
    pub compaction: CompactionConfig,
    pub approval: ApprovalConfig,
    pub session: SessionConfig,
    pub scheduler: SchedulerConfig,
    pub limits: LimitsConfig,
}
