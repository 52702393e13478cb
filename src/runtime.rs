//! `AgentRuntime` — the explicit core-services record.
//!
//! Everything process-wide (provider, tool registry, approval gate,
//! session manager, scheduler, event bus, rate limiter) is constructed
//! once here and passed by reference into the components that need it.
//! There are no implicit globals.
//!
//! Transports stay thin: they hand [`IncomingMessage`]s to
//! [`AgentRuntime::handle_message`], bind `/approve`-style commands to
//! [`approve`]/[`deny`], and subscribe to the bus for progress and
//! unsolicited replies.
//!
//! [`approve`]: AgentRuntime::approve
//! [`deny`]: AgentRuntime::deny

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::agent::{AgentLoop, LoopConfig};
use crate::approval::{ApprovalGate, PendingApproval};
use crate::config::{AppConfig, default_data_dir};
use crate::event_bus::{AgentEvent, BroadcastBus, EventBus};
use crate::llm::{LlmProvider, create_provider};
use crate::prompt::StaticPromptBuilder;
use crate::ratelimit::RateLimiter;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::session::{MemorySessionStore, SessionManager, SessionStore};
use crate::tools::{RiskClassifier, RiskLevel, ToolRegistry, scheduler_tools};

/// Reply sent when a user exceeds the per-minute message budget.
const RATE_LIMIT_REPLY: &str =
    "You're sending messages too quickly. Please wait a moment and try again.";

/// User key attributed to scheduler-originated turns when a task does not
/// name one in its metadata.
const SCHEDULER_USER_KEY: &str = "scheduler";

// ─── IncomingMessage ──────────────────────────────────────────────────────────

/// What a chat transport hands the core for one inbound message.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Stable per-user key (chat id, account id, ...).
    pub user_key: String,
    pub text: String,
    /// Transport-specific reference (e.g. for reply threading).
    pub message_ref: Option<String>,
}

impl IncomingMessage {
    pub fn new(user_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            text: text.into(),
            message_ref: None,
        }
    }
}

// ─── AgentRuntime ─────────────────────────────────────────────────────────────

pub struct AgentRuntime {
    config: AppConfig,
    tools: Arc<ToolRegistry>,
    classifier: Arc<RiskClassifier>,
    approvals: Arc<ApprovalGate>,
    sessions: Arc<SessionManager>,
    scheduler: Arc<Scheduler>,
    bus: Arc<dyn EventBus>,
    limiter: RateLimiter,
}

impl AgentRuntime {
    /// Build the full service graph from configuration.
    pub fn new(config: AppConfig) -> Result<Arc<Self>, String> {
        let provider = create_provider(&config.provider)?;
        Self::with_provider(config, provider, MemorySessionStore::new())
    }

    /// Build with an injected provider and session store (tests, embedders,
    /// deployments with a real database).
    pub fn with_provider(
        config: AppConfig,
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Arc<Self>, String> {
        let bus: Arc<dyn EventBus> = Arc::new(BroadcastBus::new());

        let default_risk = parse_risk(&config.approval.default_risk);
        let classifier = Arc::new(RiskClassifier::new(default_risk));
        let approvals = Arc::new(
            ApprovalGate::new(classifier.clone(), config.approval.required)
                .with_ttl(chrono::Duration::seconds(config.approval.timeout_secs as i64)),
        );

        let data_dir = config
            .scheduler
            .data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let scheduler = Arc::new(
            Scheduler::new(
                data_dir.join("scheduled_tasks.json"),
                Duration::from_secs(config.scheduler.tick_interval_secs),
            )
            .with_bus(bus.clone()),
        );

        let mut registry = ToolRegistry::new();
        for tool in scheduler_tools(scheduler.clone()) {
            registry.register(tool);
        }
        let tools = Arc::new(registry);

        let agent = Arc::new(
            AgentLoop::new(
                provider,
                tools.clone(),
                approvals.clone(),
                LoopConfig {
                    max_iterations: config.agent.max_tool_iterations,
                    max_context_messages: config.agent.max_context_messages,
                },
            )
            .with_bus(bus.clone())
            .with_compaction(config.compaction.clone()),
        );

        let sessions = Arc::new(
            SessionManager::new(
                agent,
                store,
                Arc::new(StaticPromptBuilder::default()),
                config.provider.model.clone(),
                chrono::Duration::hours(config.session.idle_timeout_hours),
            )
            .with_cache_size(config.session.cache_size),
        );

        let limiter = RateLimiter::per_minute(config.limits.messages_per_minute);

        Ok(Arc::new(Self {
            config,
            tools,
            classifier,
            approvals,
            sessions,
            scheduler,
            bus,
            limiter,
        }))
    }

    // ── Inbound ───────────────────────────────────────────────────────────────

    /// Process one inbound message and return the reply the transport
    /// should deliver. Rate limiting happens before any model call.
    pub async fn handle_message(&self, message: IncomingMessage) -> String {
        if !self.limiter.try_record(&message.user_key) {
            tracing::warn!(user = %message.user_key, "rate limit exceeded");
            return RATE_LIMIT_REPLY.to_string();
        }
        self.sessions
            .handle_message(&message.user_key, &message.text)
            .await
    }

    /// Close the user's active session.
    pub async fn clear_session(&self, user_key: &str) -> Result<(), String> {
        self.sessions.clear(user_key).await
    }

    // ── Approval surface ──────────────────────────────────────────────────────

    pub fn approve(&self, id: &str) -> bool {
        let approved = self.approvals.approve(id);
        if approved {
            let _ = self.bus.publish(AgentEvent::ApprovalResolved {
                approval_id: id.to_lowercase(),
                approved: true,
            });
        }
        approved
    }

    pub fn deny(&self, id: &str) -> bool {
        let denied = self.approvals.deny(id);
        if denied {
            let _ = self.bus.publish(AgentEvent::ApprovalResolved {
                approval_id: id.to_lowercase(),
                approved: false,
            });
        }
        denied
    }

    pub fn pending_approvals(&self) -> Vec<PendingApproval> {
        self.approvals.list_pending()
    }

    // ── Scheduler surface ─────────────────────────────────────────────────────

    /// Run a fired task's prompt as a synthesized user turn and publish the
    /// reply for unsolicited delivery. Used as the default scheduler
    /// callback wiring; transports may install their own instead.
    pub async fn dispatch_task(&self, task: &ScheduledTask) -> String {
        let user_key = task
            .metadata
            .get("user_key")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(SCHEDULER_USER_KEY);
        tracing::info!(task_id = %task.id, user = user_key, "dispatching scheduled task");

        let reply = self.sessions.handle_message(user_key, &task.prompt).await;
        let _ = self.bus.publish(AgentEvent::UnsolicitedReply {
            user_key: user_key.to_string(),
            content: reply.clone(),
        });
        reply
    }

    /// Wire the scheduler to [`dispatch_task`] and start its tick loop.
    ///
    /// [`dispatch_task`]: AgentRuntime::dispatch_task
    pub fn start_scheduler(self: &Arc<Self>) {
        let runtime = Arc::clone(self);
        self.scheduler.set_callback(Arc::new(move |task| {
            let runtime = runtime.clone();
            Box::pin(async move {
                runtime.dispatch_task(&task).await;
            })
        }));
        self.scheduler.start();
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn classifier(&self) -> &Arc<RiskClassifier> {
        &self.classifier
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }
}

fn parse_risk(name: &str) -> RiskLevel {
    match name {
        "safe" => RiskLevel::Safe,
        "moderate" => RiskLevel::Moderate,
        "dangerous" => RiskLevel::Dangerous,
        other => {
            tracing::warn!(risk = other, "unknown default risk, using moderate");
            RiskLevel::Moderate
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, GatewayError, LlmResponse, TextStream, ToolDefinition};
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl crate::llm::LlmProvider for EchoProvider {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _tools: Option<&[ToolDefinition]>,
            _system_prompt: Option<&str>,
        ) -> crate::llm::provider::Result<LlmResponse> {
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(LlmResponse::text(format!("echo: {last}"), "mock"))
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _system_prompt: Option<&str>,
        ) -> crate::llm::provider::Result<TextStream> {
            Err(GatewayError::Provider("stream unused".into()))
        }

        fn provider_name(&self) -> &str {
            "mock"
        }
        fn model(&self) -> &str {
            "mock"
        }
    }

    fn test_runtime(mut config: AppConfig) -> Arc<AgentRuntime> {
        let dir = tempfile::tempdir().unwrap();
        config.scheduler.data_dir = Some(dir.path().to_string_lossy().into_owned());
        // Leak the tempdir so the scheduler file stays writable for the
        // lifetime of the test runtime.
        std::mem::forget(dir);
        AgentRuntime::with_provider(config, Arc::new(EchoProvider), MemorySessionStore::new())
            .unwrap()
    }

    #[tokio::test]
    async fn handle_message_round_trips() {
        let runtime = test_runtime(AppConfig::default());
        let reply = runtime
            .handle_message(IncomingMessage::new("sam", "hello"))
            .await;
        assert_eq!(reply, "echo: hello");
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_the_loop() {
        let mut config = AppConfig::default();
        config.limits.messages_per_minute = 1;
        let runtime = test_runtime(config);

        runtime.handle_message(IncomingMessage::new("sam", "one")).await;
        let reply = runtime.handle_message(IncomingMessage::new("sam", "two")).await;
        assert_eq!(reply, RATE_LIMIT_REPLY);
    }

    #[tokio::test]
    async fn scheduler_tools_are_registered() {
        let runtime = test_runtime(AppConfig::default());
        let mut names = runtime.tools().list_names();
        names.sort();
        assert!(names.contains(&"set_reminder".to_string()));
        assert!(names.contains(&"add_cron_task".to_string()));
        assert!(names.contains(&"setup_daily_briefing".to_string()));
    }

    #[tokio::test]
    async fn dispatch_task_publishes_unsolicited_reply() {
        let runtime = test_runtime(AppConfig::default());
        let mut rx = runtime.bus().subscribe();

        let task = crate::scheduler::ScheduledTask::new(
            "briefing",
            crate::scheduler::TaskKind::OneShot,
            "give me the news",
        );
        let reply = runtime.dispatch_task(&task).await;
        assert_eq!(reply, "echo: give me the news");

        // Skip intermediate events until the unsolicited reply shows up.
        loop {
            match rx.try_recv() {
                Ok(AgentEvent::UnsolicitedReply { user_key, content }) => {
                    assert_eq!(user_key, "scheduler");
                    assert_eq!(content, "echo: give me the news");
                    break;
                }
                Ok(_) => continue,
                Err(e) => panic!("expected UnsolicitedReply event, got error: {e}"),
            }
        }
    }

    #[tokio::test]
    async fn approve_deny_pass_through_to_the_gate() {
        let runtime = test_runtime(AppConfig::default());
        assert!(!runtime.approve("deadbeef"));
        assert!(!runtime.deny("deadbeef"));
        assert!(runtime.pending_approvals().is_empty());
    }
}
