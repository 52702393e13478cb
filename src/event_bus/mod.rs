//! Application event bus.
//!
//! Progress signals (tool execution, approval requests, scheduled fires)
//! flow through here so a transport can render them without polling the
//! core. Publishing never blocks; slow subscribers lag and lose the oldest
//! events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::tools::RiskLevel;

const DEFAULT_CAPACITY: usize = 1024;

// ─── AgentEvent ───────────────────────────────────────────────────────────────

/// Everything that flows through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolStarted {
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolFinished {
        tool_name: String,
        success: bool,
    },
    ApprovalRequested {
        approval_id: String,
        tool_name: String,
        risk_level: RiskLevel,
    },
    ApprovalResolved {
        approval_id: String,
        approved: bool,
    },
    TaskFired {
        task_id: String,
        name: String,
    },
    /// A reply produced outside a live request/response exchange (e.g. a
    /// scheduled briefing) that a transport should deliver unsolicited.
    UnsolicitedReply {
        user_key: String,
        content: String,
    },
    SystemError {
        message: String,
    },
}

// ─── EventBus ─────────────────────────────────────────────────────────────────

/// Central pub/sub for [`AgentEvent`]s.
pub trait EventBus: Send + Sync {
    /// Publish to all active subscribers. Zero subscribers is fine.
    fn publish(&self, event: AgentEvent) -> Result<(), String>;

    /// Subscribe to all events.
    fn subscribe(&self) -> broadcast::Receiver<AgentEvent>;
}

/// [`EventBus`] backed by a `tokio::sync::broadcast` channel.
pub struct BroadcastBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: AgentEvent) -> Result<(), String> {
        // send() errs only when no receiver exists; that is not a failure.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_receive() {
        let bus = BroadcastBus::new();
        let mut rx = bus.subscribe();

        bus.publish(AgentEvent::SystemError {
            message: "disk full".to_string(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            AgentEvent::SystemError { message } => assert_eq!(message, "disk full"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = BroadcastBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(AgentEvent::TaskFired {
            task_id: "t1".into(),
            name: "briefing".into(),
        })
        .unwrap();

        assert!(matches!(rx1.recv().await.unwrap(), AgentEvent::TaskFired { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), AgentEvent::TaskFired { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let bus = BroadcastBus::new();
        assert!(
            bus.publish(AgentEvent::ToolFinished {
                tool_name: "echo".into(),
                success: true,
            })
            .is_ok()
        );
    }
}
