//! Exec-approval gate: human-in-the-loop confirmation for dangerous tools.
//!
//! # Lifecycle
//!
//! ```text
//! (create)→ pending ─approve→ approved
//!                   ─deny───→ denied
//!                   ─clock──→ expired
//! ```
//!
//! Requests are identified by a short 8-character id that a user can type
//! back over chat (`/approve 3fa09c12`). The agent loop does not block on
//! a decision; it records the request, tells the model, and moves on. The
//! blocking [`ApprovalGate::wait`] shape is kept for callers that want it.
//!
//! Expired requests are swept lazily on access; there is no background
//! reaper task.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::tools::{RiskClassifier, RiskLevel};

/// Default time-to-live for a pending request.
const DEFAULT_TTL_SECS: i64 = 5 * 60;

/// Length of the typed approval id.
const ID_LEN: usize = 8;

// ─── ApprovalState ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalState::Pending)
    }
}

// ─── PendingApproval ──────────────────────────────────────────────────────────

/// A tool execution waiting for a user decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub risk_level: RiskLevel,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: ApprovalState,
}

impl PendingApproval {
    /// Render the request the way a transport would show it to the user.
    pub fn summary(&self) -> String {
        let args = serde_json::to_string_pretty(&self.arguments)
            .unwrap_or_else(|_| self.arguments.to_string());
        format!(
            "Approval required\n\
             Tool: {}\nRisk: {}\nArguments:\n{}\n\n\
             Reply /approve {} to execute or /deny {} to cancel. \
             The request expires in 5 minutes.",
            self.tool_name, self.risk_level, args, self.id, self.id
        )
    }
}

// ─── ApprovalGate ─────────────────────────────────────────────────────────────

struct Entry {
    record: PendingApproval,
    tx: watch::Sender<ApprovalState>,
}

/// Thread-safe store of pending approvals with per-id wake-ups.
pub struct ApprovalGate {
    classifier: Arc<RiskClassifier>,
    required: bool,
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ApprovalGate {
    pub fn new(classifier: Arc<RiskClassifier>, required: bool) -> Self {
        Self {
            classifier,
            required,
            ttl: chrono::Duration::seconds(DEFAULT_TTL_SECS),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether a call to `tool_name` must be approved before execution.
    pub fn needs_approval(&self, tool_name: &str) -> bool {
        self.required && self.classifier.risk_of(tool_name) == RiskLevel::Dangerous
    }

    pub fn risk_of(&self, tool_name: &str) -> RiskLevel {
        self.classifier.risk_of(tool_name)
    }

    /// Record a new pending request and arm its completion signal.
    pub fn create(&self, tool_name: &str, arguments: Value) -> PendingApproval {
        let now = Utc::now();
        let record = PendingApproval {
            id: String::new(),
            tool_name: tool_name.to_string(),
            arguments,
            risk_level: self.classifier.risk_of(tool_name),
            created_at: now,
            expires_at: now + self.ttl,
            state: ApprovalState::Pending,
        };

        let Ok(mut entries) = self.entries.lock() else {
            return record;
        };

        // Ids are lowercase hex, so uniqueness is case-insensitive by
        // construction; collisions just re-roll.
        let id = loop {
            let candidate = Uuid::new_v4().simple().to_string()[..ID_LEN].to_string();
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut record = record;
        record.id = id.clone();
        let (tx, _) = watch::channel(ApprovalState::Pending);
        tracing::info!(approval_id = %id, tool = tool_name, "approval request created");
        entries.insert(
            id,
            Entry {
                record: record.clone(),
                tx,
            },
        );
        record
    }

    /// Approve a pending request. Returns false for unknown or already
    /// terminal ids.
    pub fn approve(&self, id: &str) -> bool {
        self.resolve(id, ApprovalState::Approved)
    }

    /// Deny a pending request. Returns false for unknown or already
    /// terminal ids.
    pub fn deny(&self, id: &str) -> bool {
        self.resolve(id, ApprovalState::Denied)
    }

    fn resolve(&self, id: &str, to: ApprovalState) -> bool {
        let id = id.to_lowercase();
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        if entry.record.state.is_terminal() {
            return false;
        }
        if Utc::now() >= entry.record.expires_at {
            entry.record.state = ApprovalState::Expired;
            entry.tx.send_replace(ApprovalState::Expired);
            return false;
        }
        entry.record.state = to;
        entry.tx.send_replace(to);
        tracing::info!(approval_id = %id, state = ?to, "approval resolved");
        true
    }

    /// Block until the request is approved, denied, expired, or `timeout`
    /// elapses. Returns true only for approval. On timeout the request
    /// stays pending until someone resolves it or the clock expires it.
    pub async fn wait(&self, id: &str, timeout: Duration) -> bool {
        let id = id.to_lowercase();
        let (mut rx, expires_at) = {
            let Ok(entries) = self.entries.lock() else {
                return false;
            };
            let Some(entry) = entries.get(&id) else {
                return false;
            };
            match entry.record.state {
                ApprovalState::Approved => return true,
                ApprovalState::Pending => {}
                _ => return false,
            }
            (entry.tx.subscribe(), entry.record.expires_at)
        };

        let until_expiry = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let window = timeout.min(until_expiry);

        match tokio::time::timeout(window, rx.wait_for(|s| s.is_terminal())).await {
            Ok(Ok(state)) => *state == ApprovalState::Approved,
            // Sender dropped: the entry was swept, never approved.
            Ok(Err(_)) => false,
            Err(_) => {
                self.sweep_expired();
                false
            }
        }
    }

    /// Look up a request by id.
    pub fn get(&self, id: &str) -> Option<PendingApproval> {
        let id = id.to_lowercase();
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&id).map(|e| e.record.clone()))
    }

    /// Snapshot of non-terminal requests, sweeping expired ones first.
    pub fn list_pending(&self) -> Vec<PendingApproval> {
        self.sweep_expired();
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let mut pending: Vec<PendingApproval> = entries
            .values()
            .filter(|e| e.record.state == ApprovalState::Pending)
            .map(|e| e.record.clone())
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    /// Mark overdue requests expired and drop records whose clock has run
    /// out entirely (terminal or not), waking any waiters first.
    fn sweep_expired(&self) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Utc::now();
        entries.retain(|id, entry| {
            if now < entry.record.expires_at {
                return true;
            }
            if entry.record.state == ApprovalState::Pending {
                entry.record.state = ApprovalState::Expired;
                entry.tx.send_replace(ApprovalState::Expired);
                tracing::info!(approval_id = %id, "approval expired");
            }
            false
        });
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate() -> ApprovalGate {
        ApprovalGate::new(Arc::new(RiskClassifier::default()), true)
    }

    #[test]
    fn needs_approval_only_for_dangerous_tools() {
        let gate = gate();
        assert!(gate.needs_approval("run_command"));
        assert!(!gate.needs_approval("web_search"));
        assert!(!gate.needs_approval("execute_code"));

        let disabled = ApprovalGate::new(Arc::new(RiskClassifier::default()), false);
        assert!(!disabled.needs_approval("run_command"));
    }

    #[test]
    fn create_assigns_short_unique_id() {
        let gate = gate();
        let a = gate.create("run_command", json!({"command": "ls"}));
        let b = gate.create("run_command", json!({"command": "pwd"}));
        assert_eq!(a.id.len(), 8);
        assert_ne!(a.id, b.id);
        assert_eq!(a.state, ApprovalState::Pending);
        assert_eq!(a.risk_level, RiskLevel::Dangerous);
    }

    #[test]
    fn approve_is_terminal_and_idempotent() {
        let gate = gate();
        let req = gate.create("run_command", json!({}));
        assert!(gate.approve(&req.id));
        // Already terminal: both transitions now refuse.
        assert!(!gate.approve(&req.id));
        assert!(!gate.deny(&req.id));
        assert_eq!(gate.get(&req.id).unwrap().state, ApprovalState::Approved);
    }

    #[test]
    fn deny_blocks_later_approve() {
        let gate = gate();
        let req = gate.create("send_email", json!({}));
        assert!(gate.deny(&req.id));
        assert!(!gate.approve(&req.id));
    }

    #[test]
    fn unknown_id_returns_false() {
        let gate = gate();
        assert!(!gate.approve("deadbeef"));
        assert!(!gate.deny("deadbeef"));
    }

    #[test]
    fn id_lookup_is_case_insensitive() {
        let gate = gate();
        let req = gate.create("run_command", json!({}));
        assert!(gate.approve(&req.id.to_uppercase()));
    }

    #[test]
    fn expired_requests_are_swept_from_pending_list() {
        let gate = gate().with_ttl(chrono::Duration::seconds(-1));
        let req = gate.create("run_command", json!({}));
        assert!(gate.list_pending().is_empty());
        // Swept entirely: terminal transitions see an unknown id.
        assert!(!gate.approve(&req.id));
    }

    #[tokio::test]
    async fn wait_returns_true_when_approved_before_timeout() {
        let gate = Arc::new(gate());
        let req = gate.create("run_command", json!({}));

        let waiter = {
            let gate = gate.clone();
            let id = req.id.clone();
            tokio::spawn(async move { gate.wait(&id, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gate.approve(&req.id));
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_returns_false_on_timeout() {
        let gate = gate();
        let req = gate.create("run_command", json!({}));
        assert!(!gate.wait(&req.id, Duration::from_millis(30)).await);
        // Still pending after a mere wait timeout.
        assert_eq!(gate.get(&req.id).unwrap().state, ApprovalState::Pending);
    }

    #[tokio::test]
    async fn wait_returns_false_when_denied() {
        let gate = Arc::new(gate());
        let req = gate.create("send_email", json!({}));

        let waiter = {
            let gate = gate.clone();
            let id = req.id.clone();
            tokio::spawn(async move { gate.wait(&id, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(gate.deny(&req.id));
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_waiters_all_wake() {
        let gate = Arc::new(gate());
        let req = gate.create("run_command", json!({}));

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                let id = req.id.clone();
                tokio::spawn(async move { gate.wait(&id, Duration::from_secs(5)).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.approve(&req.id);
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[test]
    fn summary_quotes_the_id() {
        let gate = gate();
        let req = gate.create("run_command", json!({"command": "ls"}));
        let text = req.summary();
        assert!(text.contains(&req.id));
        assert!(text.contains("run_command"));
    }
}
