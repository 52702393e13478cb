//! Session persistence seam.
//!
//! The relational store proper lives outside this crate; [`SessionStore`]
//! marks the boundary and [`MemorySessionStore`] implements it in memory
//! for tests and storage-less deployments. Message rows carry role and
//! content only, enough to rehydrate a conversation in creation order.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::Role;

// ─── Records ──────────────────────────────────────────────────────────────────

/// A persisted session row grouping one user's messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_key: String,
    pub model: String,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

/// A persisted message row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ─── SessionStore ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Most recent active session for `user_key` updated after `cutoff`.
    async fn active_session(
        &self,
        user_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, String>;

    async fn create_session(
        &self,
        user_key: &str,
        model: &str,
        system_prompt: &str,
    ) -> Result<SessionRecord, String>;

    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), String>;

    /// Message rows in creation order.
    async fn load_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, String>;

    async fn touch_session(&self, session_id: &str) -> Result<(), String>;

    /// Flip `is_active` off; the next inbound message starts fresh.
    async fn close_session(&self, session_id: &str) -> Result<(), String>;
}

// ─── MemorySessionStore ───────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    sessions: Vec<SessionRecord>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

/// In-memory [`SessionStore`].
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<MemoryInner>,
}

impl MemorySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().map(|i| i.sessions.len()).unwrap_or(0)
    }

    pub fn message_count(&self, session_id: &str) -> usize {
        self.inner
            .lock()
            .ok()
            .and_then(|i| i.messages.get(session_id).map(Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, String> {
        self.inner.lock().map_err(|_| "session store lock poisoned".to_string())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn active_session(
        &self,
        user_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, String> {
        let inner = self.lock()?;
        Ok(inner
            .sessions
            .iter()
            .filter(|s| s.user_key == user_key && s.is_active && s.updated_at > cutoff)
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn create_session(
        &self,
        user_key: &str,
        model: &str,
        system_prompt: &str,
    ) -> Result<SessionRecord, String> {
        let now = Utc::now();
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            user_key: user_key.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            created_at: now,
            updated_at: now,
            is_active: true,
        };
        let mut inner = self.lock()?;
        inner.sessions.push(record.clone());
        Ok(record)
    }

    async fn append_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), String> {
        let mut inner = self.lock()?;
        inner
            .messages
            .entry(session_id.to_string())
            .or_default()
            .push(StoredMessage {
                role,
                content: content.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn load_messages(&self, session_id: &str) -> Result<Vec<StoredMessage>, String> {
        let inner = self.lock()?;
        Ok(inner.messages.get(session_id).cloned().unwrap_or_default())
    }

    async fn touch_session(&self, session_id: &str) -> Result<(), String> {
        let mut inner = self.lock()?;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == session_id) {
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn close_session(&self, session_id: &str) -> Result<(), String> {
        let mut inner = self.lock()?;
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == session_id) {
            session.is_active = false;
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
