//! Session manager: maps (user, idle window) → live conversation.
//!
//! Each conversation is guarded by its own async mutex, so concurrent
//! messages from one user serialize rather than interleave, including
//! scheduler-originated turns, which go through the same path. Across
//! users, turns progress independently.

pub mod store;

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use chrono::{Duration, Utc};
use lru::LruCache;
use tokio::sync::Mutex as AsyncMutex;

use crate::agent::AgentLoop;
use crate::conversation::Conversation;
use crate::llm::{ChatMessage, Role};
use crate::prompt::SystemPromptBuilder;

pub use store::{MemorySessionStore, SessionRecord, SessionStore, StoredMessage};

const DEFAULT_CACHE_SIZE: usize = 64;

type SharedConversation = Arc<AsyncMutex<Conversation>>;

pub struct SessionManager {
    agent: Arc<AgentLoop>,
    store: Arc<dyn SessionStore>,
    prompt_builder: Arc<dyn SystemPromptBuilder>,
    default_model: String,
    idle_timeout: Duration,
    contexts: Mutex<LruCache<String, SharedConversation>>,
    /// Serializes session resolution so racing messages from one user
    /// cannot create two sessions.
    resolve_lock: AsyncMutex<()>,
}

impl SessionManager {
    pub fn new(
        agent: Arc<AgentLoop>,
        store: Arc<dyn SessionStore>,
        prompt_builder: Arc<dyn SystemPromptBuilder>,
        default_model: impl Into<String>,
        idle_timeout: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_CACHE_SIZE)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            agent,
            store,
            prompt_builder,
            default_model: default_model.into(),
            idle_timeout,
            contexts: Mutex::new(LruCache::new(capacity)),
            resolve_lock: AsyncMutex::new(()),
        }
    }

    /// Cap the in-memory conversation cache.
    pub fn with_cache_size(mut self, capacity: usize) -> Self {
        if let Some(capacity) = NonZeroUsize::new(capacity) {
            self.contexts = Mutex::new(LruCache::new(capacity));
        }
        self
    }

    // ── Inbound path ──────────────────────────────────────────────────────────

    /// Process one inbound message for `user_key` and return the reply.
    ///
    /// Persistence failures are logged but never fail the turn; the
    /// in-memory conversation stays authoritative and later writes retry.
    #[tracing::instrument(name = "session.handle", skip(self, text), fields(user = user_key))]
    pub async fn handle_message(&self, user_key: &str, text: &str) -> String {
        // Resolution and cache lookup happen under one lock so racing
        // messages from the same user land on the same conversation.
        let (session, conversation) = {
            let _guard = self.resolve_lock.lock().await;
            let session = match self.resolve_session(user_key).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!(error = %e, "failed to resolve session");
                    return "I'm having trouble accessing your conversation right now. \
                            Please try again in a moment."
                        .to_string();
                }
            };
            let conversation = self.context_for(&session).await;
            (session, conversation)
        };
        let mut guard = conversation.lock().await;

        if let Err(e) = self.store.append_message(&session.id, Role::User, text).await {
            tracing::warn!(error = %e, "failed to persist user message");
        }

        let reply = self.agent.process(text, &mut guard).await;

        if let Err(e) = self
            .store
            .append_message(&session.id, Role::Assistant, &reply)
            .await
        {
            tracing::warn!(error = %e, "failed to persist assistant message");
        }
        if let Err(e) = self.store.touch_session(&session.id).await {
            tracing::warn!(error = %e, "failed to touch session");
        }

        reply
    }

    /// Close the user's active session and drop its cached conversation.
    pub async fn clear(&self, user_key: &str) -> Result<(), String> {
        let cutoff = Utc::now() - self.idle_timeout;
        if let Some(session) = self.store.active_session(user_key, cutoff).await? {
            self.store.close_session(&session.id).await?;
            if let Ok(mut contexts) = self.contexts.lock() {
                contexts.pop(&session.id);
            }
            tracing::info!(user = user_key, session = %session.id, "session cleared");
        }
        Ok(())
    }

    /// Evict a conversation from the cache without closing the session.
    pub fn evict(&self, session_id: &str) {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.pop(session_id);
        }
    }

    // ── Internal ──────────────────────────────────────────────────────────────

    async fn resolve_session(&self, user_key: &str) -> Result<SessionRecord, String> {
        let cutoff = Utc::now() - self.idle_timeout;
        if let Some(session) = self.store.active_session(user_key, cutoff).await? {
            return Ok(session);
        }
        let session = self
            .store
            .create_session(user_key, &self.default_model, &self.prompt_builder.build())
            .await?;
        tracing::info!(user = user_key, session = %session.id, "created new session");
        Ok(session)
    }

    /// Cached conversation for a session, rehydrating from persisted rows
    /// on a miss.
    async fn context_for(&self, session: &SessionRecord) -> SharedConversation {
        if let Ok(mut contexts) = self.contexts.lock()
            && let Some(conversation) = contexts.get(&session.id)
        {
            return conversation.clone();
        }

        let mut conversation =
            Conversation::new(&session.system_prompt).with_model_hint(&session.model);
        match self.store.load_messages(&session.id).await {
            Ok(rows) => {
                // Only user/assistant rows are persisted; anything else
                // would dangle without its surrounding tool-call context.
                conversation.messages = rows
                    .into_iter()
                    .filter_map(|row| match row.role {
                        Role::User => Some(ChatMessage::user(row.content)),
                        Role::Assistant => Some(ChatMessage::assistant(row.content)),
                        Role::System | Role::Tool => None,
                    })
                    .collect();
            }
            Err(e) => tracing::warn!(error = %e, "failed to rehydrate conversation"),
        }

        let shared = Arc::new(AsyncMutex::new(conversation));
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.put(session.id.clone(), shared.clone());
        }
        shared
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
