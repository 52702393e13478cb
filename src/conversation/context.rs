//! Per-session conversation log and token estimation.
//!
//! The log is append-only while a turn is running; the compactor is the
//! only writer allowed to replace it wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, ToolCall};

/// Conservative characters-per-token approximation.
pub const CHARS_PER_TOKEN: usize = 4;

/// Per-message overhead in characters (role markers, formatting).
pub const MESSAGE_OVERHEAD_CHARS: usize = 20;

/// Estimate the token footprint of a message list.
///
/// Monotone in both message length and message count; the empty list
/// estimates to zero.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    (chars + messages.len() * MESSAGE_OVERHEAD_CHARS) / CHARS_PER_TOKEN
}

// ─── Conversation ─────────────────────────────────────────────────────────────

/// Ordered message log for one session, owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
    /// Preferred model for this conversation, if the user set one.
    pub model_hint: Option<String>,
    /// How many times the log has been compacted.
    pub compaction_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            system_prompt: system_prompt.into(),
            model_hint: None,
            compaction_count: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_model_hint(mut self, model: impl Into<String>) -> Self {
        self.model_hint = Some(model.into());
        self
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::assistant(content));
    }

    pub fn add_assistant_tool_calls(
        &mut self,
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) {
        self.push(ChatMessage::assistant_with_tools(content, tool_calls));
    }

    pub fn add_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.push(ChatMessage::tool_result(tool_call_id, tool_name, content));
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Drop the oldest messages so at most `max_messages` remain.
    pub fn truncate(&mut self, max_messages: usize) {
        if self.messages.len() > max_messages {
            let drop = self.messages.len() - max_messages;
            self.messages.drain(..drop);
            self.updated_at = Utc::now();
        }
    }

    /// Replace the whole log with a compacted version. The compaction
    /// counter only ever moves forward.
    pub fn replace_after_compaction(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.compaction_count += 1;
        self.updated_at = Utc::now();
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.messages)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_estimates_zero_tokens() {
        assert_eq!(estimate_tokens(&[]), 0);
    }

    #[test]
    fn estimate_is_monotone_in_length_and_count() {
        let short = vec![ChatMessage::user("hi")];
        let long = vec![ChatMessage::user("hi there, this is a longer message")];
        assert!(estimate_tokens(&long) > estimate_tokens(&short));

        let two = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        assert!(estimate_tokens(&two) > estimate_tokens(&short));
    }

    #[test]
    fn appends_keep_order() {
        let mut conv = Conversation::new("persona");
        conv.add_user_message("hi");
        conv.add_assistant_message("hello");
        conv.add_user_message("search cats");
        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages[0].content, "hi");
        assert_eq!(conv.messages[2].content, "search cats");
    }

    #[test]
    fn truncate_drops_oldest_first() {
        let mut conv = Conversation::new("persona");
        for i in 0..10 {
            conv.add_user_message(format!("msg {i}"));
        }
        conv.truncate(4);
        assert_eq!(conv.len(), 4);
        assert_eq!(conv.messages[0].content, "msg 6");
        assert_eq!(conv.messages[3].content, "msg 9");
    }

    #[test]
    fn truncate_is_noop_under_limit() {
        let mut conv = Conversation::new("persona");
        conv.add_user_message("only one");
        conv.truncate(50);
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn compaction_counter_is_monotone() {
        let mut conv = Conversation::new("persona");
        conv.add_user_message("hi");
        conv.replace_after_compaction(vec![ChatMessage::user("summary")]);
        assert_eq!(conv.compaction_count, 1);
        conv.replace_after_compaction(vec![ChatMessage::user("summary 2")]);
        assert_eq!(conv.compaction_count, 2);
    }
}
