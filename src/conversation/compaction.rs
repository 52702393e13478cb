//! Adaptive conversation compaction.
//!
//! # Algorithm
//!
//! ```text
//! estimate tokens ≥ threshold · budget?
//!       │
//!       ▼
//! split log: older | recent (last 2·keep_recent kept verbatim)
//!       │
//!       ▼
//! older → preserved (importance ≥ 8, tool-call blocks kept whole)
//!       → to-summarize (everything else)
//!       │
//!       ▼
//! mine key facts → LLM summary (deterministic fallback on any failure)
//!       │
//!       ▼
//! new log = [summary, ack, preserved…, recent…]
//! ```
//!
//! An assistant message carrying tool calls travels together with its
//! tool-result followers: the block is preserved or summarized as a unit so
//! no `tool_call_id` reference is left dangling.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, GatewayError, LlmProvider, Role};

use super::context::estimate_tokens;

/// Importance score at or above which an older message is kept verbatim.
const PRESERVE_THRESHOLD: u8 = 8;

/// Cap on mined key facts handed to the summarizer.
const MAX_KEY_FACTS: usize = 10;

/// Prefix of the synthetic user message that carries the summary.
pub const SUMMARY_MESSAGE_PREFIX: &str = "[Previous conversation summary]: ";

/// Assistant acknowledgement appended right after the summary.
pub const SUMMARY_ACK: &str =
    "I've noted the conversation context. Let me continue helping you with that in mind.";

const SUMMARIZER_SYSTEM_PROMPT: &str =
    "You are a conversation summarizer. Create concise, fact-preserving summaries.";

/// Markers that suggest a message states a fact worth preserving.
const FACT_MARKERS: &[&str] = &[
    "remember", "important", "my name", "my email", "password", "api key", "deadline", "meeting",
    "address", "phone",
];

/// Phrases in user messages that flag stated facts for the key-fact list.
const USER_FACT_PHRASES: &[&str] = &[
    "my name is",
    "i work",
    "i live",
    "i prefer",
    "remember that",
    "don't forget",
    "important:",
];

// ─── Config & report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompactionConfig {
    /// Hard context budget in estimated tokens.
    pub max_context_tokens: usize,
    /// Fraction of the budget that triggers compaction.
    pub compaction_threshold: f64,
    /// Trailing messages kept verbatim (the split keeps `2 ×` this many).
    pub keep_recent_messages: usize,
    pub enabled: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 100_000,
            compaction_threshold: 0.7,
            keep_recent_messages: 10,
            enabled: true,
        }
    }
}

/// Outcome of one compaction pass.
#[derive(Debug, Clone)]
pub struct CompactionReport {
    pub original_message_count: usize,
    pub compacted_message_count: usize,
    pub summary: String,
    pub tokens_saved_estimate: usize,
    pub used_fallback: bool,
}

// ─── Trigger ──────────────────────────────────────────────────────────────────

/// Whether the log is due for compaction under `config`.
pub fn needs_compaction(messages: &[ChatMessage], config: &CompactionConfig) -> bool {
    if !config.enabled {
        return false;
    }
    if messages.len() <= config.keep_recent_messages * 2 {
        return false;
    }
    let threshold_tokens =
        (config.max_context_tokens as f64 * config.compaction_threshold) as usize;
    estimate_tokens(messages) >= threshold_tokens
}

// ─── Importance scoring ───────────────────────────────────────────────────────

/// Rate a message's importance for verbatim preservation, 0–10.
///
/// Deterministic by design: only role, fact/error markers, and length feed
/// the score.
fn message_importance(message: &ChatMessage) -> u8 {
    let mut score: i32 = 5;
    let content_lower = message.content.to_lowercase();

    if message.role == Role::Tool {
        score += 2;
    }
    if !message.tool_calls.is_empty() {
        score += 2;
    }
    if FACT_MARKERS.iter().any(|m| content_lower.contains(m)) {
        score += 3;
    }
    if content_lower.contains("error") || content_lower.contains("failed") {
        score += 1;
    }
    if message.content.chars().count() < 20 {
        score -= 2;
    }
    if message.content.chars().count() > 1000 {
        score += 1;
    }

    score.clamp(0, 10) as u8
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ─── Key facts ────────────────────────────────────────────────────────────────

/// Mine concrete facts out of the messages about to be summarized.
fn extract_key_facts(messages: &[ChatMessage]) -> Vec<String> {
    let mut facts = Vec::new();

    for msg in messages {
        match msg.role {
            Role::Tool if !msg.content.trim().is_empty() => {
                facts.push(format!("[Tool result]: {}", truncate_chars(&msg.content, 200)));
            }
            Role::User => {
                let lower = msg.content.to_lowercase();
                if USER_FACT_PHRASES.iter().any(|p| lower.contains(p)) {
                    facts.push(format!("[User stated]: {}", truncate_chars(&msg.content, 200)));
                }
            }
            _ => {}
        }
    }

    facts.truncate(MAX_KEY_FACTS);
    facts
}

// ─── Partitioning ─────────────────────────────────────────────────────────────

/// Split `older` into preserved and to-summarize message lists.
///
/// Tool-call blocks (assistant with tool_calls plus its trailing tool
/// results) move as a unit. A block cut off by the recent boundary
/// (`tail_continues`) is force-preserved because its results survive in
/// the recent tail. A tool result whose parent assistant is not in `older`
/// is never preserved on its own.
fn partition_older(
    older: &[ChatMessage],
    tail_continues: bool,
) -> (Vec<ChatMessage>, Vec<ChatMessage>) {
    let mut preserved = Vec::new();
    let mut to_summarize = Vec::new();

    let mut i = 0;
    while i < older.len() {
        let msg = &older[i];

        if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
            let mut end = i + 1;
            while end < older.len() && older[end].role == Role::Tool {
                end += 1;
            }
            let block = &older[i..end];
            let cut_off = end == older.len() && tail_continues;
            let keep = cut_off || block.iter().any(|m| message_importance(m) >= PRESERVE_THRESHOLD);
            if keep {
                preserved.extend_from_slice(block);
            } else {
                to_summarize.extend_from_slice(block);
            }
            i = end;
            continue;
        }

        if msg.role == Role::Tool {
            // Orphaned tool result; preserving it alone would dangle.
            to_summarize.push(msg.clone());
        } else if message_importance(msg) >= PRESERVE_THRESHOLD {
            preserved.push(msg.clone());
        } else {
            to_summarize.push(msg.clone());
        }
        i += 1;
    }

    (preserved, to_summarize)
}

// ─── Summaries ────────────────────────────────────────────────────────────────

async fn generate_summary(
    provider: &dyn LlmProvider,
    messages: &[ChatMessage],
    key_facts: &[String],
) -> Result<String, GatewayError> {
    let transcript: Vec<String> = messages
        .iter()
        .map(|m| {
            format!(
                "{}: {}",
                m.role.as_str().to_uppercase(),
                truncate_chars(&m.content, 300)
            )
        })
        .collect();

    let facts_section = if key_facts.is_empty() {
        String::new()
    } else {
        let bullets: Vec<String> = key_facts.iter().map(|f| format!("- {f}")).collect();
        format!("\n\nKey facts to preserve:\n{}", bullets.join("\n"))
    };

    let prompt = format!(
        "Summarize the following conversation into a concise context block.\n\
         Preserve:\n\
         - Any specific facts, names, dates, or numbers mentioned\n\
         - The user's requests and what was accomplished\n\
         - Any preferences or important information the user shared\n\
         - Tool results and their outcomes\n\n\
         Keep it under 500 words.{facts_section}\n\n\
         Conversation:\n{}\n\nSummary:",
        transcript.join("\n")
    );

    let response = provider
        .generate(
            &[ChatMessage::user(prompt)],
            None,
            Some(SUMMARIZER_SYSTEM_PROMPT),
        )
        .await?;

    Ok(response.content.trim().to_string())
}

/// Deterministic summary used when the gateway call fails.
fn fallback_summary(messages: &[ChatMessage], key_facts: &[String]) -> String {
    let mut parts = vec!["Earlier in this conversation:".to_string()];

    if !key_facts.is_empty() {
        parts.push("\nKey information:".to_string());
        for fact in key_facts {
            parts.push(format!("  - {fact}"));
        }
    }

    let count_role = |role: Role| messages.iter().filter(|m| m.role == role).count();
    parts.push(format!(
        "\n[{} user messages, {} assistant responses, {} tool results summarized]",
        count_role(Role::User),
        count_role(Role::Assistant),
        count_role(Role::Tool),
    ));

    let user_messages: Vec<&ChatMessage> =
        messages.iter().filter(|m| m.role == Role::User).collect();
    if let Some(first) = user_messages.first() {
        parts.push(format!("\nFirst topic: {}", truncate_chars(&first.content, 150)));
        if user_messages.len() > 1
            && let Some(last) = user_messages.last()
        {
            parts.push(format!(
                "Last topic before this: {}",
                truncate_chars(&last.content, 150)
            ));
        }
    }

    parts.join("\n")
}

// ─── Compaction ───────────────────────────────────────────────────────────────

/// Compact a conversation log by summarizing its older half.
///
/// The last `2 × keep_recent_messages` entries are returned bit-identical;
/// the remainder is reduced to a summary pair plus preserved messages.
/// Gateway failures fall back to [`fallback_summary`]; compaction itself
/// never fails.
#[tracing::instrument(name = "compaction.run", skip_all, fields(messages = messages.len()))]
pub async fn compact(
    provider: &dyn LlmProvider,
    messages: &[ChatMessage],
    config: &CompactionConfig,
) -> (Vec<ChatMessage>, CompactionReport) {
    let original_tokens = estimate_tokens(messages);
    let keep_count = (config.keep_recent_messages * 2).min(messages.len());
    let split = messages.len() - keep_count;
    let (older, recent) = messages.split_at(split);

    if older.is_empty() {
        let report = CompactionReport {
            original_message_count: messages.len(),
            compacted_message_count: messages.len(),
            summary: String::new(),
            tokens_saved_estimate: 0,
            used_fallback: false,
        };
        return (messages.to_vec(), report);
    }

    let key_facts = extract_key_facts(older);
    let tail_continues = recent.first().is_some_and(|m| m.role == Role::Tool);
    let (preserved, to_summarize) = partition_older(older, tail_continues);

    let (summary, used_fallback) = match generate_summary(provider, &to_summarize, &key_facts).await
    {
        Ok(summary) => (summary, false),
        Err(e) => {
            tracing::warn!(error = %e, "summarization failed, using deterministic fallback");
            (fallback_summary(&to_summarize, &key_facts), true)
        }
    };

    let mut compacted =
        Vec::with_capacity(2 + preserved.len() + recent.len());
    compacted.push(ChatMessage::user(format!("{SUMMARY_MESSAGE_PREFIX}{summary}")));
    compacted.push(ChatMessage::assistant(SUMMARY_ACK));
    compacted.extend(preserved);
    compacted.extend_from_slice(recent);

    let report = CompactionReport {
        original_message_count: messages.len(),
        compacted_message_count: compacted.len(),
        summary: truncate_chars(&summary, 500),
        tokens_saved_estimate: original_tokens.saturating_sub(estimate_tokens(&compacted)),
        used_fallback,
    };

    tracing::info!(
        original = report.original_message_count,
        compacted = report.compacted_message_count,
        tokens_saved = report.tokens_saved_estimate,
        "compaction complete"
    );

    (compacted, report)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
