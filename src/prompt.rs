//! System-prompt composition.
//!
//! Personality lives behind [`SystemPromptBuilder`] so richer sources
//! (persona files, per-user profiles) can be swapped in without touching
//! the loop or the session manager.

/// Default persona for a fresh deployment.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a personal assistant running as a long-lived agent on the user's own \
infrastructure.

You have access to tools for looking things up, scheduling reminders and \
recurring tasks, and acting on the user's behalf.

Guidelines:
1. Be helpful, accurate, and concise
2. Use tools when you need current information or to perform an action
3. Explain your reasoning when it helps
4. If you're unsure, say so and offer to look it up
5. Format responses in plain Markdown

You run on the user's personal device; protect their privacy and never leak \
credentials or personal data into tool arguments that don't need them.";

/// Produces the system prompt handed to the LLM gateway on each call.
pub trait SystemPromptBuilder: Send + Sync {
    fn build(&self) -> String;
}

/// Fixed-text builder; the default when no persona source is configured.
pub struct StaticPromptBuilder {
    prompt: String,
}

impl StaticPromptBuilder {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl Default for StaticPromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl SystemPromptBuilder for StaticPromptBuilder {
    fn build(&self) -> String {
        self.prompt.clone()
    }
}
