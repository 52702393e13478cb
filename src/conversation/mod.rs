//! Conversation store and compactor.

pub mod compaction;
pub mod context;

pub use compaction::{CompactionConfig, CompactionReport, compact, needs_compaction};
pub use context::{Conversation, estimate_tokens};
