//! The agent reasoning loop.

pub mod loop_;

pub use loop_::{AgentLoop, LoopConfig};
