//! Cron-and-delay task engine that fires scheduled prompts on behalf of an
//! absent user.

pub mod engine;
pub mod task;

pub use engine::{DEFAULT_TICK_SECS, Scheduler, TaskCallback};
pub use task::{ActiveWindow, ScheduledTask, TaskKind, parse_cron, parse_natural_time};
