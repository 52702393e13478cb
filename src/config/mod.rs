//! Application configuration: schema, loading, and atomic saves.

pub mod loader;
pub mod schema;

pub use loader::{default_config_path, default_data_dir, load_config, load_default_config, save_config};
pub use schema::{
    AgentConfig, AppConfig, ApprovalConfig, LimitsConfig, ProviderConfig, SchedulerConfig,
    SessionConfig,
};
