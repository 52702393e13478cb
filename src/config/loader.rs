//! Configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `~/.adjutant/config.toml` (or the path in `ADJUTANT_CONFIG`)
//! 2. Apply `ADJUTANT_*` environment variable overrides
//! 3. Fall back to [`AppConfig::default()`] if the file is missing

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use super::schema::AppConfig;

// ─── Paths ────────────────────────────────────────────────────────────────────

/// Default config file path: `~/.adjutant/config.toml`.
pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::home_dir()
        .map(|home| home.join(".adjutant").join("config.toml"))
        .ok_or_else(|| "could not determine home directory".to_string())
}

/// Default data directory: `~/.adjutant`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".adjutant"))
        .unwrap_or_else(|| PathBuf::from(".adjutant"))
}

// ─── Loading ──────────────────────────────────────────────────────────────────

/// Load [`AppConfig`] from `path`, falling back to defaults if the file
/// does not exist, then applying environment overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from `ADJUTANT_CONFIG` or the default path.
pub fn load_default_config() -> AppConfig {
    let path = env::var("ADJUTANT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml"))
        });
    load_config(&path).unwrap_or_default()
}

/// Apply `ADJUTANT_*` environment overrides.
///
/// Supported:
/// - `ADJUTANT_PROVIDER_ID`       → `provider.id`
/// - `ADJUTANT_PROVIDER_MODEL`    → `provider.model`
/// - `ADJUTANT_API_KEY`           → `provider.api_key`
/// - `ADJUTANT_BASE_URL`          → `provider.base_url`
/// - `ADJUTANT_APPROVAL_REQUIRED` → `approval.required` (1/0)
/// - `ADJUTANT_DATA_DIR`          → `scheduler.data_dir`
///
/// An empty `provider.api_key` additionally falls back to the provider's
/// conventional variable (`ANTHROPIC_API_KEY` / `OPENAI_API_KEY`).
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = env::var("ADJUTANT_PROVIDER_ID") {
        config.provider.id = v;
    }
    if let Ok(v) = env::var("ADJUTANT_PROVIDER_MODEL") {
        config.provider.model = v;
    }
    if let Ok(v) = env::var("ADJUTANT_API_KEY") {
        config.provider.api_key = v;
    }
    if let Ok(v) = env::var("ADJUTANT_BASE_URL") {
        config.provider.base_url = Some(v);
    }
    if let Ok(v) = env::var("ADJUTANT_APPROVAL_REQUIRED") {
        config.approval.required = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Ok(v) = env::var("ADJUTANT_DATA_DIR") {
        config.scheduler.data_dir = Some(v);
    }

    if config.provider.api_key.is_empty() {
        let fallback = match config.provider.id.as_str() {
            "anthropic" => env::var("ANTHROPIC_API_KEY").ok(),
            "openai" => env::var("OPENAI_API_KEY").ok(),
            _ => None,
        };
        if let Some(key) = fallback {
            config.provider.api_key = key;
        }
    }
}

// ─── Saving ───────────────────────────────────────────────────────────────────

/// Atomically save `config` to `path` (write temp, then rename).
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| format!("failed to serialize config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp config: {e}"))?;
    fs::rename(&tmp_path, path).map_err(|e| format!("failed to replace config file: {e}"))?;
    Ok(())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
