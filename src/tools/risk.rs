//! Static risk classification for tool names.
//!
//! Safe tools execute immediately, moderate tools execute with a logged
//! warning, dangerous tools are routed through the approval gate before
//! they may run. Unknown tools fall back to a configurable default.

use std::{collections::HashMap, fmt, sync::RwLock};

use serde::{Deserialize, Serialize};

// ─── RiskLevel ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Read-only lookups: search, recall, listing.
    Safe,
    /// Local effects that are easy to undo or inspect.
    #[default]
    Moderate,
    /// Irreversible or outward-facing side effects; requires approval.
    Dangerous,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Dangerous => "dangerous",
        };
        f.write_str(s)
    }
}

// ─── RiskClassifier ───────────────────────────────────────────────────────────

/// Name → risk mapping with runtime overrides.
pub struct RiskClassifier {
    map: RwLock<HashMap<String, RiskLevel>>,
    default_level: RiskLevel,
}

impl RiskClassifier {
    /// Build a classifier seeded with the built-in map.
    pub fn new(default_level: RiskLevel) -> Self {
        Self {
            map: RwLock::new(default_risk_map()),
            default_level,
        }
    }

    /// Risk level for a tool; unknown names get the configured default.
    pub fn risk_of(&self, tool_name: &str) -> RiskLevel {
        self.map
            .read()
            .ok()
            .and_then(|m| m.get(tool_name).copied())
            .unwrap_or(self.default_level)
    }

    /// Override the risk level for a tool at runtime.
    pub fn set_risk(&self, tool_name: &str, level: RiskLevel) {
        if let Ok(mut map) = self.map.write() {
            map.insert(tool_name.to_string(), level);
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(RiskLevel::Moderate)
    }
}

fn default_risk_map() -> HashMap<String, RiskLevel> {
    use RiskLevel::*;
    let entries = [
        // Safe: lookups and listings.
        ("web_search", Safe),
        ("browse_webpage", Safe),
        ("recall", Safe),
        ("remember", Safe),
        ("list_files", Safe),
        ("search_files", Safe),
        ("list_reminders", Safe),
        ("system_info", Safe),
        ("get_calendar", Safe),
        ("today_schedule", Safe),
        ("check_email", Safe),
        ("inbox_summary", Safe),
        // Moderate: contained side effects.
        ("execute_code", Moderate),
        ("read_file", Moderate),
        ("set_reminder", Moderate),
        ("cancel_reminder", Moderate),
        ("add_cron_task", Moderate),
        ("setup_daily_briefing", Moderate),
        ("create_event", Moderate),
        // Dangerous: irreversible or outward-facing.
        ("run_command", Dangerous),
        ("write_file", Dangerous),
        ("send_email", Dangerous),
        ("write_skill", Dangerous),
    ];
    entries
        .into_iter()
        .map(|(name, level)| (name.to_string(), level))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tools_use_builtin_map() {
        let classifier = RiskClassifier::default();
        assert_eq!(classifier.risk_of("web_search"), RiskLevel::Safe);
        assert_eq!(classifier.risk_of("execute_code"), RiskLevel::Moderate);
        assert_eq!(classifier.risk_of("run_command"), RiskLevel::Dangerous);
    }

    #[test]
    fn unknown_tools_fall_back_to_default() {
        let classifier = RiskClassifier::default();
        assert_eq!(classifier.risk_of("mystery_tool"), RiskLevel::Moderate);

        let strict = RiskClassifier::new(RiskLevel::Dangerous);
        assert_eq!(strict.risk_of("mystery_tool"), RiskLevel::Dangerous);
    }

    #[test]
    fn overrides_take_effect() {
        let classifier = RiskClassifier::default();
        classifier.set_risk("web_search", RiskLevel::Dangerous);
        assert_eq!(classifier.risk_of("web_search"), RiskLevel::Dangerous);
    }

    #[test]
    fn risk_level_serde_is_snake_case() {
        let encoded = serde_json::to_string(&RiskLevel::Dangerous).unwrap();
        assert_eq!(encoded, "\"dangerous\"");
        let decoded: RiskLevel = serde_json::from_str("\"safe\"").unwrap();
        assert_eq!(decoded, RiskLevel::Safe);
    }
}
