//! Scheduled-task records, next-run computation, and natural-language time
//! parsing.
//!
//! Cron and active-window evaluation use wall-clock local time; stored
//! timestamps are UTC. Behavior across a DST edge follows whatever the
//! local offset says at tick time.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// How many upcoming cron times to inspect for an active-window match
/// before giving up until the next pass.
const MAX_CRON_EXPANSIONS: usize = 1_000;

// ─── TaskKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Recurring, driven by a cron expression.
    Cron,
    /// Fires once at `scheduled_at`, then disables itself.
    OneShot,
    /// Like one-shot, created from a natural-language time.
    Reminder,
    /// Recurring briefing at a fixed daily time.
    DailyBriefing,
    /// Recurring presence check during active hours.
    Heartbeat,
}

impl TaskKind {
    /// Kinds that disable themselves after a single fire.
    pub fn fires_once(&self) -> bool {
        matches!(self, TaskKind::OneShot | TaskKind::Reminder)
    }
}

// ─── ActiveWindow ─────────────────────────────────────────────────────────────

/// Local-time hour range `[start_hour, end_hour)` outside which a task is
/// skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl ActiveWindow {
    pub fn allows(&self, hour: u32) -> bool {
        (self.start_hour as u32) <= hour && hour < (self.end_hour as u32)
    }
}

// ─── ScheduledTask ────────────────────────────────────────────────────────────

/// A persisted unit of future work.
///
/// Invariants: cron-driven tasks carry `cron_expr`; one-shot and reminder
/// tasks carry `scheduled_at`; `next_run` is recomputed after every
/// successful fire and for every task at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub kind: TaskKind,
    /// The synthesized user prompt fired through the agent loop.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_window: Option<ActiveWindow>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, kind: TaskKind, prompt: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            name: name.into(),
            kind,
            prompt: prompt.into(),
            cron_expr: None,
            scheduled_at: None,
            active_window: None,
            enabled: true,
            last_run: None,
            next_run: None,
            metadata: Map::new(),
        }
    }

    /// Next fire time under the task's schedule, or `None` when the
    /// schedule cannot produce one (bad expression, exhausted one-shot, or
    /// no cron hit inside the active window within the expansion bound).
    pub fn compute_next_run(&self) -> Option<DateTime<Utc>> {
        if let Some(expr) = &self.cron_expr {
            let schedule = parse_cron(expr)?;
            return schedule
                .upcoming(Local)
                .take(MAX_CRON_EXPANSIONS)
                .find(|t| {
                    self.active_window
                        .is_none_or(|window| window.allows(t.hour()))
                })
                .map(|t| t.with_timezone(&Utc));
        }
        self.scheduled_at
    }

    /// Whether the task is due at `now`.
    pub fn should_run(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(next_run) = self.next_run else {
            return false;
        };
        if let Some(window) = self.active_window
            && !window.allows(now.with_timezone(&Local).hour())
        {
            return false;
        }
        now >= next_run
    }

    /// Record a completed fire and reschedule (or disable) the task.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        if self.kind.fires_once() {
            self.enabled = false;
            self.next_run = None;
        } else if self.cron_expr.is_some() {
            self.next_run = self.compute_next_run();
        }
    }
}

/// Short 8-character id, matching the approval-id shape users type back.
pub(crate) fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Parse a 5- or 6-field cron expression (5-field forms get a seconds
/// column prepended).
pub fn parse_cron(expr: &str) -> Option<cron::Schedule> {
    use std::str::FromStr;
    let full = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    cron::Schedule::from_str(&full).ok()
}

// ─── Natural-language time parsing ────────────────────────────────────────────

/// Parse a small closed set of natural time expressions into a future
/// local time. Returns `None` for anything else; callers may fall back to
/// ISO-8601.
pub fn parse_natural_time(text: &str) -> Option<DateTime<Local>> {
    let text = text.trim().to_lowercase();
    let now = Local::now();

    let relative = [
        (r"in (\d+) minutes?", 60i64),
        (r"in (\d+) hours?", 3600),
        (r"in (\d+) days?", 86_400),
    ];
    for (pattern, unit_secs) in relative {
        if let Some(captures) = Regex::new(pattern).ok()?.captures(&text) {
            let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
            return Some(now + Duration::seconds(amount * unit_secs));
        }
    }

    if let Some(captures) = Regex::new(r"tomorrow at (\d{1,2})(?::(\d{2}))?\s*(am|pm)?")
        .ok()?
        .captures(&text)
    {
        let hour = adjust_hour(
            captures.get(1)?.as_str().parse().ok()?,
            captures.get(3).map(|m| m.as_str()),
        );
        let minute = captures
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let tomorrow = now.date_naive().succ_opt()?;
        return local_at(tomorrow, hour, minute);
    }

    if let Some(captures) = Regex::new(r"at (\d{1,2}):(\d{2})\s*(am|pm)?")
        .ok()?
        .captures(&text)
    {
        let hour = adjust_hour(
            captures.get(1)?.as_str().parse().ok()?,
            captures.get(3).map(|m| m.as_str()),
        );
        let minute = captures.get(2)?.as_str().parse().ok()?;
        let result = local_at(now.date_naive(), hour, minute)?;
        return Some(roll_forward(result, now));
    }

    if let Some(captures) = Regex::new(r"at (\d{1,2})\s*(am|pm)").ok()?.captures(&text) {
        let hour = adjust_hour(
            captures.get(1)?.as_str().parse().ok()?,
            captures.get(2).map(|m| m.as_str()),
        );
        let result = local_at(now.date_naive(), hour, 0)?;
        return Some(roll_forward(result, now));
    }

    None
}

fn adjust_hour(hour: u32, period: Option<&str>) -> u32 {
    match period {
        Some("pm") if hour < 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    }
}

fn local_at(date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Local>> {
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Local.from_local_datetime(&naive).earliest()
}

/// A same-day time already in the past means tomorrow.
fn roll_forward(result: DateTime<Local>, now: DateTime<Local>) -> DateTime<Local> {
    if result < now {
        result + Duration::days(1)
    } else {
        result
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cron_task(expr: &str) -> ScheduledTask {
        let mut task = ScheduledTask::new("test", TaskKind::Cron, "do the thing");
        task.cron_expr = Some(expr.to_string());
        task
    }

    #[test]
    fn active_window_is_half_open() {
        let window = ActiveWindow {
            start_hour: 9,
            end_hour: 17,
        };
        assert!(!window.allows(8));
        assert!(window.allows(9));
        assert!(window.allows(16));
        assert!(!window.allows(17));
    }

    #[test]
    fn cron_next_run_is_in_the_future() {
        let mut task = cron_task("* * * * *");
        task.next_run = task.compute_next_run();
        assert!(task.next_run.is_some());
        assert!(task.next_run.unwrap() > Utc::now());
    }

    #[test]
    fn invalid_cron_gives_no_next_run() {
        let task = cron_task("not a cron expression");
        assert!(task.compute_next_run().is_none());
    }

    #[test]
    fn six_field_cron_is_accepted() {
        let task = cron_task("0 * * * * *");
        assert!(task.compute_next_run().is_some());
    }

    #[test]
    fn cron_next_run_respects_active_window() {
        let mut task = cron_task("* * * * *");
        task.active_window = Some(ActiveWindow {
            start_hour: 9,
            end_hour: 17,
        });
        if let Some(next) = task.compute_next_run() {
            let hour = next.with_timezone(&Local).hour();
            assert!((9..17).contains(&hour), "next run at hour {hour}");
        }
    }

    #[test]
    fn one_shot_next_run_is_scheduled_at() {
        let mut task = ScheduledTask::new("once", TaskKind::OneShot, "remind me");
        let at = Utc::now() + Duration::hours(1);
        task.scheduled_at = Some(at);
        assert_eq!(task.compute_next_run(), Some(at));
    }

    #[test]
    fn past_one_shot_is_due_and_fires_once() {
        let mut task = ScheduledTask::new("once", TaskKind::Reminder, "remind me");
        task.scheduled_at = Some(Utc::now() - Duration::seconds(1));
        task.next_run = task.compute_next_run();
        assert!(task.should_run(Utc::now()));

        task.mark_completed(Utc::now());
        assert!(!task.enabled);
        assert!(task.next_run.is_none());
        assert!(!task.should_run(Utc::now()));
    }

    #[test]
    fn cron_task_reschedules_after_completion() {
        let mut task = cron_task("* * * * *");
        task.next_run = Some(Utc::now() - Duration::seconds(5));
        task.mark_completed(Utc::now());
        assert!(task.enabled);
        assert!(task.next_run.unwrap() > Utc::now());
        assert!(task.last_run.is_some());
    }

    #[test]
    fn disabled_task_never_runs() {
        let mut task = cron_task("* * * * *");
        task.next_run = Some(Utc::now() - Duration::seconds(5));
        task.enabled = false;
        assert!(!task.should_run(Utc::now()));
    }

    #[test]
    fn out_of_window_task_is_skipped_at_fire_time() {
        let hour = Local::now().hour() as u8;
        let mut task = cron_task("* * * * *");
        // A one-hour window that excludes the current hour.
        let excluded = if hour == 0 { 1 } else { 0 };
        task.active_window = Some(ActiveWindow {
            start_hour: excluded,
            end_hour: excluded + 1,
        });
        task.next_run = Some(Utc::now() - Duration::seconds(5));
        assert!(!task.should_run(Utc::now()));
    }

    #[test]
    fn parse_relative_minutes() {
        let before = Local::now() + Duration::minutes(29);
        let parsed = parse_natural_time("in 30 minutes").unwrap();
        let after = Local::now() + Duration::minutes(31);
        assert!(parsed > before && parsed < after);
    }

    #[test]
    fn parse_relative_hours_and_days() {
        let parsed = parse_natural_time("in 2 hours").unwrap();
        assert!(parsed > Local::now() + Duration::minutes(119));

        let parsed = parse_natural_time("in 1 day").unwrap();
        assert!(parsed > Local::now() + Duration::hours(23));
    }

    #[test]
    fn parse_tomorrow_at() {
        let parsed = parse_natural_time("tomorrow at 9am").unwrap();
        assert_eq!(parsed.hour(), 9);
        assert_eq!(parsed.minute(), 0);
        assert_eq!(parsed.date_naive(), Local::now().date_naive().succ_opt().unwrap());

        let parsed = parse_natural_time("tomorrow at 14:30").unwrap();
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 30);
    }

    #[test]
    fn parse_at_time_rolls_past_times_to_tomorrow() {
        let parsed = parse_natural_time("at 11:59 pm").unwrap();
        assert_eq!(parsed.hour(), 23);
        assert_eq!(parsed.minute(), 59);
        assert!(parsed > Local::now());

        let parsed = parse_natural_time("at 7 am").unwrap();
        assert_eq!(parsed.hour(), 7);
        assert!(parsed > Local::now());
    }

    #[test]
    fn parse_pm_adds_twelve() {
        let parsed = parse_natural_time("tomorrow at 3pm").unwrap();
        assert_eq!(parsed.hour(), 15);

        let parsed = parse_natural_time("tomorrow at 12am").unwrap();
        assert_eq!(parsed.hour(), 0);
    }

    #[test]
    fn unparseable_text_returns_none() {
        assert!(parse_natural_time("whenever you feel like it").is_none());
        assert!(parse_natural_time("2025-01-01T09:00:00").is_none());
    }

    #[test]
    fn task_serde_round_trip() {
        let mut task = cron_task("0 9 * * *");
        task.active_window = Some(ActiveWindow {
            start_hour: 8,
            end_hour: 22,
        });
        task.metadata
            .insert("user_key".into(), Value::String("sam".into()));
        task.next_run = task.compute_next_run();

        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: ScheduledTask = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, task);
    }
}
