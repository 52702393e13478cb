//! Scheduling tools: the model's interface to the task engine.
//!
//! Natural-language times go through [`parse_natural_time`] first, with
//! ISO-8601 as the documented fallback format.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::{Value, json};

use async_trait::async_trait;

use crate::scheduler::{ActiveWindow, Scheduler, parse_natural_time};

use super::traits::{Tool, ToolResult};

/// All scheduling tools wired to one engine.
pub fn scheduler_tools(scheduler: Arc<Scheduler>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(SetReminderTool {
            scheduler: scheduler.clone(),
        }),
        Arc::new(ListRemindersTool {
            scheduler: scheduler.clone(),
        }),
        Arc::new(CancelReminderTool {
            scheduler: scheduler.clone(),
        }),
        Arc::new(AddCronTaskTool {
            scheduler: scheduler.clone(),
        }),
        Arc::new(DailyBriefingTool { scheduler }),
    ]
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

/// ISO-8601 fallback: RFC 3339 first, then a naive local timestamp.
fn parse_iso_time(text: &str) -> Option<DateTime<Local>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Local));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok()?;
    Local.from_local_datetime(&naive).earliest()
}

// ─── set_reminder ─────────────────────────────────────────────────────────────

struct SetReminderTool {
    scheduler: Arc<Scheduler>,
}

#[async_trait]
impl Tool for SetReminderTool {
    fn name(&self) -> &str {
        "set_reminder"
    }

    fn description(&self) -> &str {
        "Set a one-time reminder. Accepts natural times like 'in 30 minutes', \
         'tomorrow at 9am', 'at 6:30 pm', or an ISO-8601 timestamp."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "What to remind the user about."
                },
                "time_expression": {
                    "type": "string",
                    "description": "When to fire, e.g. 'in 30 minutes' or 'tomorrow at 9am'."
                }
            },
            "required": ["message", "time_expression"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let message = required_str(&args, "message")?;
        let expression = required_str(&args, "time_expression")?;

        let parsed: DateTime<Local> = parse_natural_time(expression)
            .or_else(|| parse_iso_time(expression))
            .ok_or_else(|| {
                format!(
                    "Could not parse time: '{expression}'. Try formats like \
                     'in 30 minutes', 'tomorrow at 9am', or ISO format."
                )
            })?;

        let delay = parsed.with_timezone(&Utc) - Utc::now();
        if delay <= chrono::Duration::zero() {
            return Err(format!("'{expression}' is in the past"));
        }

        let task = self.scheduler.add_reminder(message, delay, None);
        Ok(ToolResult::ok(format!(
            "Reminder set for {} (id: {}): {}",
            parsed.format("%Y-%m-%d %H:%M"),
            task.id,
            message
        ))
        .with_data(json!({"task_id": task.id})))
    }
}

// ─── list_reminders ───────────────────────────────────────────────────────────

struct ListRemindersTool {
    scheduler: Arc<Scheduler>,
}

#[async_trait]
impl Tool for ListRemindersTool {
    fn name(&self) -> &str {
        "list_reminders"
    }

    fn description(&self) -> &str {
        "List all enabled reminders and scheduled tasks with their next run times."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, String> {
        let tasks = self.scheduler.list_tasks(true);
        if tasks.is_empty() {
            return Ok(ToolResult::ok("No scheduled tasks or reminders."));
        }

        let mut lines = vec![format!("Scheduled tasks ({}):", tasks.len())];
        for task in &tasks {
            let next = task
                .next_run
                .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "not scheduled".to_string());
            let preview: String = task.prompt.chars().take(50).collect();
            lines.push(format!(
                "- {} (id: {}, {:?}) next: {next}: {preview}",
                task.name, task.id, task.kind
            ));
        }
        Ok(ToolResult::ok(lines.join("\n")))
    }
}

// ─── cancel_reminder ──────────────────────────────────────────────────────────

struct CancelReminderTool {
    scheduler: Arc<Scheduler>,
}

#[async_trait]
impl Tool for CancelReminderTool {
    fn name(&self) -> &str {
        "cancel_reminder"
    }

    fn description(&self) -> &str {
        "Cancel a scheduled task or reminder by its id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string", "description": "Id of the task to cancel."}
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let task_id = required_str(&args, "task_id")?;
        if self.scheduler.remove_task(task_id) {
            Ok(ToolResult::ok(format!("Removed task {task_id}")))
        } else {
            Err(format!("Task not found: {task_id}"))
        }
    }
}

// ─── add_cron_task ────────────────────────────────────────────────────────────

struct AddCronTaskTool {
    scheduler: Arc<Scheduler>,
}

#[async_trait]
impl Tool for AddCronTaskTool {
    fn name(&self) -> &str {
        "add_cron_task"
    }

    fn description(&self) -> &str {
        "Add a recurring task from a 5-field cron expression \
         (minute hour day month weekday), e.g. '0 9 * * *' for 9am daily. \
         Optionally restrict firing to an active-hours window."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Human-readable task name."},
                "prompt": {
                    "type": "string",
                    "description": "Prompt to run through the agent when the task fires."
                },
                "cron_expression": {"type": "string", "description": "5-field cron expression."},
                "active_hours_start": {
                    "type": "integer",
                    "description": "First active hour, 0-23 (optional)."
                },
                "active_hours_end": {
                    "type": "integer",
                    "description": "Hour the window closes, 1-24 (optional)."
                }
            },
            "required": ["name", "prompt", "cron_expression"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let name = required_str(&args, "name")?;
        let prompt = required_str(&args, "prompt")?;
        let cron_expression = required_str(&args, "cron_expression")?;

        let start = args.get("active_hours_start").and_then(Value::as_u64);
        let end = args.get("active_hours_end").and_then(Value::as_u64);
        let active_window = match (start, end) {
            (Some(start), Some(end)) if start < 24 && end <= 24 && start < end => {
                Some(ActiveWindow {
                    start_hour: start as u8,
                    end_hour: end as u8,
                })
            }
            (Some(_), Some(_)) => return Err("invalid active-hours window".to_string()),
            _ => None,
        };

        let task = self
            .scheduler
            .add_cron_task(name, prompt, cron_expression, active_window)?;
        Ok(ToolResult::ok(format!(
            "Created recurring task '{}' (id: {}) on schedule '{cron_expression}'",
            task.name, task.id
        ))
        .with_data(json!({"task_id": task.id})))
    }
}

// ─── setup_daily_briefing ─────────────────────────────────────────────────────

struct DailyBriefingTool {
    scheduler: Arc<Scheduler>,
}

#[async_trait]
impl Tool for DailyBriefingTool {
    fn name(&self) -> &str {
        "setup_daily_briefing"
    }

    fn description(&self) -> &str {
        "Set up (or move) the daily briefing delivered every morning. \
         Defaults to 08:00 local time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "hour": {"type": "integer", "description": "Hour 0-23, default 8."},
                "minute": {"type": "integer", "description": "Minute 0-59, default 0."},
                "prompt": {
                    "type": "string",
                    "description": "Custom briefing prompt (optional)."
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let hour = args.get("hour").and_then(Value::as_u64).unwrap_or(8);
        let minute = args.get("minute").and_then(Value::as_u64).unwrap_or(0);
        if hour > 23 || minute > 59 {
            return Err(format!("invalid briefing time {hour:02}:{minute:02}"));
        }
        let prompt = args
            .get("prompt")
            .and_then(Value::as_str)
            .map(str::to_string);

        let task = self
            .scheduler
            .add_daily_briefing(hour as u8, minute as u8, prompt)?;
        Ok(ToolResult::ok(format!(
            "Daily briefing scheduled at {hour:02}:{minute:02} (id: {})",
            task.id
        )))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn scheduler(dir: &tempfile::TempDir) -> Arc<Scheduler> {
        Arc::new(Scheduler::new(
            dir.path().join("scheduled_tasks.json"),
            Duration::from_secs(30),
        ))
    }

    #[tokio::test]
    async fn set_reminder_parses_natural_time() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let tool = SetReminderTool {
            scheduler: scheduler.clone(),
        };

        let result = tool
            .execute(json!({"message": "stretch", "time_expression": "in 30 minutes"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("Reminder set"));
        assert_eq!(scheduler.list_tasks(true).len(), 1);
    }

    #[tokio::test]
    async fn set_reminder_rejects_unparseable_time() {
        let dir = tempfile::tempdir().unwrap();
        let tool = SetReminderTool {
            scheduler: scheduler(&dir),
        };

        let err = tool
            .execute(json!({"message": "x", "time_expression": "whenever"}))
            .await
            .unwrap_err();
        assert!(err.contains("Could not parse time"));
    }

    #[tokio::test]
    async fn list_reminders_reports_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListRemindersTool {
            scheduler: scheduler(&dir),
        };
        let result = tool.execute(json!({})).await.unwrap();
        assert_eq!(result.output, "No scheduled tasks or reminders.");
    }

    #[tokio::test]
    async fn cancel_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let task = scheduler.add_reminder("hydrate", chrono::Duration::minutes(5), None);

        let tool = CancelReminderTool {
            scheduler: scheduler.clone(),
        };
        let result = tool.execute(json!({"task_id": task.id})).await.unwrap();
        assert!(result.success);
        assert!(scheduler.list_tasks(false).is_empty());

        let err = tool.execute(json!({"task_id": task.id})).await.unwrap_err();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn add_cron_task_with_window() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(&dir);
        let tool = AddCronTaskTool {
            scheduler: scheduler.clone(),
        };

        let result = tool
            .execute(json!({
                "name": "standup",
                "prompt": "remind me about standup",
                "cron_expression": "0 9 * * *",
                "active_hours_start": 8,
                "active_hours_end": 18,
            }))
            .await
            .unwrap();
        assert!(result.success);

        let tasks = scheduler.list_tasks(true);
        assert_eq!(tasks[0].active_window.unwrap().start_hour, 8);
    }

    #[tokio::test]
    async fn add_cron_task_rejects_bad_expression() {
        let dir = tempfile::tempdir().unwrap();
        let tool = AddCronTaskTool {
            scheduler: scheduler(&dir),
        };
        let err = tool
            .execute(json!({"name": "n", "prompt": "p", "cron_expression": "bogus"}))
            .await
            .unwrap_err();
        assert!(err.contains("invalid cron expression"));
    }

    #[tokio::test]
    async fn daily_briefing_validates_time() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DailyBriefingTool {
            scheduler: scheduler(&dir),
        };
        assert!(tool.execute(json!({"hour": 25})).await.is_err());
        assert!(tool.execute(json!({"hour": 7, "minute": 30})).await.unwrap().success);
    }
}
