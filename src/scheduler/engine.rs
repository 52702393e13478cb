//! Tick-driven task engine with file-backed persistence.
//!
//! The scheduler owns an in-memory task map mirrored to a JSON file
//! (`write temp → rename`) on every mutation. A single background loop
//! wakes every `tick_interval`, fires due tasks through the injected
//! callback, and reschedules. Callback failures and panics are logged and
//! never disable a task.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::event_bus::{AgentEvent, EventBus};

use super::task::{ActiveWindow, ScheduledTask, TaskKind, parse_cron};

/// Scheduler tick interval ceiling.
pub const DEFAULT_TICK_SECS: u64 = 30;

/// What the engine runs when a task fires.
pub type TaskCallback = Arc<dyn Fn(ScheduledTask) -> BoxFuture<'static, ()> + Send + Sync>;

// ─── Persistence format ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct TasksFile {
    tasks: Vec<ScheduledTask>,
    updated_at: DateTime<Utc>,
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

pub struct Scheduler {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
    tasks_file: PathBuf,
    callback: Mutex<Option<TaskCallback>>,
    tick_interval: Duration,
    bus: Option<Arc<dyn EventBus>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Scheduler {
    /// Create a scheduler backed by `tasks_file`, loading any persisted
    /// tasks and recomputing every enabled task's `next_run`.
    pub fn new(tasks_file: impl Into<PathBuf>, tick_interval: Duration) -> Self {
        let tasks_file = tasks_file.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = Self {
            tasks: Mutex::new(HashMap::new()),
            tasks_file,
            callback: Mutex::new(None),
            tick_interval: tick_interval.min(Duration::from_secs(DEFAULT_TICK_SECS)),
            bus: None,
            stop_tx,
            stop_rx,
        };
        scheduler.load();
        scheduler
    }

    pub fn with_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Install the fire callback. The core wires nothing by default;
    /// transports typically route `task.prompt` through the agent loop and
    /// deliver the reply as an unsolicited message.
    pub fn set_callback(&self, callback: TaskCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Start the background tick loop.
    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let mut stop_rx = self.stop_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.tick_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => scheduler.tick().await,
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            tracing::info!("scheduler stopped");
                            break;
                        }
                    }
                }
            }
        });
        tracing::info!(interval_secs = self.tick_interval.as_secs(), "scheduler started");
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Run one scheduling pass: fire every due task, then reschedule and
    /// persist. Fires run sequentially; a slow task delays later ones
    /// rather than overlapping them.
    pub async fn tick(&self) {
        let now = Utc::now();
        let due: Vec<ScheduledTask> = {
            let Ok(tasks) = self.tasks.lock() else {
                return;
            };
            tasks.values().filter(|t| t.should_run(now)).cloned().collect()
        };

        for task in due {
            tracing::info!(task_id = %task.id, name = %task.name, "scheduled task due");
            self.publish(AgentEvent::TaskFired {
                task_id: task.id.clone(),
                name: task.name.clone(),
            });

            let callback = self.callback.lock().ok().and_then(|slot| slot.clone());
            if let Some(callback) = callback {
                // Spawned so a panicking callback is contained and logged
                // instead of taking the scheduler loop down with it.
                if let Err(e) = tokio::spawn(callback(task.clone())).await {
                    tracing::error!(task_id = %task.id, error = %e, "task callback failed");
                    self.publish(AgentEvent::SystemError {
                        message: format!("scheduled task '{}' callback failed: {e}", task.name),
                    });
                }
            }

            if let Ok(mut tasks) = self.tasks.lock()
                && let Some(stored) = tasks.get_mut(&task.id)
            {
                stored.mark_completed(Utc::now());
            }
            if let Err(e) = self.save() {
                tracing::error!(task_id = %task.id, error = %e, "failed to persist tasks");
            }
        }
    }

    // ── Task management ───────────────────────────────────────────────────────

    /// Add a recurring cron task. The expression is validated up front.
    pub fn add_cron_task(
        &self,
        name: impl Into<String>,
        prompt: impl Into<String>,
        cron_expr: impl Into<String>,
        active_window: Option<ActiveWindow>,
    ) -> Result<ScheduledTask, String> {
        let cron_expr = cron_expr.into();
        if parse_cron(&cron_expr).is_none() {
            return Err(format!(
                "invalid cron expression '{cron_expr}': expected 'minute hour day month weekday'"
            ));
        }
        let mut task = ScheduledTask::new(name, TaskKind::Cron, prompt);
        task.cron_expr = Some(cron_expr);
        task.active_window = active_window;
        task.next_run = task.compute_next_run();
        Ok(self.insert(task))
    }

    /// Add a task that fires once at `at`.
    pub fn add_one_shot(
        &self,
        name: impl Into<String>,
        prompt: impl Into<String>,
        at: DateTime<Utc>,
    ) -> ScheduledTask {
        let mut task = ScheduledTask::new(name, TaskKind::OneShot, prompt);
        task.scheduled_at = Some(at);
        task.next_run = Some(at);
        self.insert(task)
    }

    /// Add a reminder that fires after `delay`.
    pub fn add_reminder(
        &self,
        prompt: impl Into<String>,
        delay: chrono::Duration,
        name: Option<String>,
    ) -> ScheduledTask {
        let prompt = prompt.into();
        let name = name.unwrap_or_else(|| {
            let preview: String = prompt.chars().take(30).collect();
            format!("Reminder: {preview}...")
        });
        let mut task = ScheduledTask::new(name, TaskKind::Reminder, prompt);
        let at = Utc::now() + delay;
        task.scheduled_at = Some(at);
        task.next_run = Some(at);
        self.insert(task)
    }

    /// Add (or replace) the daily briefing at `hour:minute` local time.
    pub fn add_daily_briefing(
        &self,
        hour: u8,
        minute: u8,
        prompt: Option<String>,
    ) -> Result<ScheduledTask, String> {
        let default_prompt = "Generate my daily briefing including:\n\
             - Today's weather forecast\n\
             - My calendar events for today\n\
             - Any reminders or pending tasks\n\
             - Top 3 news headlines relevant to my interests\n\
             Keep it concise and actionable.";
        let mut task = ScheduledTask::new(
            "Daily Briefing",
            TaskKind::DailyBriefing,
            prompt.unwrap_or_else(|| default_prompt.to_string()),
        );
        // Stable id so repeated setup replaces rather than duplicates.
        task.id = "daily-briefing".to_string();
        let cron_expr = format!("{minute} {hour} * * *");
        if parse_cron(&cron_expr).is_none() {
            return Err(format!("invalid briefing time {hour:02}:{minute:02}"));
        }
        task.cron_expr = Some(cron_expr);
        task.next_run = task.compute_next_run();
        Ok(self.insert(task))
    }

    pub fn remove_task(&self, id: &str) -> bool {
        let removed = self
            .tasks
            .lock()
            .map(|mut tasks| tasks.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            if let Err(e) = self.save() {
                tracing::error!(error = %e, "failed to persist tasks after removal");
            }
            tracing::info!(task_id = id, "scheduled task removed");
        }
        removed
    }

    pub fn get_task(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.lock().ok().and_then(|tasks| tasks.get(id).cloned())
    }

    /// All tasks, soonest `next_run` first (unscheduled last).
    pub fn list_tasks(&self, enabled_only: bool) -> Vec<ScheduledTask> {
        let Ok(tasks) = self.tasks.lock() else {
            return Vec::new();
        };
        let mut list: Vec<ScheduledTask> = tasks
            .values()
            .filter(|t| !enabled_only || t.enabled)
            .cloned()
            .collect();
        list.sort_by_key(|t| t.next_run.unwrap_or(DateTime::<Utc>::MAX_UTC));
        list
    }

    pub fn due_tasks(&self) -> Vec<ScheduledTask> {
        let now = Utc::now();
        self.tasks
            .lock()
            .map(|tasks| tasks.values().filter(|t| t.should_run(now)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn tasks_file(&self) -> &Path {
        &self.tasks_file
    }

    // ── Internal ──────────────────────────────────────────────────────────────

    fn insert(&self, task: ScheduledTask) -> ScheduledTask {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.insert(task.id.clone(), task.clone());
        }
        if let Err(e) = self.save() {
            tracing::error!(task_id = %task.id, error = %e, "failed to persist new task");
        }
        tracing::info!(task_id = %task.id, name = %task.name, kind = ?task.kind, "scheduled task added");
        task
    }

    fn load(&self) {
        let content = match fs::read_to_string(&self.tasks_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(path = ?self.tasks_file, error = %e, "failed to read tasks file");
                return;
            }
        };
        let parsed: TasksFile = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = ?self.tasks_file, error = %e, "failed to parse tasks file");
                return;
            }
        };
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        for mut task in parsed.tasks {
            if task.enabled {
                task.next_run = task.compute_next_run();
            }
            tasks.insert(task.id.clone(), task);
        }
        tracing::info!(count = tasks.len(), "loaded scheduled tasks");
    }

    /// Atomic rewrite: write a sibling temp file, then rename over the
    /// target.
    fn save(&self) -> Result<(), String> {
        let tasks = {
            let Ok(tasks) = self.tasks.lock() else {
                return Err("task map lock poisoned".to_string());
            };
            let mut list: Vec<ScheduledTask> = tasks.values().cloned().collect();
            list.sort_by(|a, b| a.id.cmp(&b.id));
            list
        };
        let file = TasksFile {
            tasks,
            updated_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| format!("failed to serialize tasks: {e}"))?;

        if let Some(parent) = self.tasks_file.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("failed to create data dir: {e}"))?;
        }
        let tmp_path = self.tasks_file.with_extension("json.tmp");
        fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp file: {e}"))?;
        fs::rename(&tmp_path, &self.tasks_file)
            .map_err(|e| format!("failed to replace tasks file: {e}"))?;
        Ok(())
    }

    fn publish(&self, event: AgentEvent) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish(event);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_scheduler(dir: &tempfile::TempDir) -> Scheduler {
        Scheduler::new(dir.path().join("scheduled_tasks.json"), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn one_shot_fires_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        let fired = Arc::new(AtomicUsize::new(0));

        let task =
            scheduler.add_one_shot("ping", "say ping", Utc::now() - chrono::Duration::seconds(1));

        let fired_clone = fired.clone();
        scheduler.set_callback(Arc::new(move |t: ScheduledTask| {
            let fired = fired_clone.clone();
            Box::pin(async move {
                assert_eq!(t.prompt, "say ping");
                fired.fetch_add(1, Ordering::SeqCst);
            })
        }));

        scheduler.tick().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let stored = scheduler.get_task(&task.id).unwrap();
        assert!(!stored.enabled);
        assert!(stored.next_run.is_none());
        assert!(stored.last_run.is_some());

        // A second pass must not re-fire.
        scheduler.tick().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_disable_task() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        let task = scheduler
            .add_cron_task("every-minute", "tick", "* * * * *", None)
            .unwrap();

        // Force the task due now.
        if let Ok(mut tasks) = scheduler.tasks.lock()
            && let Some(t) = tasks.get_mut(&task.id)
        {
            t.next_run = Some(Utc::now() - chrono::Duration::seconds(5));
        }

        scheduler.set_callback(Arc::new(|_t| {
            Box::pin(async move {
                panic!("callback blew up");
            })
        }));

        scheduler.tick().await;

        let stored = scheduler.get_task(&task.id).unwrap();
        assert!(stored.enabled, "cron task stays enabled after a callback panic");
        assert!(stored.next_run.unwrap() > Utc::now());
    }

    #[test]
    fn invalid_cron_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        assert!(scheduler.add_cron_task("bad", "x", "not cron", None).is_err());
        assert!(scheduler.list_tasks(false).is_empty());
    }

    #[test]
    fn persistence_round_trips_through_a_fresh_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_tasks.json");

        let first = Scheduler::new(&path, Duration::from_secs(30));
        let cron = first
            .add_cron_task("morning", "good morning", "0 9 * * *", None)
            .unwrap();
        let one_shot =
            first.add_one_shot("later", "do it", Utc::now() + chrono::Duration::hours(2));

        let reloaded = Scheduler::new(&path, Duration::from_secs(30));
        let tasks = reloaded.list_tasks(false);
        assert_eq!(tasks.len(), 2);

        let cron_back = reloaded.get_task(&cron.id).unwrap();
        assert_eq!(cron_back.name, "morning");
        assert_eq!(cron_back.cron_expr.as_deref(), Some("0 9 * * *"));
        assert!(cron_back.next_run.is_some(), "next_run recomputed on load");

        let shot_back = reloaded.get_task(&one_shot.id).unwrap();
        assert_eq!(shot_back.next_run, one_shot.scheduled_at);
    }

    #[test]
    fn fired_one_shot_stays_disabled_across_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduled_tasks.json");

        let first = Scheduler::new(&path, Duration::from_secs(30));
        let task =
            first.add_one_shot("once", "fire", Utc::now() - chrono::Duration::seconds(1));
        if let Ok(mut tasks) = first.tasks.lock()
            && let Some(t) = tasks.get_mut(&task.id)
        {
            t.mark_completed(Utc::now());
        }
        first.save().unwrap();

        let reloaded = Scheduler::new(&path, Duration::from_secs(30));
        let stored = reloaded.get_task(&task.id).unwrap();
        assert!(!stored.enabled);
        assert!(reloaded.due_tasks().is_empty());
    }

    #[test]
    fn reminder_gets_a_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        let task = scheduler.add_reminder(
            "water the plants before they dry out completely",
            chrono::Duration::minutes(30),
            None,
        );
        assert!(task.name.starts_with("Reminder: "));
        assert_eq!(task.kind, TaskKind::Reminder);
    }

    #[test]
    fn daily_briefing_uses_stable_id() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        scheduler.add_daily_briefing(8, 0, None).unwrap();
        scheduler.add_daily_briefing(9, 30, None).unwrap();

        let tasks = scheduler.list_tasks(false);
        assert_eq!(tasks.len(), 1, "re-setup replaces the existing briefing");
        assert_eq!(tasks[0].cron_expr.as_deref(), Some("30 9 * * *"));
    }

    #[test]
    fn tasks_file_has_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        scheduler.add_one_shot("n", "p", Utc::now() + chrono::Duration::hours(1));

        let raw = fs::read_to_string(scheduler.tasks_file()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed["tasks"].is_array());
        assert!(parsed["updated_at"].is_string());
        assert_eq!(parsed["tasks"][0]["kind"], "one_shot");
    }

    #[test]
    fn remove_task_deletes_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = make_scheduler(&dir);
        let task = scheduler.add_one_shot("n", "p", Utc::now());
        assert!(scheduler.remove_task(&task.id));
        assert!(!scheduler.remove_task(&task.id));

        let raw = fs::read_to_string(scheduler.tasks_file()).unwrap();
        assert!(!raw.contains(&task.id));
    }
}
