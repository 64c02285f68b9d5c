// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Cron scheduler for recurring skill/goal/shell invocations (spec component
//! C10), plus the daily backup job that snapshots `PersistentStore`.
//!
//! Like [`lavis_tts::AsyncTts`] and `lavis_runtime::SkillRegistry`, this
//! crate resolves *what* to run (a cron-triggered task's `command` prefix)
//! but never runs `shell:`/`agent:` commands itself — that would pull
//! `lavis-actuator`/`lavis-core` into a crate that only needs to persist and
//! trigger. A [`CommandExecutor`] implementation supplied by `lavis-core` at
//! composition time does the actual work.

mod error;

pub use error::SchedulerError;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use lavis_config::SchedulerConfig;
use lavis_store::{PersistentStore, ScheduledTaskRow, TaskRunLogRow};

/// Outcome of dispatching one resolved command.
pub enum CommandOutcome {
    Success(String),
    Failed(String),
    Error(String),
}

impl CommandOutcome {
    fn status(&self) -> &'static str {
        match self {
            CommandOutcome::Success(_) => "SUCCESS",
            CommandOutcome::Failed(_) => "FAILED",
            CommandOutcome::Error(_) => "ERROR",
        }
    }

    fn output(&self) -> Option<&str> {
        match self {
            CommandOutcome::Success(s) => Some(s),
            _ => None,
        }
    }

    fn error(&self) -> Option<&str> {
        match self {
            CommandOutcome::Failed(s) | CommandOutcome::Error(s) => Some(s),
            _ => None,
        }
    }
}

/// Dispatches a task's resolved `shell:`/`agent:` command.
///
/// Implemented by a higher-level crate that owns `SystemActuator` (for
/// `shell:`) and `UnifiedChatService`'s orchestrated path (for `agent:`).
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run_shell(&self, command: &str) -> CommandOutcome;
    async fn run_agent(&self, goal: &str) -> CommandOutcome;
}

async fn dispatch(executor: &dyn CommandExecutor, command: &str) -> CommandOutcome {
    if let Some(cmd) = command.strip_prefix("shell:") {
        executor.run_shell(cmd).await
    } else if let Some(goal) = command.strip_prefix("agent:") {
        executor.run_agent(goal).await
    } else {
        // Bare commands run as shell, per spec §4.10.
        executor.run_shell(command).await
    }
}

/// The live cron scheduler.
///
/// Holds one background `tokio` task per enabled `ScheduledTaskRow`, plus one
/// for the daily `PersistentStore` backup. Calling [`Scheduler::create`],
/// [`Scheduler::start`], [`Scheduler::stop`], or [`Scheduler::update`]
/// re-registers the affected trigger without restarting the others.
pub struct Scheduler {
    store: Arc<PersistentStore>,
    executor: Arc<dyn CommandExecutor>,
    config: SchedulerConfig,
    backup_dir: PathBuf,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
    backup_job: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Load every enabled task from `store` and start its trigger loop, plus
    /// the daily backup job (if `config.enabled`).
    pub fn spawn(
        store: Arc<PersistentStore>,
        executor: Arc<dyn CommandExecutor>,
        config: SchedulerConfig,
        backup_dir: PathBuf,
    ) -> Result<Arc<Self>, SchedulerError> {
        let this = Arc::new(Self {
            store,
            executor,
            config,
            backup_dir,
            jobs: Mutex::new(HashMap::new()),
            backup_job: Mutex::new(None),
        });

        if this.config.enabled {
            for task in this.store.list_tasks()? {
                if task.enabled {
                    this.clone().spawn_job(task);
                }
            }
            this.clone().spawn_backup_job();
        }

        Ok(this)
    }

    /// Create, persist, and schedule a new task.
    pub fn create(
        self: &Arc<Self>,
        name: &str,
        cron_expr: &str,
        command: &str,
    ) -> Result<ScheduledTaskRow, SchedulerError> {
        validate_cron(cron_expr)?;
        let task = ScheduledTaskRow {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            cron_expr: cron_expr.to_string(),
            command: command.to_string(),
            enabled: true,
            run_count: 0,
            success_count: 0,
            failure_count: 0,
        };
        self.store.create_task(&task)?;
        if self.config.enabled {
            self.clone().spawn_job(task.clone());
        }
        Ok(task)
    }

    /// Update a task's fields. Re-registers the trigger when `cron_expr` or
    /// `enabled` effectively changes.
    pub fn update(self: &Arc<Self>, task: ScheduledTaskRow) -> Result<(), SchedulerError> {
        validate_cron(&task.cron_expr)?;
        self.store.update_task(&task)?;
        self.unregister(&task.id);
        if task.enabled && self.config.enabled {
            self.clone().spawn_job(task);
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ScheduledTaskRow>, SchedulerError> {
        Ok(self.store.list_tasks()?)
    }

    pub fn get(&self, task_id: &str) -> Result<ScheduledTaskRow, SchedulerError> {
        self.store
            .get_task(task_id)?
            .ok_or_else(|| SchedulerError::NotFound(task_id.to_string()))
    }

    pub fn history(&self, task_id: &str, limit: u32) -> Result<Vec<TaskRunLogRow>, SchedulerError> {
        Ok(self.store.task_history(task_id, limit)?)
    }

    /// Re-enable a stopped task and restart its trigger loop.
    pub fn start(self: &Arc<Self>, task_id: &str) -> Result<(), SchedulerError> {
        let mut task = self.get(task_id)?;
        if task.enabled {
            return Err(SchedulerError::AlreadyEnabled(task_id.to_string()));
        }
        task.enabled = true;
        self.store.update_task(&task)?;
        if self.config.enabled {
            self.clone().spawn_job(task);
        }
        Ok(())
    }

    /// Disable a task and abort its trigger loop.
    pub fn stop(&self, task_id: &str) -> Result<(), SchedulerError> {
        let mut task = self.get(task_id)?;
        if !task.enabled {
            return Err(SchedulerError::AlreadyDisabled(task_id.to_string()));
        }
        task.enabled = false;
        self.store.update_task(&task)?;
        self.unregister(task_id);
        Ok(())
    }

    /// Delete a task outright: abort its loop, drop its row and history.
    pub fn delete(&self, task_id: &str) -> Result<(), SchedulerError> {
        self.unregister(task_id);
        self.store.delete_task(task_id)?;
        Ok(())
    }

    /// Run a task immediately, bypassing its cron trigger. Still produces
    /// exactly one `RunLog` and bumps counters.
    pub async fn run_now(&self, task_id: &str) -> Result<TaskRunLogRow, SchedulerError> {
        let task = self.get(task_id)?;
        self.execute_once(&task.id, &task.command).await?;
        self.store
            .task_history(&task.id, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| SchedulerError::NotFound(task.id.clone()))
    }

    fn unregister(&self, task_id: &str) {
        if let Some(handle) = self.jobs.lock().unwrap().remove(task_id) {
            handle.abort();
        }
    }

    fn spawn_job(self: Arc<Self>, task: ScheduledTaskRow) {
        let schedule = match Schedule::from_str(&task.cron_expr) {
            Ok(s) => s,
            Err(e) => {
                warn!(task = %task.id, error = %e, "invalid cron expression, not scheduling");
                return;
            }
        };

        let task_id = task.id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let now = Utc::now();
                if next > now {
                    let delta = (next - now)
                        .to_std()
                        .unwrap_or(StdDuration::from_secs(0));
                    tokio::time::sleep(delta).await;
                }

                if let Err(e) = self.execute_once(&task.id, &task.command).await {
                    error!(task = %task.id, error = %e, "scheduled execution failed");
                }
            }
        });

        self.jobs.lock().unwrap().insert(task_id, handle);
    }

    /// Dispatch `command`, writing exactly one `RunLog` regardless of the
    /// outcome, per the spec's §4.10 invariant.
    async fn execute_once(&self, task_id: &str, command: &str) -> Result<(), SchedulerError> {
        let started = Utc::now();
        let outcome = dispatch(self.executor.as_ref(), command).await;
        let ended = Utc::now();
        let duration_ms = (ended - started).num_milliseconds();

        self.store.record_run(
            task_id,
            &started.to_rfc3339(),
            &ended.to_rfc3339(),
            outcome.status(),
            outcome.output(),
            outcome.error(),
            duration_ms,
        )?;
        Ok(())
    }

    fn spawn_backup_job(self: Arc<Self>) {
        let handle = tokio::spawn(async move {
            loop {
                let sleep_for = duration_until_local_hour(self.config.daily_backup_hour_local);
                tokio::time::sleep(sleep_for).await;
                if let Err(e) = self.run_backup().await {
                    error!(error = %e, "daily backup failed");
                } else {
                    info!("daily backup completed");
                }
            }
        });
        *self.backup_job.lock().unwrap() = Some(handle);
    }

    async fn run_backup(&self) -> Result<(), SchedulerError> {
        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| SchedulerError::Backup(e.to_string()))?;
        let dest = self
            .backup_dir
            .join(format!("backup-{}.sqlite3", Utc::now().format("%Y%m%d-%H%M%S")));
        self.store.backup_to(&dest)?;
        prune_old_backups(&self.backup_dir, self.config.backup_retention_days);
        Ok(())
    }
}

fn validate_cron(expr: &str) -> Result<(), SchedulerError> {
    Schedule::from_str(expr).map_err(|_| SchedulerError::InvalidCron(expr.to_string()))?;
    Ok(())
}

/// How long to sleep until the next occurrence of `hour` in local time.
fn duration_until_local_hour(hour: u32) -> StdDuration {
    let now = chrono::Local::now();
    let today_target = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .unwrap_or_else(|| now.date_naive().and_hms_opt(3, 0, 0).unwrap());
    let mut target = chrono::Local
        .from_local_datetime(&today_target)
        .single()
        .unwrap_or(now);
    if target <= now {
        target += chrono::Duration::days(1);
    }
    (target - now).to_std().unwrap_or(StdDuration::from_secs(3600))
}

fn prune_old_backups(dir: &std::path::Path, retention_days: u32) {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(modified) = meta.modified() else { continue };
        let modified: chrono::DateTime<Utc> = modified.into();
        if modified < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingExecutor {
        shell_calls: AtomicUsize,
        agent_calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run_shell(&self, command: &str) -> CommandOutcome {
            self.shell_calls.fetch_add(1, Ordering::SeqCst);
            CommandOutcome::Success(format!("ran: {command}"))
        }

        async fn run_agent(&self, goal: &str) -> CommandOutcome {
            self.agent_calls.fetch_add(1, Ordering::SeqCst);
            CommandOutcome::Success(format!("delegated: {goal}"))
        }
    }

    fn test_store() -> Arc<PersistentStore> {
        Arc::new(PersistentStore::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn create_rejects_invalid_cron() {
        let store = test_store();
        let executor = Arc::new(RecordingExecutor {
            shell_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::spawn(
            store,
            executor,
            SchedulerConfig { enabled: false, ..Default::default() },
            PathBuf::from("/tmp/lavis-test-backups"),
        )
        .unwrap();

        let result = scheduler.create("bad", "not a cron expr", "shell:/bin/echo hi");
        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));
    }

    #[tokio::test]
    async fn run_now_dispatches_shell_prefix_and_records_run_log() {
        let store = test_store();
        let executor = Arc::new(RecordingExecutor {
            shell_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::spawn(
            store,
            executor.clone(),
            SchedulerConfig { enabled: false, ..Default::default() },
            PathBuf::from("/tmp/lavis-test-backups"),
        )
        .unwrap();

        let task = scheduler
            .create("beep", "*/1 * * * * *", "shell:/bin/echo ok")
            .unwrap();
        let log = scheduler.run_now(&task.id).await.unwrap();

        assert_eq!(log.status, "SUCCESS");
        assert_eq!(executor.shell_calls.load(Ordering::SeqCst), 1);
        let reloaded = scheduler.get(&task.id).unwrap();
        assert_eq!(reloaded.run_count, 1);
        assert_eq!(reloaded.success_count, 1);
    }

    #[tokio::test]
    async fn run_now_dispatches_agent_prefix() {
        let store = test_store();
        let executor = Arc::new(RecordingExecutor {
            shell_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::spawn(
            store,
            executor.clone(),
            SchedulerConfig { enabled: false, ..Default::default() },
            PathBuf::from("/tmp/lavis-test-backups"),
        )
        .unwrap();

        let task = scheduler
            .create("daily-summary", "0 0 9 * * *", "agent:summarize yesterday's notes")
            .unwrap();
        scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(executor.agent_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bare_command_dispatches_as_shell() {
        let store = test_store();
        let executor = Arc::new(RecordingExecutor {
            shell_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::spawn(
            store,
            executor.clone(),
            SchedulerConfig { enabled: false, ..Default::default() },
            PathBuf::from("/tmp/lavis-test-backups"),
        )
        .unwrap();

        let task = scheduler.create("bare", "0 0 9 * * *", "/bin/echo hi").unwrap();
        scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(executor.shell_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_on_already_disabled_task_errors() {
        let store = test_store();
        let executor = Arc::new(RecordingExecutor {
            shell_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::spawn(
            store,
            executor,
            SchedulerConfig { enabled: false, ..Default::default() },
            PathBuf::from("/tmp/lavis-test-backups"),
        )
        .unwrap();

        let task = scheduler.create("once", "0 0 9 * * *", "shell:/bin/true").unwrap();
        scheduler.stop(&task.id).unwrap();
        let result = scheduler.stop(&task.id);
        assert!(matches!(result, Err(SchedulerError::AlreadyDisabled(_))));
    }

    #[tokio::test]
    async fn n_triggers_produce_n_run_logs() {
        let store = test_store();
        let executor = Arc::new(RecordingExecutor {
            shell_calls: AtomicUsize::new(0),
            agent_calls: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::spawn(
            store,
            executor,
            SchedulerConfig { enabled: false, ..Default::default() },
            PathBuf::from("/tmp/lavis-test-backups"),
        )
        .unwrap();

        let task = scheduler.create("n", "0 0 9 * * *", "shell:/bin/true").unwrap();
        for _ in 0..4 {
            scheduler.run_now(&task.id).await.unwrap();
        }
        let history = scheduler.history(&task.id, 10).unwrap();
        assert_eq!(history.len(), 4);
        let reloaded = scheduler.get(&task.id).unwrap();
        assert_eq!(reloaded.run_count, 4);
    }
}
