// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::{PersistentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTaskRow {
    pub id: String,
    pub name: String,
    pub cron_expr: String,
    pub command: String,
    pub enabled: bool,
    pub run_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRunLogRow {
    pub id: i64,
    pub task_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub status: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
}

impl PersistentStore {
    pub fn create_task(&self, task: &ScheduledTaskRow) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scheduled_tasks (id, name, cron_expr, command, enabled, run_count, success_count, failure_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6)",
            params![task.id, task.name, task.cron_expr, task.command, task.enabled as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn update_task(&self, task: &ScheduledTaskRow) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE scheduled_tasks SET name = ?2, cron_expr = ?3, command = ?4, enabled = ?5 WHERE id = ?1",
            params![task.id, task.name, task.cron_expr, task.command, task.enabled as i64],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("scheduled task {}", task.id)));
        }
        Ok(())
    }

    pub fn set_task_enabled(&self, task_id: &str, enabled: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE scheduled_tasks SET enabled = ?2 WHERE id = ?1",
            params![task_id, enabled as i64],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("scheduled task {task_id}")));
        }
        Ok(())
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM task_run_logs WHERE task_id = ?1", params![task_id])?;
        conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![task_id])?;
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<ScheduledTaskRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, cron_expr, command, enabled, run_count, success_count, failure_count
             FROM scheduled_tasks WHERE id = ?1",
            params![task_id],
            row_to_task,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn list_tasks(&self) -> Result<Vec<ScheduledTaskRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, cron_expr, command, enabled, run_count, success_count, failure_count
             FROM scheduled_tasks ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_task)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Record exactly one RunLog for `task_id` and atomically bump its
    /// counters, per spec §4.10: "each invocation produces exactly one
    /// RunLog ... regardless of exceptions".
    pub fn record_run(
        &self,
        task_id: &str,
        started_at: &str,
        ended_at: &str,
        status: &str,
        output: Option<&str>,
        error: Option<&str>,
        duration_ms: i64,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO task_run_logs (task_id, started_at, ended_at, status, output, error, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![task_id, started_at, ended_at, status, output, error, duration_ms],
        )?;
        let log_id = tx.last_insert_rowid();
        let success_inc = i64::from(status == "SUCCESS");
        let failure_inc = i64::from(status != "SUCCESS");
        tx.execute(
            "UPDATE scheduled_tasks
             SET run_count = run_count + 1, success_count = success_count + ?2, failure_count = failure_count + ?3
             WHERE id = ?1",
            params![task_id, success_inc, failure_inc],
        )?;
        tx.commit()?;
        Ok(log_id)
    }

    pub fn task_history(&self, task_id: &str, limit: u32) -> Result<Vec<TaskRunLogRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, started_at, ended_at, status, output, error, duration_ms
             FROM task_run_logs WHERE task_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![task_id, limit], row_to_run_log)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<ScheduledTaskRow> {
    Ok(ScheduledTaskRow {
        id: row.get(0)?,
        name: row.get(1)?,
        cron_expr: row.get(2)?,
        command: row.get(3)?,
        enabled: row.get::<_, i64>(4)? != 0,
        run_count: row.get::<_, i64>(5)? as u64,
        success_count: row.get::<_, i64>(6)? as u64,
        failure_count: row.get::<_, i64>(7)? as u64,
    })
}

fn row_to_run_log(row: &rusqlite::Row) -> rusqlite::Result<TaskRunLogRow> {
    Ok(TaskRunLogRow {
        id: row.get(0)?,
        task_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        status: row.get(4)?,
        output: row.get(5)?,
        error: row.get(6)?,
        duration_ms: row.get(7)?,
    })
}
