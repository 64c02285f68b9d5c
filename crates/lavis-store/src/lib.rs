// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `PersistentStore` (spec component C13): the single embedded relational
//! store backing skills, sessions, scheduled tasks, run logs, and user
//! preferences. Built on `rusqlite` with the bundled SQLite, matching the
//! teacher's preference for a single-file embedded store over an external
//! database service.

mod error;
mod preferences;
mod scheduler;
mod sessions;
mod skills;

pub use error::StoreError;
pub use preferences::PreferenceValue;
pub use scheduler::{ScheduledTaskRow, TaskRunLogRow};
pub use sessions::SessionMessageRow;
pub use skills::SkillRow;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

/// Embedded SQLite-backed store. All operations take `&self` and serialize
/// through an internal mutex — `rusqlite::Connection` is not `Sync`, and the
/// spec's concurrency model (§5) only ever touches the store from behind a
/// suspension point, never while holding another component's lock.
pub struct PersistentStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS skills (
    name          TEXT PRIMARY KEY,
    description   TEXT NOT NULL,
    category      TEXT,
    version       TEXT,
    author        TEXT,
    enabled       INTEGER NOT NULL DEFAULT 1,
    use_count     INTEGER NOT NULL DEFAULT 0,
    last_used_at  TEXT
);

CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL REFERENCES sessions(id),
    turn_id     TEXT,
    position    INTEGER NOT NULL,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    has_image   INTEGER NOT NULL DEFAULT 0,
    token_count INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_messages_session ON session_messages(session_id);

CREATE TABLE IF NOT EXISTS scheduled_tasks (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    cron_expr      TEXT NOT NULL,
    command        TEXT NOT NULL,
    enabled        INTEGER NOT NULL DEFAULT 1,
    run_count      INTEGER NOT NULL DEFAULT 0,
    success_count  INTEGER NOT NULL DEFAULT 0,
    failure_count  INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_run_logs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id     TEXT NOT NULL REFERENCES scheduled_tasks(id),
    started_at  TEXT NOT NULL,
    ended_at    TEXT,
    status      TEXT NOT NULL,
    output      TEXT,
    error       TEXT,
    duration_ms INTEGER
);
CREATE INDEX IF NOT EXISTS idx_task_run_logs_task ON task_run_logs(task_id);

CREATE TABLE IF NOT EXISTS user_preferences (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    value_type TEXT NOT NULL
);
"#;

impl PersistentStore {
    /// Open (creating if absent) the SQLite file at `path` and apply the
    /// schema idempotently.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, used in tests and for ephemeral/no-persistence runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Snapshot-backup the store to `dest` via SQLite's online backup API.
    /// Used by the daily 03:00 maintenance job (retain 30 days, caller's
    /// responsibility to prune old files).
    pub fn backup_to(&self, dest: &Path) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut dest_conn = Connection::open(dest)?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest_conn)?;
        backup.run_to_completion(5, std::time::Duration::from_millis(250), None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let store = PersistentStore::open_in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(count >= 6);
    }

    #[test]
    fn backup_to_file_round_trips() {
        let store = PersistentStore::open_in_memory().unwrap();
        store.upsert_skill(&SkillRow::new("demo", "a demo skill")).unwrap();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        store.backup_to(tmp.path()).unwrap();
        let restored = PersistentStore::open(tmp.path()).unwrap();
        let skills = restored.list_skills_by_enabled(true).unwrap();
        assert_eq!(skills.len(), 1);
    }
}
