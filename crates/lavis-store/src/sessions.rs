// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use rusqlite::params;
use serde::Serialize;

use crate::{PersistentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMessageRow {
    pub id: i64,
    pub session_id: String,
    pub turn_id: Option<String>,
    pub position: i64,
    pub role: String,
    pub content: String,
    pub has_image: bool,
    pub token_count: u32,
}

impl PersistentStore {
    pub fn create_session(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
            params![session_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_message(
        &self,
        session_id: &str,
        turn_id: Option<&str>,
        position: i64,
        role: &str,
        content: &str,
        has_image: bool,
        token_count: u32,
    ) -> Result<i64, StoreError> {
        self.create_session(session_id)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO session_messages
                (session_id, turn_id, position, role, content, has_image, token_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session_id,
                turn_id,
                position,
                role,
                content,
                has_image as i64,
                token_count,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_messages_by_session(&self, session_id: &str) -> Result<Vec<SessionMessageRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, turn_id, position, role, content, has_image, token_count
             FROM session_messages WHERE session_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![session_id], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_messages_by_turn(&self, session_id: &str, turn_id: &str) -> Result<Vec<SessionMessageRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, turn_id, position, role, content, has_image, token_count
             FROM session_messages WHERE session_id = ?1 AND turn_id = ?2 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![session_id, turn_id], row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_messages(&self, session_id: &str) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT count(*) FROM session_messages WHERE session_id = ?1",
            params![session_id],
            |r| r.get(0),
        )
        .map_err(StoreError::from)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM session_messages WHERE session_id = ?1", params![session_id])?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(())
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<SessionMessageRow> {
    Ok(SessionMessageRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        turn_id: row.get(2)?,
        position: row.get(3)?,
        role: row.get(4)?,
        content: row.get(5)?,
        has_image: row.get::<_, i64>(6)? != 0,
        token_count: row.get::<_, i64>(7)? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PersistentStore;

    #[test]
    fn append_and_list_preserves_order() {
        let store = PersistentStore::open_in_memory().unwrap();
        store.append_message("s1", Some("t1"), 0, "user", "hi", false, 1).unwrap();
        store.append_message("s1", Some("t1"), 1, "assistant", "hello", false, 1).unwrap();
        let msgs = store.list_messages_by_session("s1").unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "user");
        assert_eq!(msgs[1].role, "assistant");
    }

    #[test]
    fn delete_session_removes_messages() {
        let store = PersistentStore::open_in_memory().unwrap();
        store.append_message("s1", None, 0, "user", "hi", false, 1).unwrap();
        store.delete_session("s1").unwrap();
        assert_eq!(store.count_messages("s1").unwrap(), 0);
    }

    #[test]
    fn list_by_turn_filters_correctly() {
        let store = PersistentStore::open_in_memory().unwrap();
        store.append_message("s1", Some("t1"), 0, "user", "a", false, 1).unwrap();
        store.append_message("s1", Some("t2"), 1, "user", "b", false, 1).unwrap();
        let msgs = store.list_messages_by_turn("s1", "t1").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "a");
    }
}
