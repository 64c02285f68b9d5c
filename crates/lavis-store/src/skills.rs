// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{PersistentStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct SkillRow {
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub enabled: bool,
    pub use_count: u64,
    pub last_used_at: Option<String>,
}

impl SkillRow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: None,
            version: None,
            author: None,
            enabled: true,
            use_count: 0,
            last_used_at: None,
        }
    }
}

impl PersistentStore {
    /// Upsert a skill by name, case-insensitively — matches the registry's
    /// invariant that skill names are unique regardless of case.
    pub fn upsert_skill(&self, skill: &SkillRow) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO skills (name, description, category, version, author, enabled, use_count, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                category = excluded.category,
                version = excluded.version,
                author = excluded.author,
                enabled = excluded.enabled",
            params![
                skill.name.to_lowercase(),
                skill.description,
                skill.category,
                skill.version,
                skill.author,
                skill.enabled as i64,
                skill.use_count as i64,
                skill.last_used_at,
            ],
        )?;
        Ok(())
    }

    /// Increment `use_count` and touch `last_used_at` to now (UTC, RFC3339).
    pub fn record_skill_use(&self, name: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE skills SET use_count = use_count + 1, last_used_at = ?1 WHERE lower(name) = lower(?2)",
            params![Utc::now().to_rfc3339(), name],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(format!("skill {name:?}")));
        }
        Ok(())
    }

    pub fn list_skills_by_enabled(&self, enabled: bool) -> Result<Vec<SkillRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, description, category, version, author, enabled, use_count, last_used_at
             FROM skills WHERE enabled = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![enabled as i64], row_to_skill)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_skills_by_category(&self, category: &str) -> Result<Vec<SkillRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, description, category, version, author, enabled, use_count, last_used_at
             FROM skills WHERE category = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![category], row_to_skill)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_skill(&self, name: &str) -> Result<Option<SkillRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT name, description, category, version, author, enabled, use_count, last_used_at
             FROM skills WHERE lower(name) = lower(?1)",
            params![name],
            row_to_skill,
        )
        .optional()
        .map_err(StoreError::from)
    }
}

fn row_to_skill(row: &rusqlite::Row) -> rusqlite::Result<SkillRow> {
    Ok(SkillRow {
        name: row.get(0)?,
        description: row.get(1)?,
        category: row.get(2)?,
        version: row.get(3)?,
        author: row.get(4)?,
        enabled: row.get::<_, i64>(5)? != 0,
        use_count: row.get::<_, i64>(6)? as u64,
        last_used_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PersistentStore;

    #[test]
    fn upsert_is_case_insensitive() {
        let store = PersistentStore::open_in_memory().unwrap();
        store.upsert_skill(&SkillRow::new("Deploy", "deploys the app")).unwrap();
        store.upsert_skill(&SkillRow::new("deploy", "updated description")).unwrap();
        let skills = store.list_skills_by_enabled(true).unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].description, "updated description");
    }

    #[test]
    fn record_skill_use_increments_count_and_sets_timestamp() {
        let store = PersistentStore::open_in_memory().unwrap();
        store.upsert_skill(&SkillRow::new("deploy", "d")).unwrap();
        store.record_skill_use("DEPLOY").unwrap();
        let skill = store.get_skill("deploy").unwrap().unwrap();
        assert_eq!(skill.use_count, 1);
        assert!(skill.last_used_at.is_some());
    }

    #[test]
    fn record_skill_use_missing_skill_errors() {
        let store = PersistentStore::open_in_memory().unwrap();
        assert!(store.record_skill_use("nonexistent").is_err());
    }

    #[test]
    fn list_by_enabled_excludes_disabled() {
        let store = PersistentStore::open_in_memory().unwrap();
        let mut disabled = SkillRow::new("off", "disabled skill");
        disabled.enabled = false;
        store.upsert_skill(&disabled).unwrap();
        store.upsert_skill(&SkillRow::new("on", "enabled skill")).unwrap();
        let enabled = store.list_skills_by_enabled(true).unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "on");
    }
}
