// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::{params, OptionalExtension};

use crate::{PersistentStore, StoreError};

/// A typed KV preference value. Stored as `(text representation, type tag)`
/// so readers can validate the expected type without re-parsing ambiguously.
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl PreferenceValue {
    fn type_tag(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
        }
    }

    fn to_stored(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }

    fn from_stored(value: &str, type_tag: &str) -> Result<Self, StoreError> {
        match type_tag {
            "text" => Ok(Self::Text(value.to_string())),
            "bool" => value
                .parse()
                .map(Self::Bool)
                .map_err(|_| StoreError::InvalidPreferenceType(value.to_string(), "bool")),
            "int" => value
                .parse()
                .map(Self::Int)
                .map_err(|_| StoreError::InvalidPreferenceType(value.to_string(), "int")),
            "float" => value
                .parse()
                .map(Self::Float)
                .map_err(|_| StoreError::InvalidPreferenceType(value.to_string(), "float")),
            _ => Err(StoreError::InvalidPreferenceType(value.to_string(), "text|bool|int|float")),
        }
    }
}

impl PersistentStore {
    pub fn set_preference(&self, key: &str, value: &PreferenceValue) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_preferences (key, value, value_type) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, value_type = excluded.value_type",
            params![key, value.to_stored(), value.type_tag()],
        )?;
        Ok(())
    }

    pub fn get_preference(&self, key: &str) -> Result<Option<PreferenceValue>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT value, value_type FROM user_preferences WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        row.map(|(value, ty)| PreferenceValue::from_stored(&value, &ty)).transpose()
    }
}
