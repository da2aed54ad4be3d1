//! Sparse object updates.
//!
//! A patch maps top-level serialized field names to their new values. It is
//! what undo entries store for updates and what the replication adapter
//! receives, so only changed fields travel.

use crate::shapes::BoardObject;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Fields that are never diffed or patched.
const BOOKKEEPING_FIELDS: &[&str] = &["id", "updated_at"];

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Failed to serialize object: {0}")]
    Serialize(serde_json::Error),
    #[error("Patched object is invalid: {0}")]
    Deserialize(serde_json::Error),
    #[error("Object did not serialize to a map")]
    NotAnObject,
}

/// A sparse set of top-level field values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPatch(Map<String, Value>);

impl ObjectPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields of `after` that differ from `before`.
    pub fn diff(before: &BoardObject, after: &BoardObject) -> Result<Self, PatchError> {
        let before = to_map(before)?;
        let after = to_map(after)?;
        let mut fields = Map::new();
        for (key, value) in &after {
            if is_bookkeeping(key) {
                continue;
            }
            if before.get(key) != Some(value) {
                fields.insert(key.clone(), value.clone());
            }
        }
        for key in before.keys() {
            if !after.contains_key(key) && !is_bookkeeping(key) {
                fields.insert(key.clone(), Value::Null);
            }
        }
        Ok(Self(fields))
    }

    /// Current values of this patch's fields in `object`, i.e. the patch
    /// that undoes this one.
    pub fn capture(&self, object: &BoardObject) -> Result<Self, PatchError> {
        let current = to_map(object)?;
        let fields = self
            .0
            .keys()
            .map(|key| (key.clone(), current.get(key).cloned().unwrap_or(Value::Null)))
            .collect();
        Ok(Self(fields))
    }

    /// Apply to a copy of `object`. The id and write stamp are preserved.
    pub fn apply(&self, object: &BoardObject) -> Result<BoardObject, PatchError> {
        let mut map = to_map(object)?;
        for (key, value) in &self.0 {
            if !is_bookkeeping(key) {
                map.insert(key.clone(), value.clone());
            }
        }
        let mut patched: BoardObject =
            serde_json::from_value(Value::Object(map)).map_err(PatchError::Deserialize)?;
        patched.shape.sanitize();
        Ok(patched)
    }

    /// Insert a serializable value under `field`.
    pub fn set(&mut self, field: &str, value: impl Serialize) -> Result<(), PatchError> {
        let value = serde_json::to_value(value).map_err(PatchError::Serialize)?;
        self.0.insert(field.to_string(), value);
        Ok(())
    }

    /// Later fields win.
    pub fn merge(&mut self, other: ObjectPatch) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn is_bookkeeping(key: &str) -> bool {
    BOOKKEEPING_FIELDS.contains(&key)
}

fn to_map(object: &BoardObject) -> Result<Map<String, Value>, PatchError> {
    match serde_json::to_value(object).map_err(PatchError::Serialize)? {
        Value::Object(map) => Ok(map),
        _ => Err(PatchError::NotAnObject),
    }
}
