//! Field-level diff between two versions of an entity's hashed content.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{DiffError, DiffResult};
use crate::text_diff::{diff_text, TextDiff};

/// What happened to one top-level field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldChange {
    Added { field: String, value: Value },
    Removed { field: String, value: Value },
    Modified { field: String, old: Value, new: Value },
}

impl FieldChange {
    pub fn field(&self) -> &str {
        match self {
            Self::Added { field, .. } | Self::Removed { field, .. } | Self::Modified { field, .. } => {
                field
            }
        }
    }

    /// Line hunks for a modified field whose old and new values are both
    /// multi-line strings. `None` for anything else.
    pub fn text_diff(&self) -> Option<TextDiff> {
        match self {
            Self::Modified {
                old: Value::String(old),
                new: Value::String(new),
                ..
            } if old.contains('\n') || new.contains('\n') => Some(diff_text(old, new)),
            _ => None,
        }
    }
}

/// Changes between two content maps, ordered by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldDiff {
    pub changes: Vec<FieldChange>,
}

impl FieldDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Names of every field that differs.
    pub fn fields(&self) -> Vec<&str> {
        self.changes.iter().map(FieldChange::field).collect()
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field() == field)
    }
}

/// Compare two content maps key by key.
///
/// Nested values are compared as a whole; a change anywhere inside `rules`
/// shows up as one modification of `rules`.
pub fn diff_fields(old: &BTreeMap<String, Value>, new: &BTreeMap<String, Value>) -> FieldDiff {
    let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
    keys.sort();
    keys.dedup();

    let changes = keys
        .into_iter()
        .filter_map(|key| match (old.get(key), new.get(key)) {
            (Some(a), Some(b)) if a == b => None,
            (Some(a), Some(b)) => Some(FieldChange::Modified {
                field: key.clone(),
                old: a.clone(),
                new: b.clone(),
            }),
            (Some(a), None) => Some(FieldChange::Removed {
                field: key.clone(),
                value: a.clone(),
            }),
            (None, Some(b)) => Some(FieldChange::Added {
                field: key.clone(),
                value: b.clone(),
            }),
            (None, None) => None,
        })
        .collect();

    FieldDiff { changes }
}

/// Serialize two values and compare their top-level fields.
pub fn diff_contents<T: Serialize>(old: &T, new: &T) -> DiffResult<FieldDiff> {
    Ok(diff_fields(&to_fields(old)?, &to_fields(new)?))
}

fn to_fields<T: Serialize>(value: &T) -> DiffResult<BTreeMap<String, Value>> {
    match serde_json::to_value(value).map_err(|e| DiffError::Serialization(e.to_string()))? {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(_) => Err(DiffError::NotAnObject("array")),
        Value::String(_) => Err(DiffError::NotAnObject("string")),
        Value::Number(_) => Err(DiffError::NotAnObject("number")),
        Value::Bool(_) => Err(DiffError::NotAnObject("bool")),
        Value::Null => Err(DiffError::NotAnObject("null")),
    }
}
