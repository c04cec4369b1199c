//! Dirty-set encoding.
//!
//! Turns the dirty paths of a document into an [`UpdateDescription`] plus the
//! snapshot the store uses as the update selector. Paths without an atomic
//! encoder are overwritten; array paths drain their operation log and either
//! contribute one `$pushAll` and/or one `$pop`, or degrade to an overwrite.

use crate::core::{ID_FIELD, path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{ArrayOp, Document};

/// How a path entered the dirty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyMark {
    Assigned,
    /// Array path; the pending operations live in the embedded array log.
    Log,
}

/// Wire-level update operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDescription {
    #[serde(rename = "$set", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(rename = "$unset", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub unset: BTreeMap<String, i64>,
    #[serde(rename = "$pushAll", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub push_all: BTreeMap<String, Vec<Value>>,
    #[serde(rename = "$pop", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pop: BTreeMap<String, i64>,
}

impl UpdateDescription {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.push_all.is_empty() && self.pop.is_empty()
    }

    pub fn overwrite(&mut self, path: &str, value: Value) {
        self.set.insert(path.to_string(), value);
    }

    pub fn unset(&mut self, path: &str) {
        self.unset.insert(path.to_string(), 1);
    }

    pub fn push_all(&mut self, path: &str, values: Vec<Value>) {
        self.push_all.entry(path.to_string()).or_default().extend(values);
    }

    pub fn pop(&mut self, path: &str, end: PopEnd) {
        self.pop.insert(path.to_string(), end as i64);
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Which end a single-element removal takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopEnd {
    Last = 1,
    First = -1,
}

/// Encoder output for one array path.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayEncoding {
    Atomic {
        push: Vec<Value>,
        pop: Option<PopEnd>,
    },
    Overwrite,
}

/// Classifies a drained operation log.
///
/// Appends and one-end removals are the only atomic classes. Mixing them,
/// removing more than once, or any other operation forces an overwrite.
pub fn classify_ops(ops: &[ArrayOp]) -> ArrayEncoding {
    let mut push = Vec::new();
    let mut pop = None;
    for op in ops {
        match op {
            ArrayOp::Push(value) => push.push(value.clone()),
            ArrayOp::Pop | ArrayOp::Shift if pop.is_some() => return ArrayEncoding::Overwrite,
            ArrayOp::Pop => pop = Some(PopEnd::Last),
            ArrayOp::Shift => pop = Some(PopEnd::First),
            _ => return ArrayEncoding::Overwrite,
        }
    }
    if !push.is_empty() && pop.is_some() {
        return ArrayEncoding::Overwrite;
    }
    ArrayEncoding::Atomic { push, pop }
}

/// Result of encoding the dirty set.
#[derive(Debug, Clone, PartialEq)]
pub struct DirtyDelta {
    pub update: UpdateDescription,
    /// Identifier plus the last persisted value of every atomic dirty path.
    pub previous: Value,
}

impl Document {
    /// Encodes the dirty set, draining array operation logs.
    pub fn delta(&mut self) -> DirtyDelta {
        let schema = self.model.schema().clone();
        let mut update = UpdateDescription::default();
        let mut previous = Map::new();
        previous.insert(
            ID_FIELD.to_string(),
            path::get(&self.doc, ID_FIELD).cloned().unwrap_or(Value::Null),
        );

        let dirty: Vec<String> = self.dirty.keys().cloned().collect();
        for dirty_path in dirty {
            let Some(descriptor) = schema.path(&dirty_path).cloned() else {
                continue;
            };
            if descriptor.atomic
                && let Some(before) = path::get(&self.persisted, &dirty_path)
            {
                previous.insert(dirty_path.clone(), before.clone());
            }
            match &descriptor.atomic_encoder {
                Some(encoder) => encoder(self, &dirty_path, &mut update),
                None => self.overwrite_path(&dirty_path, &mut update),
            }
        }

        DirtyDelta {
            update,
            previous: Value::Object(previous),
        }
    }

    /// Contributes the current value of `path`, or `$unset` when absent.
    pub(crate) fn overwrite_path(&self, dirty_path: &str, update: &mut UpdateDescription) {
        match path::get(&self.doc, dirty_path) {
            Some(value) => update.overwrite(dirty_path, value.clone()),
            None => update.unset(dirty_path),
        }
    }

    /// After a failed update the drained logs are gone; force overwrites.
    pub(crate) fn degrade_array_logs(&mut self) {
        let logged: Vec<String> = self
            .dirty
            .iter()
            .filter(|(_, mark)| **mark == DirtyMark::Log)
            .map(|(p, _)| p.clone())
            .collect();
        for logged_path in logged {
            if let Some(array) = self.arrays.get_mut(&logged_path) {
                array.record(ArrayOp::Replace);
            }
        }
    }
}
