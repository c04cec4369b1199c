//! Path-typed reads and writes.

use crate::core::{DocError, Result, path};
use crate::schema::{DefaultValue, PathDescriptor, PathKind};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Level, event};

use super::{DirtyMark, Document};

impl Document {
    /// Reads `path` through its cast-get hook and getter chain.
    ///
    /// Undeclared paths and paths outside the active projection read as
    /// `Null`; getters are not invoked for them.
    pub fn get(&self, path: &str) -> Value {
        let Some(descriptor) = self.model.schema().path(path).cloned() else {
            return Value::Null;
        };
        if !self.loaded_field(path) {
            return Value::Null;
        }

        let mut value = path::get(&self.doc, path).cloned().unwrap_or(Value::Null);
        if descriptor.kind == PathKind::Object {
            return value;
        }
        if let Some(cast) = &descriptor.cast_get {
            value = cast(self, value, path);
        }
        for getter in &descriptor.getters {
            value = getter(self, value, path);
        }
        value
    }

    /// Assigns `value` to `path` through the coercion pipeline.
    ///
    /// Coercion failures are recorded on the document (see [`Document::errors`])
    /// and never abort the assignment of other paths.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> &mut Self {
        self.set_with_mode(path, value.into(), false);
        self
    }

    /// Like [`Document::set`], but the value must already have the declared
    /// shape. A rejected value is returned as an error and nothing is written.
    pub fn set_strict(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let descriptor = self.descriptor(path)?;
        let value = match &descriptor.strict_setter {
            Some(strict) => strict(self, value, path)?,
            None => value,
        };
        self.set_with_mode(path, value, false);
        Ok(())
    }

    pub(crate) fn set_with_mode(&mut self, path: &str, value: Value, hydrate: bool) {
        let Some(descriptor) = self.model.schema().path(path).cloned() else {
            event!(Level::DEBUG, path = %path, "dropping undeclared path");
            return;
        };
        if hydrate {
            self.hydrate_path(path, &descriptor, value);
        } else {
            self.assign_path(path, &descriptor, value);
        }
    }

    fn assign_path(&mut self, path: &str, descriptor: &Arc<PathDescriptor>, value: Value) {
        let mut value = value;
        if let Some(init) = &descriptor.init_hook {
            value = init(self, value, path, false);
        }
        for setter in descriptor.setters.iter().rev() {
            match setter(self, value.clone(), path) {
                Ok(next) => value = next,
                Err(err) => self.errors.push(err),
            }
        }
        if let Some(cast) = &descriptor.cast_set {
            match cast(self, value.clone(), path) {
                Ok(next) => value = next,
                Err(err) => self.errors.push(err),
            }
        }
        if stores_value(descriptor.kind) {
            self.write_path(path, value, Some(descriptor.kind));
        }
    }

    fn hydrate_path(&mut self, path: &str, descriptor: &Arc<PathDescriptor>, value: Value) {
        if !stores_value(descriptor.kind) {
            return;
        }
        let mut value = value;
        if let Some(init) = &descriptor.init_hook {
            value = init(self, value, path, true);
        }
        self.write_path(path, value.clone(), None);
        self.hydrated.insert(path.to_string());

        event!(Level::TRACE, path = %path, "hydrated");
        for listener in self.hydrate_listeners.clone() {
            listener(path, &value);
        }
    }

    /// Writes the tree and, when `track` carries the path kind, marks the path
    /// dirty if the stored value changed.
    pub(crate) fn write_path(&mut self, path: &str, value: Value, track: Option<PathKind>) {
        let changed = path::set(&mut self.doc, path, value);
        if let (true, Some(kind)) = (changed, track) {
            self.mark_dirty(path, kind);
        }
    }

    pub(crate) fn mark_dirty(&mut self, path: &str, kind: PathKind) {
        let mark = if kind == PathKind::Array {
            DirtyMark::Log
        } else {
            DirtyMark::Assigned
        };
        self.dirty.insert(path.to_string(), mark);
    }

    pub(crate) fn default_for(&self, path: &str) -> Option<Value> {
        let descriptor = self.model.schema().path(path)?;
        match descriptor.default.as_ref()? {
            DefaultValue::Value(value) => Some(value.clone()),
            DefaultValue::Computed(f) => Some(f(self)),
        }
    }

    pub(crate) fn descriptor(&self, path: &str) -> Result<Arc<PathDescriptor>> {
        self.model.schema().path(path).cloned().ok_or_else(|| {
            DocError::UnknownPath(path.to_string(), self.model.schema().name().to_string())
        })
    }
}

fn stores_value(kind: PathKind) -> bool {
    !matches!(kind, PathKind::Virtual | PathKind::DbReffedArray)
}
