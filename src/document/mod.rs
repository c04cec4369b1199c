//! Document instances.
//!
//! A [`Document`] owns the value tree of one entity together with its dirty
//! set, hydrated set, accumulated errors and instance-level hooks. Reads and
//! writes go through the descriptor of the addressed path; persistence goes
//! through the named task pipelines in [`hooks`].

mod coercion;
mod dirty;
mod embedded;
mod hooks;
mod validation;

pub use dirty::{ArrayEncoding, DirtyDelta, DirtyMark, PopEnd, UpdateDescription, classify_ops};
pub use embedded::{ArrayMut, ArrayOp, EmbeddedArray, Member};
pub use hooks::{
    Hook, HookFlow, HookResult, TaskAction, TaskFuture, TaskOverride, TaskPhase,
};

use crate::core::{DocError, ID_FIELD, Projection, Result, path};
use crate::model::Model;
use crate::reference::{DbRefArray, DbRefPointer, DbReffedArray};
use crate::schema::{FieldNode, Schema};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{Level, event};

pub type HydrateListener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

#[derive(Clone)]
pub struct Document {
    pub(crate) model: Model,
    pub(crate) doc: Value,
    /// Tree as last loaded from or written to the store.
    pub(crate) persisted: Value,
    pub(crate) pres: HashMap<String, Vec<Hook>>,
    pub(crate) posts: HashMap<String, Vec<Hook>>,
    pub(crate) arrays: HashMap<String, EmbeddedArray>,
    pub(crate) dbrefs: HashMap<String, Box<Document>>,
    pub(crate) dbref_arrays: HashMap<String, DbRefArray>,
    pub(crate) dbreffed_arrays: HashMap<String, DbReffedArray>,
    pub(crate) dirty: BTreeMap<String, DirtyMark>,
    pub(crate) hydrated: BTreeSet<String>,
    pub(crate) errors: Vec<DocError>,
    pub(crate) fields: Option<BTreeSet<String>>,
    pub(crate) is_new: bool,
    pub(crate) hydrate_listeners: Vec<HydrateListener>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("schema", &self.model.schema().name())
            .field("doc", &self.doc)
            .field("dirty", &self.dirty)
            .field("errors", &self.errors)
            .field("is_new", &self.is_new)
            .finish()
    }
}

impl Document {
    pub(crate) fn blank(model: Model, projection: Option<&Projection>, is_new: bool) -> Self {
        let fields = projection.map(|p| {
            let mut fields = p.loaded_fields(model.schema().paths().map(|(path, _)| path));
            fields.insert(ID_FIELD.to_string());
            fields.insert("id".to_string());
            fields
        });
        Self {
            model,
            doc: Value::Object(Map::new()),
            persisted: Value::Object(Map::new()),
            pres: HashMap::new(),
            posts: HashMap::new(),
            arrays: HashMap::new(),
            dbrefs: HashMap::new(),
            dbref_arrays: HashMap::new(),
            dbreffed_arrays: HashMap::new(),
            dirty: BTreeMap::new(),
            hydrated: BTreeSet::new(),
            errors: Vec::new(),
            fields,
            is_new,
            hydrate_listeners: Vec::new(),
        }
    }

    /// Builds a document by running the init core action directly, without
    /// hooks. Used where a value has to be wrapped synchronously (setters).
    pub(crate) fn assemble(model: Model, data: Value, is_new: bool) -> Self {
        let mut doc = Self::blank(model, None, is_new);
        doc.apply_data(&data, is_new);
        if !is_new {
            doc.persisted = doc.doc.clone();
        }
        doc
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.model.schema()
    }

    pub fn collection(&self) -> &str {
        self.model.collection()
    }

    /// The stored identifier, if any.
    pub fn id(&self) -> Option<String> {
        match path::get(&self.doc, ID_FIELD)? {
            Value::String(id) => Some(id.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Pointer other documents store to reference this one.
    pub fn pointer(&self) -> Result<DbRefPointer> {
        let id = self.id().ok_or_else(|| {
            DocError::ReferenceIntegrity(format!(
                "{} document has no identifier",
                self.model.schema().name()
            ))
        })?;
        Ok(DbRefPointer::new(self.collection(), id))
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self, path: &str) -> bool {
        self.dirty.contains_key(path)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_paths(&self) -> Vec<String> {
        self.dirty.keys().cloned().collect()
    }

    pub fn hydrated(&self, path: &str) -> bool {
        self.hydrated.contains(path)
    }

    /// `true` when `path` was loaded (always, unless a projection is active).
    pub fn loaded_field(&self, path: &str) -> bool {
        self.fields.as_ref().is_none_or(|fields| fields.contains(path))
    }

    /// Coercion and validation errors accumulated since the last save.
    pub fn errors(&self) -> &[DocError] {
        &self.errors
    }

    pub fn push_error(&mut self, err: DocError) {
        self.errors.push(err);
    }

    pub fn take_errors(&mut self) -> Vec<DocError> {
        std::mem::take(&mut self.errors)
    }

    /// The persisted layout: declared paths only, plus the identifier.
    pub fn to_object(&self) -> &Value {
        &self.doc
    }

    pub fn into_object(self) -> Value {
        self.doc
    }

    /// Observes hydration writes (path, value).
    pub fn on_hydrate<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.hydrate_listeners.push(Arc::new(listener));
        self
    }

    /// Runs the `init` task: projects `data` onto the tree, in assign mode
    /// when `is_new`, in hydrate mode otherwise. The hooks of `merge` (assign)
    /// or `hydrate` are appended to those of `init`.
    pub async fn init(&mut self, data: Value, is_new: bool) -> Result<()> {
        let companion = if is_new { "merge" } else { "hydrate" };
        self.run_task("init", Some(companion), data_action(is_new), data)
            .await
    }

    /// Loads trusted data: no setters, no dirty marks.
    pub async fn hydrate(&mut self, data: Value) -> Result<()> {
        self.run_task("hydrate", None, data_action(false), data).await
    }

    /// Applies a partial update through the coercion pipeline.
    pub async fn merge(&mut self, data: Value) -> Result<()> {
        self.run_task("merge", None, data_action(true), data).await
    }

    /// Persists the document: insert when new, otherwise the dirty diff.
    ///
    /// Accumulated coercion/validation errors short-circuit the save with
    /// [`DocError::Invalid`] and no store interaction; the list is cleared.
    pub async fn save(&mut self) -> Result<()> {
        self.run_task("save", None, TaskAction::new(save_action), Value::Null)
            .await
    }

    /// Removes the document from the store; a new document is left untouched.
    pub async fn remove(&mut self) -> Result<()> {
        self.run_task("remove", None, TaskAction::new(remove_action), Value::Null)
            .await
    }

    /// Projects `data` onto the declared tree. Only declared paths are kept.
    pub(crate) fn apply_data(&mut self, data: &Value, assign: bool) {
        let schema = self.model.schema().clone();
        let empty = Map::new();
        let obj = data.as_object().unwrap_or(&empty);
        self.set_data(schema.fields(), obj, "", assign);
    }

    fn set_data(
        &mut self,
        nodes: &[FieldNode],
        obj: &Map<String, Value>,
        prefix: &str,
        assign: bool,
    ) -> (usize, usize) {
        let mut count = 0;
        let mut flag = 0;
        for node in nodes {
            count += 1;
            match node {
                FieldNode::Leaf(key) => {
                    let current = path::join(prefix, key);
                    if let Some(value) = obj.get(key) {
                        flag += 1;
                        self.set_with_mode(&current, value.clone(), !assign);
                    } else if assign && self.loaded_field(&current) {
                        if let Some(value) = self.default_for(&current) {
                            self.set(&current, value);
                        }
                    }
                }
                FieldNode::Nested(key, children) => {
                    if let Some(Value::Object(child)) = obj.get(key) {
                        flag += 1;
                        let current = path::join(prefix, key);
                        if path::get(&self.doc, &current).is_none() {
                            path::set(&mut self.doc, &current, Value::Object(Map::new()));
                        }
                        let (c, f) = self.set_data(children, child, &current, assign);
                        count += c;
                        flag += f;
                    } else if assign {
                        let current = path::join(prefix, key);
                        self.set_data(children, &Map::new(), &current, assign);
                    }
                }
            }
        }
        if !assign && flag == count {
            self.hydrated.insert(prefix.to_string());
        }
        (count, flag)
    }

    /// Forgets dirty state after a successful persist and snapshots the tree.
    pub(crate) fn mark_persisted(&mut self) {
        self.dirty.clear();
        for array in self.arrays.values_mut() {
            array.settle();
        }
        self.persisted = self.doc.clone();
    }
}

fn data_action(assign: bool) -> TaskAction {
    TaskAction::new(move |doc, data| {
        doc.apply_data(&data, assign);
        if !assign {
            doc.persisted = doc.doc.clone();
        }
        Box::pin(async { Ok(()) })
    })
}

fn save_action(doc: &mut Document, _args: Value) -> TaskFuture<'_, Result<()>> {
    Box::pin(async move {
        if !doc.errors.is_empty() {
            let errors = doc.take_errors();
            event!(Level::DEBUG, errors = errors.len(), "save rejected");
            return Err(DocError::Invalid(errors));
        }

        let store = doc.model.connection().store().clone();
        let options = doc.model.connection().config().write_options();
        let collection = doc.model.collection().to_string();

        if doc.is_new {
            store.insert(&collection, &doc.doc, options).await?;
            doc.is_new = false;
            event!(Level::DEBUG, collection = %collection, "document inserted");
        } else {
            let delta = doc.delta();
            if delta.update.is_empty() {
                event!(Level::DEBUG, "nothing to update");
            } else {
                match store
                    .update(&collection, &delta.previous, &delta.update, options)
                    .await
                {
                    Ok(0) => {
                        event!(
                            Level::WARN,
                            collection = %collection,
                            "update matched no document; stored copy changed since load"
                        );
                        doc.degrade_array_logs();
                        return Err(DocError::Store(format!(
                            "update conflict on {}: stored document changed since load",
                            collection
                        )));
                    }
                    Ok(_) => {}
                    Err(err) => {
                        doc.degrade_array_logs();
                        return Err(err);
                    }
                }
            }
        }

        doc.mark_persisted();
        Ok(())
    })
}

fn remove_action(doc: &mut Document, _args: Value) -> TaskFuture<'_, Result<()>> {
    Box::pin(async move {
        if doc.is_new {
            return Ok(());
        }
        let store = doc.model.connection().store().clone();
        let collection = doc.model.collection().to_string();
        let selector = serde_json::json!({ ID_FIELD: doc.id() });
        store.remove(&collection, &selector).await?;
        event!(Level::DEBUG, collection = %collection, "document removed");
        Ok(())
    })
}
