//! Schema contract consumed by documents.
//!
//! A [`Schema`] is a static map from path string to [`PathDescriptor`], an
//! ordered declaration tree used when projecting input data, and the
//! schema-level hook registrations. Schemas are immutable once built and
//! shared through `Arc`.

mod descriptor;
mod registry;

pub use descriptor::{
    AtomicEncoderFn, CompilerFn, DefaultFn, DefaultValue, GetterFn, InitFn, PathDescriptor,
    PathKind, SetterFn, Subtype, ValidatorFn, ValidatorFuture, Verdict,
};
pub use registry::SchemaRegistry;

use crate::core::{ID_FIELD, Projection, path};
use crate::document::{Hook, TaskAction, TaskOverride};
use crate::types;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Node of the ordered declaration tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldNode {
    Leaf(String),
    Nested(String, Vec<FieldNode>),
}

impl FieldNode {
    pub fn key(&self) -> &str {
        match self {
            FieldNode::Leaf(key) | FieldNode::Nested(key, _) => key,
        }
    }
}

pub struct Schema {
    name: String,
    collection: String,
    paths: BTreeMap<String, Arc<PathDescriptor>>,
    fields: Vec<FieldNode>,
    pres: HashMap<String, Vec<Hook>>,
    posts: HashMap<String, Vec<Hook>>,
    overrides: HashMap<String, TaskOverride>,
    tasks: HashMap<String, TaskAction>,
    compilers: Vec<String>,
    default_projection: Option<Projection>,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn path(&self, path: &str) -> Option<&Arc<PathDescriptor>> {
        self.paths.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &Arc<PathDescriptor>)> {
        self.paths.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }

    pub fn pres(&self, task: &str) -> &[Hook] {
        self.pres.get(task).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn posts(&self, task: &str) -> &[Hook] {
        self.posts.get(task).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn override_for(&self, task: &str) -> Option<&TaskOverride> {
        self.overrides.get(task)
    }

    pub fn task(&self, name: &str) -> Option<&TaskAction> {
        self.tasks.get(name)
    }

    /// Paths carrying a compiler hook, in declaration order.
    pub fn compilers(&self) -> &[String] {
        &self.compilers
    }

    pub fn default_projection(&self) -> Option<&Projection> {
        self.default_projection.as_ref()
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("paths", &self.paths.keys().collect::<Vec<_>>())
            .field("compilers", &self.compilers)
            .finish()
    }
}

pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let schema = Schema {
            collection: name.to_lowercase(),
            name,
            paths: BTreeMap::new(),
            fields: Vec::new(),
            pres: HashMap::new(),
            posts: HashMap::new(),
            overrides: HashMap::new(),
            tasks: HashMap::new(),
            compilers: Vec::new(),
            default_projection: None,
        };
        Self { schema }
            .field(ID_FIELD, types::oid())
            .field("id", types::id_mirror(ID_FIELD))
    }

    /// Binds the schema to a store collection (defaults to the lowercased name).
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.schema.collection = collection.into();
        self
    }

    /// Declares `path`, auto-declaring missing ancestors as object containers.
    ///
    /// Re-declaring a path replaces its descriptor but keeps its position.
    pub fn field(mut self, field_path: &str, descriptor: PathDescriptor) -> Self {
        for ancestor in path::ancestors(field_path).into_iter().rev() {
            if !self.schema.paths.contains_key(ancestor) {
                self.schema
                    .paths
                    .insert(ancestor.to_string(), Arc::new(types::object()));
            }
        }

        let parts: Vec<&str> = path::segments(field_path).collect();
        let container = descriptor.kind == PathKind::Object;
        insert_node(&mut self.schema.fields, &parts, container);

        if descriptor.compiler.is_some() && !self.schema.compilers.iter().any(|p| p == field_path)
        {
            self.schema.compilers.push(field_path.to_string());
        }
        if let Some(hook) = types::setup_hook(field_path, &descriptor) {
            self.schema
                .pres
                .entry("save".to_string())
                .or_default()
                .push(hook);
        }

        self.schema
            .paths
            .insert(field_path.to_string(), Arc::new(descriptor));
        self
    }

    pub fn string(self, path: &str) -> Self {
        self.field(path, types::string())
    }

    pub fn number(self, path: &str) -> Self {
        self.field(path, types::number())
    }

    pub fn boolean(self, path: &str) -> Self {
        self.field(path, types::boolean())
    }

    pub fn date(self, path: &str) -> Self {
        self.field(path, types::date())
    }

    pub fn oid(self, path: &str) -> Self {
        self.field(path, types::oid())
    }

    pub fn raw(self, path: &str) -> Self {
        self.field(path, types::raw())
    }

    pub fn array(self, path: &str) -> Self {
        self.field(path, types::array(None))
    }

    pub fn embedded_array(self, path: &str, member: Arc<Schema>) -> Self {
        self.field(path, types::array(Some(Subtype::Embedded(member))))
    }

    pub fn dbref(self, path: &str, model: &str) -> Self {
        self.field(path, types::dbref(model))
    }

    pub fn dbref_array(self, path: &str, model: &str) -> Self {
        self.field(path, types::dbref_array(model))
    }

    pub fn dbreffed_array(self, path: &str, model: &str, referred_as: &str) -> Self {
        self.field(path, types::dbreffed_array(model, referred_as))
    }

    pub fn pre(mut self, task: &str, hook: Hook) -> Self {
        self.schema
            .pres
            .entry(task.to_string())
            .or_default()
            .push(hook);
        self
    }

    pub fn post(mut self, task: &str, hook: Hook) -> Self {
        self.schema
            .posts
            .entry(task.to_string())
            .or_default()
            .push(hook);
        self
    }

    /// Wraps the core action of `task`; the override is handed the original action.
    pub fn override_task(mut self, task: &str, wrapper: TaskOverride) -> Self {
        self.schema.overrides.insert(task.to_string(), wrapper);
        self
    }

    /// Defines a user task runnable through `Document::invoke`.
    pub fn task(mut self, name: &str, action: TaskAction) -> Self {
        self.schema.tasks.insert(name.to_string(), action);
        self
    }

    pub fn default_projection(mut self, projection: Projection) -> Self {
        self.schema.default_projection = Some(projection);
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }

    pub fn shared(self) -> Arc<Schema> {
        Arc::new(self.schema)
    }
}

fn insert_node(nodes: &mut Vec<FieldNode>, parts: &[&str], container: bool) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };

    let position = nodes.iter().position(|n| n.key() == *first);
    if rest.is_empty() {
        match position {
            Some(idx) => {
                if container && matches!(nodes[idx], FieldNode::Leaf(_)) {
                    nodes[idx] = FieldNode::Nested(first.to_string(), Vec::new());
                }
            }
            None if container => nodes.push(FieldNode::Nested(first.to_string(), Vec::new())),
            None => nodes.push(FieldNode::Leaf(first.to_string())),
        }
        return;
    }

    let idx = match position {
        Some(idx) => {
            if matches!(nodes[idx], FieldNode::Leaf(_)) {
                nodes[idx] = FieldNode::Nested(first.to_string(), Vec::new());
            }
            idx
        }
        None => {
            nodes.push(FieldNode::Nested(first.to_string(), Vec::new()));
            nodes.len() - 1
        }
    };

    if let FieldNode::Nested(_, children) = &mut nodes[idx] {
        insert_node(children, rest, container);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_declares_identifier_and_containers() {
        let schema = Schema::builder("User")
            .string("name.first")
            .string("name.last")
            .number("age")
            .build();

        assert_eq!(schema.collection(), "user");
        assert!(schema.path("_id").is_some());
        assert_eq!(schema.path("name").map(|d| d.kind), Some(PathKind::Object));
        assert_eq!(
            schema.fields(),
            &[
                FieldNode::Leaf("_id".into()),
                FieldNode::Leaf("id".into()),
                FieldNode::Nested(
                    "name".into(),
                    vec![
                        FieldNode::Leaf("first".into()),
                        FieldNode::Leaf("last".into())
                    ]
                ),
                FieldNode::Leaf("age".into()),
            ]
        );
    }

    #[test]
    fn compilers_and_reference_setup_are_registered() {
        let schema = Schema::builder("Post")
            .array("tags")
            .dbref("author", "User")
            .build();

        assert_eq!(schema.compilers(), &["tags".to_string()]);
        assert_eq!(schema.pres("save").len(), 1);
        assert!(schema.pres("remove").is_empty());
    }
}
