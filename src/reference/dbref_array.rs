use crate::core::{DocError, ID_FIELD, Result, path};
use crate::document::{DirtyMark, Document};
use crate::model::Model;
use crate::schema::PathKind;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{Level, event};

use super::{DbRefPointer, Eventual, FetchPhase, Resolver, Sequence};

/// Lazily resolved collection of references.
///
/// Holds the persisted pointers and the live members side by side. Handles
/// are cheap clones sharing one fetch state, so concurrent resolutions from
/// several clones still cost a single batched lookup.
#[derive(Clone)]
pub struct DbRefArray {
    path: String,
    model: Model,
    pointers: Arc<Mutex<Vec<DbRefPointer>>>,
    members: Eventual<Document>,
}

impl std::fmt::Debug for DbRefArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRefArray")
            .field("path", &self.path)
            .field("model", &self.model.name())
            .field("members", &self.members)
            .finish()
    }
}

impl DbRefArray {
    pub(crate) fn new(
        path: impl Into<String>,
        model: Model,
        pointers: Vec<DbRefPointer>,
        members: Vec<Document>,
    ) -> Self {
        Self {
            path: path.into(),
            model,
            pointers: Arc::new(Mutex::new(pointers)),
            members: Eventual::new(members),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pointers(&self) -> Result<Vec<DbRefPointer>> {
        Ok(self.pointers.lock()?.clone())
    }

    pub fn len(&self) -> usize {
        self.pointers.lock().map_or(0, |p| p.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self) -> Result<FetchPhase> {
        self.members.phase()
    }

    /// Members resolved so far, without a round trip.
    pub fn loaded(&self) -> Result<Vec<Document>> {
        self.members.snapshot()
    }

    pub(crate) fn set_pointers(&self, pointers: Vec<DbRefPointer>) -> Result<()> {
        *self.pointers.lock()? = pointers;
        Ok(())
    }

    pub(crate) fn push(&self, pointer: DbRefPointer, member: Document) -> Result<()> {
        self.pointers.lock()?.push(pointer);
        self.members.update(|items| items.push(member))
    }

    pub(crate) fn clear(&self) -> Result<()> {
        self.pointers.lock()?.clear();
        self.members.update(Vec::clear)
    }

    pub(crate) fn replace_member(&self, member: Document) -> Result<()> {
        let id = member.id();
        self.members.update(|items| {
            if let Some(slot) = items.iter_mut().find(|m| m.id() == id) {
                *slot = member;
            }
        })
    }
}

#[async_trait]
impl Resolver<Document> for DbRefArray {
    fn needs_fetch(&self, _phase: FetchPhase, items: &[Document]) -> bool {
        let known: HashSet<String> = items.iter().filter_map(Document::id).collect();
        self.pointers
            .lock()
            .map_or(true, |pointers| pointers.iter().any(|p| !known.contains(&p.id)))
    }

    /// One batched lookup for every distinct identifier not already known,
    /// then the members are aligned with the pointers.
    async fn fetch(&self, known: Vec<Document>) -> Result<Vec<Document>> {
        let pointers = self.pointers()?;
        let mut by_id: HashMap<String, Document> = known
            .into_iter()
            .filter_map(|doc| doc.id().map(|id| (id, doc)))
            .collect();

        let mut missing = Vec::new();
        for pointer in &pointers {
            if !by_id.contains_key(&pointer.id) && !missing.contains(&pointer.id) {
                missing.push(pointer.id.clone());
            }
        }

        if !missing.is_empty() {
            event!(
                Level::DEBUG,
                path = %self.path,
                missing = missing.len(),
                "fetching reference members"
            );
            let fetched = self
                .model
                .find(json!({ ID_FIELD: { "$in": missing } }))
                .all()
                .await?;
            for doc in fetched {
                if let Some(id) = doc.id() {
                    by_id.insert(id, doc);
                }
            }
        }

        pointers
            .iter()
            .map(|pointer| {
                by_id.get(&pointer.id).cloned().ok_or_else(|| {
                    DocError::ReferenceIntegrity(format!(
                        "{} '{}' referenced by {} does not exist",
                        self.model.name(),
                        pointer.id,
                        self.path
                    ))
                })
            })
            .collect()
    }
}

#[async_trait]
impl Sequence<Document> for DbRefArray {
    async fn all(&self) -> Result<Vec<Document>> {
        self.members.resolve(self).await
    }

    /// Resolves only the member at `index`.
    async fn at(&self, index: usize) -> Result<Option<Document>> {
        let Some(pointer) = self.pointers()?.get(index).cloned() else {
            return Ok(None);
        };
        let known = self.members.snapshot()?;
        if let Some(doc) = known.into_iter().find(|d| d.id().as_deref() == Some(pointer.id.as_str())) {
            return Ok(Some(doc));
        }
        self.model.find_by_id(&pointer.id).await
    }
}

impl Document {
    /// Handle on the reference collection declared at `path`, in sync with
    /// the stored pointers.
    pub fn dbref_array(&mut self, ref_path: &str) -> Result<DbRefArray> {
        self.expect_kind(ref_path, PathKind::DbRefArray)?;
        let pointers = match path::get(&self.doc, ref_path) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    DbRefPointer::from_value(item).ok_or_else(|| {
                        DocError::ReferenceIntegrity(format!("Argument error - {}", item))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(DocError::ReferenceIntegrity(format!(
                    "Argument error - {}",
                    other
                )));
            }
        };

        if let Some(handle) = self.dbref_arrays.get(ref_path) {
            handle.set_pointers(pointers)?;
            return Ok(handle.clone());
        }
        let model = self.related_model(ref_path)?;
        let handle = DbRefArray::new(ref_path, model, pointers, Vec::new());
        self.dbref_arrays
            .insert(ref_path.to_string(), handle.clone());
        Ok(handle)
    }

    /// Appends `member` to the reference collection at `path`.
    ///
    /// The member must carry an identifier.
    pub fn push_ref(&mut self, ref_path: &str, member: Document) -> Result<()> {
        if member.id().is_none() {
            return Err(DocError::ReferenceIntegrity(format!(
                "members of {} must have an identifier",
                ref_path
            )));
        }
        let handle = self.dbref_array(ref_path)?;
        handle.push(member.pointer()?, member)?;
        self.store_pointers(ref_path, &handle)
    }

    /// Empties the reference collection at `path`.
    pub fn clear_refs(&mut self, ref_path: &str) -> Result<()> {
        let handle = self.dbref_array(ref_path)?;
        handle.clear()?;
        self.store_pointers(ref_path, &handle)
    }

    fn store_pointers(&mut self, ref_path: &str, handle: &DbRefArray) -> Result<()> {
        let stored = handle
            .pointers()?
            .iter()
            .map(DbRefPointer::to_value)
            .collect();
        path::set(&mut self.doc, ref_path, Value::Array(stored));
        self.dirty.insert(ref_path.to_string(), DirtyMark::Assigned);
        Ok(())
    }
}
