use crate::core::{DocError, Result, path};
use crate::document::{DirtyMark, Document};
use crate::model::Model;
use crate::schema::PathKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Level, event};

/// Stored form of a reference: `{"$ref": collection, "$id": id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbRefPointer {
    #[serde(rename = "$ref")]
    pub collection: String,
    #[serde(rename = "$id")]
    pub id: String,
}

impl DbRefPointer {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "$ref": self.collection, "$id": self.id })
    }

    /// Parses a stored pointer; anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 2 {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Deferred accessor for a single reference.
///
/// The live referenced document is cached on the owner, so re-reading a
/// reference that still points at the cached document costs no round trip.
pub struct DbRef<'a> {
    owner: &'a mut Document,
    path: String,
}

impl DbRef<'_> {
    /// Current pointer, `None` when nothing is assigned.
    pub fn pointer(&self) -> Result<Option<DbRefPointer>> {
        match path::get(&self.owner.doc, &self.path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => DbRefPointer::from_value(value).map(Some).ok_or_else(|| {
                DocError::ReferenceIntegrity(format!("Argument error - {}", value))
            }),
        }
    }

    /// The referenced document, from the cache when it still matches the
    /// pointer, otherwise looked up by identifier.
    pub async fn resolve(&mut self) -> Result<Option<Document>> {
        let Some(pointer) = self.pointer()? else {
            return Ok(None);
        };
        if let Some(cached) = self.owner.dbrefs.get(&self.path)
            && cached.id().as_deref() == Some(pointer.id.as_str())
        {
            return Ok(Some((**cached).clone()));
        }

        let model = self.owner.related_model(&self.path)?;
        event!(Level::DEBUG, path = %self.path, id = %pointer.id, "resolving reference");
        let found = model.find_by_id(&pointer.id).await?.ok_or_else(|| {
            DocError::ReferenceIntegrity(format!(
                "{} '{}' referenced by {} does not exist",
                model.name(),
                pointer.id,
                self.path
            ))
        })?;
        self.owner
            .dbrefs
            .insert(self.path.clone(), Box::new(found.clone()));
        Ok(Some(found))
    }

    /// Removes the referenced document from the store, then clears the
    /// pointer and the cache and marks the path dirty.
    pub async fn remove(mut self) -> Result<()> {
        let target = self.resolve().await?;
        if let Some(mut target) = target {
            target.remove().await?;
        }
        self.owner.dbrefs.remove(&self.path);
        path::remove(&mut self.owner.doc, &self.path);
        self.owner
            .dirty
            .insert(self.path.clone(), DirtyMark::Assigned);
        Ok(())
    }
}

impl Document {
    /// Opens the single reference declared at `path`.
    pub fn dbref(&mut self, ref_path: &str) -> Result<DbRef<'_>> {
        self.expect_kind(ref_path, PathKind::DbRef)?;
        Ok(DbRef {
            owner: self,
            path: ref_path.to_string(),
        })
    }

    /// Points `path` at `member` and caches the live document.
    pub fn set_ref(&mut self, ref_path: &str, member: Document) -> Result<()> {
        self.expect_kind(ref_path, PathKind::DbRef)?;
        let pointer = member.pointer()?;
        self.dbrefs.insert(ref_path.to_string(), Box::new(member));
        self.write_path(ref_path, pointer.to_value(), Some(PathKind::DbRef));
        Ok(())
    }

    /// Model referenced by the path declared at `ref_path`.
    pub(crate) fn related_model(&self, ref_path: &str) -> Result<Model> {
        let descriptor = self.descriptor(ref_path)?;
        let name = descriptor.model_name().ok_or_else(|| {
            DocError::ReferenceIntegrity(format!("{} does not reference a model", ref_path))
        })?;
        self.model.related(name)
    }

    pub(crate) fn expect_kind(&self, declared: &str, kind: PathKind) -> Result<()> {
        let descriptor = self.descriptor(declared)?;
        if descriptor.kind != kind {
            return Err(DocError::coercion(
                declared,
                &Value::String(descriptor.type_tag().to_string()),
                kind.as_str(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pointer_round_trips_through_the_stored_form() {
        let pointer = DbRefPointer::new("user", "u1");
        assert_eq!(pointer.to_value(), json!({"$ref": "user", "$id": "u1"}));
        assert_eq!(DbRefPointer::from_value(&pointer.to_value()), Some(pointer));
        assert_eq!(DbRefPointer::from_value(&json!({"name": "x"})), None);
        assert_eq!(DbRefPointer::from_value(&json!("u1")), None);
    }
}
