use crate::core::{DocError, path};
use crate::document::{Document, Hook, HookFlow};
use crate::reference::{DbRefArray, DbRefPointer};
use crate::schema::{PathDescriptor, PathKind, Subtype};
use serde_json::Value;
use tracing::{Level, event};

use super::cast_error;

/// Single reference to a document of `model`.
///
/// Accepts a stored pointer, `null`, or a plain object which becomes a new
/// unsaved document of the referenced model; that document is cached on the
/// owner and saved with it.
pub fn dbref(model: impl Into<String>) -> PathDescriptor {
    PathDescriptor::new(PathKind::DbRef)
        .subtype(Subtype::Model(model.into()))
        .set(|doc, value, at| {
            if value.is_null() {
                doc.dbrefs.remove(at);
                return Ok(value);
            }
            if DbRefPointer::from_value(&value).is_some() {
                return Ok(value);
            }
            if !value.is_object() {
                return Err(cast_error(at, &value, PathKind::DbRef));
            }
            let member = Document::assemble(doc.related_model(at)?, value, true);
            let pointer = member.pointer()?;
            doc.dbrefs.insert(at.to_string(), Box::new(member));
            Ok(pointer.to_value())
        })
        .strict(|_, value, at| {
            if value.is_null() || DbRefPointer::from_value(&value).is_some() {
                Ok(value)
            } else {
                Err(cast_error(at, &value, PathKind::DbRef))
            }
        })
}

/// Collection of references to documents of `model`, stored as pointers.
pub fn dbref_array(model: impl Into<String>) -> PathDescriptor {
    PathDescriptor::new(PathKind::DbRefArray)
        .subtype(Subtype::Model(model.into()))
        .set(|doc, value, at| {
            let items = match value {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => return Err(cast_error(at, &other, PathKind::DbRefArray)),
            };
            let model = doc.related_model(at)?;
            let mut pointers = Vec::with_capacity(items.len());
            let mut members = Vec::new();
            for item in items {
                if let Some(pointer) = DbRefPointer::from_value(&item) {
                    pointers.push(pointer);
                } else if item.is_object() {
                    let member = Document::assemble(model.clone(), item, true);
                    pointers.push(member.pointer()?);
                    members.push(member);
                } else {
                    return Err(cast_error(at, &item, PathKind::DbRefArray));
                }
            }

            let stored = Value::Array(pointers.iter().map(DbRefPointer::to_value).collect());
            doc.dbref_arrays
                .insert(at.to_string(), DbRefArray::new(at, model, pointers, members));
            Ok(stored)
        })
        .strict(|_, value, at| {
            let valid = value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|item| DbRefPointer::from_value(item).is_some())
            });
            if valid {
                Ok(value)
            } else {
                Err(cast_error(at, &value, PathKind::DbRefArray))
            }
        })
}

/// Inverse collection: documents of `model` whose `referred_as` field points
/// back at the owner. Nothing is stored on the owner; assigning an array of
/// objects builds unsaved members that are saved with the owner.
pub fn dbreffed_array(model: impl Into<String>, referred_as: impl Into<String>) -> PathDescriptor {
    PathDescriptor::new(PathKind::DbReffedArray)
        .subtype(Subtype::Model(model.into()))
        .referred_as(referred_as)
        .set(|doc, value, at| {
            let items = match value {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => return Err(cast_error(at, &other, PathKind::DbReffedArray)),
            };
            let handle = doc.new_dbreffed_array(at)?;
            for item in items {
                handle.build(item)?;
            }
            doc.dbreffed_arrays.insert(at.to_string(), handle);
            Ok(Value::Null)
        })
}

/// Pre-save hook a reference path installs on its schema, if any.
pub(crate) fn setup_hook(declared: &str, descriptor: &PathDescriptor) -> Option<Hook> {
    let declared = declared.to_string();
    match descriptor.kind {
        PathKind::DbRef => Some(save_cached_ref(declared)),
        PathKind::DbRefArray => Some(save_loaded_refs(declared)),
        PathKind::DbReffedArray => Some(save_built_members(declared)),
        _ => None,
    }
}

fn failure(ref_path: &str, err: DocError) -> DocError {
    let name = path::segments(ref_path).last().unwrap_or(ref_path);
    DocError::validation(ref_path, name, Some(err.to_string()))
}

fn needs_save(member: &Document) -> bool {
    member.is_new() || member.has_dirty()
}

/// Saves the cached referenced document before the owner when it is new or
/// changed, and refreshes the stored pointer.
fn save_cached_ref(ref_path: String) -> Hook {
    Hook::new(move |doc| {
        let ref_path = ref_path.clone();
        Box::pin(async move {
            let Some(mut member) = doc.dbrefs.remove(&ref_path) else {
                return Ok(HookFlow::Next);
            };
            let stored = path::get(&doc.doc, &ref_path).and_then(DbRefPointer::from_value);
            if stored.is_some_and(|pointer| Some(pointer.id) != member.id()) {
                event!(Level::DEBUG, path = %ref_path, "cached reference is stale");
                return Ok(HookFlow::Next);
            }
            if needs_save(&member) {
                match member.save().await {
                    Ok(()) => {
                        if let Ok(pointer) = member.pointer() {
                            doc.write_path(&ref_path, pointer.to_value(), Some(PathKind::DbRef));
                        }
                    }
                    Err(err) => doc.push_error(failure(&ref_path, err)),
                }
            }
            doc.dbrefs.insert(ref_path, member);
            Ok(HookFlow::Next)
        })
    })
}

fn save_loaded_refs(ref_path: String) -> Hook {
    Hook::new(move |doc| {
        let ref_path = ref_path.clone();
        Box::pin(async move {
            let Some(handle) = doc.dbref_arrays.get(&ref_path).cloned() else {
                return Ok(HookFlow::Next);
            };
            for mut member in handle.loaded()? {
                if !needs_save(&member) {
                    continue;
                }
                match member.save().await {
                    Ok(()) => handle.replace_member(member)?,
                    Err(err) => doc.push_error(failure(&ref_path, err)),
                }
            }
            Ok(HookFlow::Next)
        })
    })
}

fn save_built_members(ref_path: String) -> Hook {
    Hook::new(move |doc| {
        let ref_path = ref_path.clone();
        Box::pin(async move {
            let Some(handle) = doc.dbreffed_arrays.get(&ref_path).cloned() else {
                return Ok(HookFlow::Next);
            };
            let mut members = handle.loaded()?;
            for member in members.iter_mut().filter(|m| needs_save(m)) {
                if let Err(err) = member.save().await {
                    doc.push_error(failure(&ref_path, err));
                }
            }
            handle.adopt(members)?;
            Ok(HookFlow::Next)
        })
    })
}
