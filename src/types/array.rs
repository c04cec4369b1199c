use crate::core::path;
use crate::document::{
    ArrayEncoding, ArrayOp, Document, EmbeddedArray, Member, UpdateDescription, classify_ops,
};
use crate::schema::{PathDescriptor, PathKind, Subtype};
use serde_json::Value;

use super::cast_error;

/// Array path, optionally typed by `subtype`.
///
/// Assignments rebuild the embedded collection and log what changed; saves
/// encode the log atomically where possible.
pub fn array(subtype: Option<Subtype>) -> PathDescriptor {
    let descriptor = PathDescriptor::new(PathKind::Array)
        .default_with(|_| Value::Array(Vec::new()))
        .init(init_array)
        .set(|_, value, _| {
            Ok(match value {
                Value::Array(_) => value,
                Value::Null => Value::Array(Vec::new()),
                other => Value::Array(vec![other]),
            })
        })
        .strict(|_, value, at| match value {
            Value::Array(_) => Ok(value),
            other => Err(cast_error(at, &other, PathKind::Array)),
        })
        .atomic_encoder(encode_array)
        .compile(compile_array);
    match subtype {
        Some(subtype) => descriptor.subtype(subtype),
        None => descriptor,
    }
}

fn init_array(doc: &mut Document, value: Value, at: &str, hydrate: bool) -> Value {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    let members: Vec<Member> = items
        .into_iter()
        .map(|item| doc.coerce_member(at, item, hydrate))
        .collect();
    let mut array = EmbeddedArray::with_members(at, members);
    let next = array.to_value();

    if !hydrate {
        let current = path::get(&doc.doc, at);
        if current == Some(&next) {
            doc.arrays.entry(at.to_string()).or_insert(array);
            return next;
        }
        let was_empty = current
            .and_then(Value::as_array)
            .is_none_or(|items| items.is_empty());

        let mut log = doc
            .arrays
            .get_mut(at)
            .map(EmbeddedArray::take_log)
            .unwrap_or_default();
        if was_empty {
            log.extend(array.iter().map(|member| ArrayOp::Push(member.to_value())));
        } else {
            log.push(ArrayOp::Replace);
        }
        for op in log {
            array.record(op);
        }
    }

    doc.arrays.insert(at.to_string(), array);
    next
}

fn encode_array(doc: &mut Document, at: &str, update: &mut UpdateDescription) {
    let ops = doc
        .arrays
        .get_mut(at)
        .map(EmbeddedArray::take_log)
        .unwrap_or_default();
    if ops.is_empty() {
        doc.overwrite_path(at, update);
        return;
    }
    match classify_ops(&ops) {
        ArrayEncoding::Atomic { push, pop } => {
            if !push.is_empty() {
                update.push_all(at, push);
            }
            if let Some(end) = pop {
                update.pop(at, end);
            }
        }
        ArrayEncoding::Overwrite => doc.overwrite_path(at, update),
    }
}

/// Folds in-place edits of embedded members back into the tree.
fn compile_array(doc: &mut Document, at: &str) {
    let Some(array) = doc.arrays.get_mut(at) else {
        return;
    };
    let current = array.to_value();
    if path::get(&doc.doc, at) == Some(&current) {
        return;
    }
    array.record(ArrayOp::Replace);
    path::set(&mut doc.doc, at, current);
    doc.mark_dirty(at, PathKind::Array);
}
