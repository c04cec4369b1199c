//! Embedded collections.
//!
//! An [`EmbeddedArray`] mirrors the array stored at its path: the value tree
//! stays the source of truth for reads and persistence, the members keep the
//! typed view (embedded documents stay documents) and the log records every
//! structural mutation since the last persist.

use crate::core::{Result, path};
use crate::schema::{PathKind, Subtype};
use serde_json::Value;

use super::Document;

/// One logged structural mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayOp {
    Push(Value),
    Pop,
    Shift,
    Unshift(Value),
    Set(usize),
    Clear,
    /// The whole content was reassigned.
    Replace,
}

#[derive(Debug, Clone)]
pub enum Member {
    Raw(Value),
    Doc(Box<Document>),
}

impl Member {
    pub fn to_value(&self) -> Value {
        match self {
            Member::Raw(value) => value.clone(),
            Member::Doc(doc) => doc.to_object().clone(),
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Member::Doc(doc) => Some(&**doc),
            Member::Raw(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddedArray {
    path: String,
    members: Vec<Member>,
    log: Vec<ArrayOp>,
}

impl EmbeddedArray {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            members: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn with_members(path: impl Into<String>, members: Vec<Member>) -> Self {
        Self {
            members,
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Member> {
        self.members.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Member> {
        self.members.iter()
    }

    pub fn log(&self) -> &[ArrayOp] {
        &self.log
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.members.iter().map(Member::to_value).collect())
    }

    pub fn push(&mut self, member: Member) {
        self.log.push(ArrayOp::Push(member.to_value()));
        self.members.push(member);
    }

    pub fn pop(&mut self) -> Option<Member> {
        let member = self.members.pop()?;
        self.log.push(ArrayOp::Pop);
        Some(member)
    }

    pub fn shift(&mut self) -> Option<Member> {
        if self.members.is_empty() {
            return None;
        }
        self.log.push(ArrayOp::Shift);
        Some(self.members.remove(0))
    }

    pub fn unshift(&mut self, member: Member) {
        self.log.push(ArrayOp::Unshift(member.to_value()));
        self.members.insert(0, member);
    }

    /// Replaces the member at `index`, padding with nulls when past the end.
    pub fn set(&mut self, index: usize, member: Member) {
        while self.members.len() <= index {
            self.members.push(Member::Raw(Value::Null));
        }
        self.members[index] = member;
        self.log.push(ArrayOp::Set(index));
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.log.push(ArrayOp::Clear);
    }

    pub fn for_each<F: FnMut(&Member, usize)>(&self, mut f: F) {
        for (idx, member) in self.members.iter().enumerate() {
            f(member, idx);
        }
    }

    pub fn slice(&self, start: usize, end: usize) -> Vec<Member> {
        let end = end.min(self.members.len());
        let start = start.min(end);
        self.members[start..end].to_vec()
    }

    pub fn filter<F: Fn(&Member) -> bool>(&self, f: F) -> Vec<Member> {
        self.members.iter().filter(|m| f(m)).cloned().collect()
    }

    pub fn map<T, F: Fn(&Member) -> T>(&self, f: F) -> Vec<T> {
        self.members.iter().map(f).collect()
    }

    pub(crate) fn record(&mut self, op: ArrayOp) {
        self.log.push(op);
    }

    pub fn take_log(&mut self) -> Vec<ArrayOp> {
        std::mem::take(&mut self.log)
    }

    /// Forgets the log and the dirty state of embedded members.
    pub(crate) fn settle(&mut self) {
        self.log.clear();
        for member in &mut self.members {
            if let Member::Doc(doc) = member {
                doc.mark_persisted();
                doc.is_new = false;
            }
        }
    }

    pub(crate) fn member_mut(&mut self, index: usize) -> Option<&mut Member> {
        self.members.get_mut(index)
    }
}

/// Mutating view over the embedded array at one path.
///
/// Every structural operation coerces its input through the member type,
/// rewrites the stored array and marks the path dirty.
pub struct ArrayMut<'a> {
    doc: &'a mut Document,
    path: String,
}

impl<'a> ArrayMut<'a> {
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        let member = self.doc.coerce_member(&self.path, value.into(), false);
        self.array().push(member);
        self.sync();
        self
    }

    pub fn pop(&mut self) -> Option<Value> {
        let member = self.array().pop()?;
        self.sync();
        Some(member.to_value())
    }

    pub fn shift(&mut self) -> Option<Value> {
        let member = self.array().shift()?;
        self.sync();
        Some(member.to_value())
    }

    pub fn unshift(&mut self, value: impl Into<Value>) -> &mut Self {
        let member = self.doc.coerce_member(&self.path, value.into(), false);
        self.array().unshift(member);
        self.sync();
        self
    }

    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> &mut Self {
        let member = self.doc.coerce_member(&self.path, value.into(), false);
        self.array().set(index, member);
        self.sync();
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.array().clear();
        self.sync();
        self
    }

    /// Embedded member for in-place edits; picked up by the compiler on save.
    pub fn at_mut(&mut self, index: usize) -> Option<&mut Document> {
        match self.array().member_mut(index)? {
            Member::Doc(doc) => Some(&mut **doc),
            Member::Raw(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.doc.arrays.get(&self.path).map_or(0, EmbeddedArray::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn array(&mut self) -> &mut EmbeddedArray {
        self.doc
            .arrays
            .entry(self.path.clone())
            .or_insert_with(|| EmbeddedArray::new(self.path.clone()))
    }

    fn sync(&mut self) {
        let value = self.array().to_value();
        path::set(&mut self.doc.doc, &self.path, value);
        self.doc.mark_dirty(&self.path, PathKind::Array);
    }
}

impl Document {
    pub fn array(&self, path: &str) -> Option<&EmbeddedArray> {
        self.arrays.get(path)
    }

    /// Opens the array at `path` for mutation.
    pub fn array_mut(&mut self, array_path: &str) -> Result<ArrayMut<'_>> {
        self.expect_kind(array_path, PathKind::Array)?;
        if !self.arrays.contains_key(array_path) {
            let stored = match path::get(&self.doc, array_path) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            let members = stored
                .into_iter()
                .map(|item| self.coerce_member(array_path, item, true))
                .collect();
            self.arrays.insert(
                array_path.to_string(),
                EmbeddedArray::with_members(array_path, members),
            );
        }
        Ok(ArrayMut {
            doc: self,
            path: array_path.to_string(),
        })
    }

    /// Wraps one raw element as the declared member type.
    ///
    /// Embedded schemas produce documents whose coercion errors move onto the
    /// owner; scalar subtypes run their setter chain unless hydrating.
    pub(crate) fn coerce_member(&mut self, array_path: &str, value: Value, hydrate: bool) -> Member {
        let subtype = self
            .model
            .schema()
            .path(array_path)
            .and_then(|d| d.subtype.clone());
        match subtype {
            Some(Subtype::Embedded(schema)) => {
                let model = self.model.embedded(schema);
                let mut member = Document::assemble(model, value, !hydrate);
                self.errors.extend(member.take_errors());
                member.mark_persisted();
                Member::Doc(Box::new(member))
            }
            Some(Subtype::Scalar(descriptor)) if !hydrate => {
                let mut value = value;
                for setter in descriptor.setters.iter().rev() {
                    match setter(self, value.clone(), array_path) {
                        Ok(next) => value = next,
                        Err(err) => self.errors.push(err),
                    }
                }
                Member::Raw(value)
            }
            _ => Member::Raw(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structural_mutations_are_logged() {
        let mut array = EmbeddedArray::new("tags");
        array.push(Member::Raw(json!("a")));
        array.push(Member::Raw(json!("b")));
        assert_eq!(array.pop().map(|m| m.to_value()), Some(json!("b")));
        array.unshift(Member::Raw(json!("z")));

        assert_eq!(array.to_value(), json!(["z", "a"]));
        assert_eq!(
            array.take_log(),
            vec![
                ArrayOp::Push(json!("a")),
                ArrayOp::Push(json!("b")),
                ArrayOp::Pop,
                ArrayOp::Unshift(json!("z")),
            ]
        );
        assert!(array.log().is_empty());
    }

    #[test]
    fn removal_from_empty_is_not_logged() {
        let mut array = EmbeddedArray::new("tags");
        assert!(array.pop().is_none());
        assert!(array.shift().is_none());
        assert!(array.log().is_empty());
    }

    #[test]
    fn views_do_not_touch_the_log() {
        let members = vec![json!(1), json!(2), json!(3)]
            .into_iter()
            .map(Member::Raw)
            .collect();
        let array = EmbeddedArray::with_members("n", members);

        let odd = array.filter(|m| m.to_value().as_i64().is_some_and(|n| n % 2 == 1));
        assert_eq!(odd.len(), 2);
        assert_eq!(array.slice(1, 10).len(), 2);
        assert_eq!(array.map(Member::to_value), vec![json!(1), json!(2), json!(3)]);

        let mut seen = Vec::new();
        array.for_each(|_, idx| seen.push(idx));
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(array.log().is_empty());
    }
}
