//! Dotted-path navigation over the JSON value tree.
//!
//! Paths address object keys only (`"name.first"`); array members are managed
//! by the embedded collection, never addressed through a path segment.

use serde_json::{Map, Value};

/// Splits a dotted path into its segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
}

/// Joins a parent path and a key, treating an empty parent as the root.
pub fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Every proper ancestor of `path`, nearest first: `a.b.c` yields `a.b`, `a`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut end = path.len();
    while let Some(idx) = path[..end].rfind('.') {
        out.push(&path[..idx]);
        end = idx;
    }
    out
}

/// Reads the value at `path`, or `None` when any segment is missing.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in segments(path) {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// Returns `true` when the stored value actually changed. A non-object value
/// sitting where a container is needed is replaced by an empty object.
pub fn set(root: &mut Value, path: &str, value: Value) -> bool {
    write(root, path, value).unwrap_or(false)
}

fn write(root: &mut Value, path: &str, value: Value) -> Option<bool> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts.split_last()?;

    let mut current = root;
    for part in parents {
        current = ensure_object(current)?
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let map = ensure_object(current)?;
    if map.get(*last) == Some(&value) {
        return Some(false);
    }
    map.insert(last.to_string(), value);
    Some(true)
}

/// Removes the value at `path`, returning it when present.
pub fn remove(root: &mut Value, path: &str) -> Option<Value> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts.split_last()?;
    let mut current = root;
    for part in parents {
        current = current.as_object_mut()?.get_mut(*part)?;
    }
    current.as_object_mut()?.remove(*last)
}

fn ensure_object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = json!({});
        assert!(set(&mut root, "name.first", json!("Ada")));
        assert_eq!(root, json!({"name": {"first": "Ada"}}));
        assert!(!set(&mut root, "name.first", json!("Ada")));
    }

    #[test]
    fn get_and_remove_follow_segments() {
        let mut root = json!({"a": {"b": {"c": 1}}});
        assert_eq!(get(&root, "a.b.c"), Some(&json!(1)));
        assert_eq!(get(&root, "a.x"), None);
        assert_eq!(remove(&mut root, "a.b.c"), Some(json!(1)));
        assert_eq!(root, json!({"a": {"b": {}}}));
    }

    #[test]
    fn ancestors_are_nearest_first() {
        assert_eq!(ancestors("a.b.c"), vec!["a.b", "a"]);
        assert!(ancestors("a").is_empty());
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", "b"), "a.b");
    }
}
