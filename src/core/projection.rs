use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::path;

/// Partial field loading request.
///
/// `Include` loads only the named paths (and, implicitly, their containers);
/// `Exclude` loads every declared path except the named subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    pub fn include<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(paths.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(paths.into_iter().map(Into::into).collect())
    }

    /// Computes the set of loaded paths given the schema's declared paths.
    pub fn loaded_fields<'a, I>(&self, declared: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = BTreeSet::new();
        match self {
            Self::Include(paths) => {
                for key in paths {
                    fields.insert(key.clone());
                    for ancestor in path::ancestors(key) {
                        fields.insert(ancestor.to_string());
                    }
                }
            }
            Self::Exclude(paths) => {
                let excluded: BTreeSet<&str> = paths.iter().map(String::as_str).collect();
                for declared_path in declared {
                    let parts: Vec<&str> = path::segments(declared_path).collect();
                    for k in 1..=parts.len() {
                        let prefix = parts[..k].join(".");
                        if excluded.contains(prefix.as_str()) {
                            break;
                        }
                        fields.insert(prefix);
                    }
                }
            }
        }
        fields
    }

    /// Renders the projection the way document stores expect it: `{path: 1|0}`.
    pub fn to_selector(&self) -> serde_json::Value {
        let (paths, flag) = match self {
            Self::Include(paths) => (paths, 1),
            Self::Exclude(paths) => (paths, 0),
        };
        let map = paths
            .iter()
            .map(|p| (p.clone(), serde_json::Value::from(flag)))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_adds_ancestors() {
        let fields = Projection::include(["name.first"]).loaded_fields(Vec::new());
        assert!(fields.contains("name.first"));
        assert!(fields.contains("name"));
        assert!(!fields.contains("name.last"));
    }

    #[test]
    fn exclude_keeps_every_other_declared_prefix() {
        let declared = ["_id", "name", "name.first", "name.last", "age"];
        let fields = Projection::exclude(["name.last", "age"]).loaded_fields(declared);
        assert!(fields.contains("_id"));
        assert!(fields.contains("name"));
        assert!(fields.contains("name.first"));
        assert!(!fields.contains("name.last"));
        assert!(!fields.contains("age"));
    }
}
