//! Standard type library.
//!
//! Each function returns a fresh [`PathDescriptor`] that can be refined with
//! more setters, getters, validators or a default before being declared on a
//! schema. Scalar setters let `null` through so a value can be cleared.

mod array;
mod reference;

pub use array::array;
pub(crate) use reference::setup_hook;
pub use reference::{dbref, dbref_array, dbreffed_array};

use crate::core::{DocError, new_object_id, path};
use crate::schema::{PathDescriptor, PathKind};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};

fn cast_error(at: &str, value: &Value, kind: PathKind) -> DocError {
    DocError::coercion(at, value, kind.as_str())
}

pub fn string() -> PathDescriptor {
    PathDescriptor::new(PathKind::String)
        .set(|_, value, at| match value {
            Value::String(_) | Value::Null => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(cast_error(at, &other, PathKind::String)),
        })
        .strict(|_, value, at| match value {
            Value::String(_) => Ok(value),
            other => Err(cast_error(at, &other, PathKind::String)),
        })
}

pub fn number() -> PathDescriptor {
    PathDescriptor::new(PathKind::Number)
        .default_value(0)
        .set(|_, value, at| match value {
            Value::Number(_) | Value::Null => Ok(value),
            Value::String(ref s) => parse_number(s).ok_or_else(|| cast_error(at, &value, PathKind::Number)),
            other => Err(cast_error(at, &other, PathKind::Number)),
        })
        .strict(|_, value, at| match value {
            Value::Number(_) => Ok(value),
            other => Err(cast_error(at, &other, PathKind::Number)),
        })
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::from(int));
    }
    let float = raw.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}

pub fn boolean() -> PathDescriptor {
    PathDescriptor::new(PathKind::Boolean)
        .default_value(false)
        .set(|_, value, _| Ok(Value::Bool(truthy(&value))))
        .strict(|_, value, at| match value {
            Value::Bool(_) => Ok(value),
            other => Err(cast_error(at, &other, PathKind::Boolean)),
        })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Dates are stored as RFC 3339 strings in UTC. Accepts RFC 3339 strings,
/// plain `YYYY-MM-DD` dates and millisecond timestamps.
pub fn date() -> PathDescriptor {
    PathDescriptor::new(PathKind::Date)
        .set(|_, value, at| {
            if value.is_null() {
                return Ok(value);
            }
            parse_date(&value)
                .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)))
                .ok_or_else(|| cast_error(at, &value, PathKind::Date))
        })
        .strict(|_, value, at| {
            let valid = value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok());
            if valid {
                Ok(value)
            } else {
                Err(cast_error(at, &value, PathKind::Date))
            }
        })
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()?
                    .and_hms_opt(0, 0, 0)
                    .map(|naive| naive.and_utc())
            }),
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?),
        _ => None,
    }
}

/// Identifier type. Missing or empty input generates a fresh identifier.
pub fn oid() -> PathDescriptor {
    PathDescriptor::new(PathKind::ObjectId)
        .default_with(|_| Value::String(new_object_id()))
        .set(|_, value, at| match value {
            Value::Null => Ok(Value::String(new_object_id())),
            Value::String(ref s) if s.is_empty() => Ok(Value::String(new_object_id())),
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(cast_error(at, &other, PathKind::ObjectId)),
        })
        .strict(|_, value, at| match value {
            Value::String(ref s) if !s.is_empty() => Ok(value),
            other => Err(cast_error(at, &other, PathKind::ObjectId)),
        })
}

/// Virtual mirror of `target`: reads and writes go to the target path.
pub fn id_mirror(target: &'static str) -> PathDescriptor {
    PathDescriptor::new(PathKind::Virtual)
        .get(move |doc, _, _| doc.get(target))
        .set(move |doc, value, _| {
            doc.set(target, value.clone());
            Ok(value)
        })
}

/// Container of nested paths. Assigning an object distributes each declared
/// child through its own pipeline; undeclared keys are dropped.
pub fn object() -> PathDescriptor {
    PathDescriptor::new(PathKind::Object)
        .set(|doc, value, at| {
            let children = match value {
                Value::Object(children) => children,
                other => return Err(cast_error(at, &other, PathKind::Object)),
            };
            for (key, child) in children {
                let child_path = path::join(at, &key);
                if doc.schema().path(&child_path).is_some() {
                    doc.set(&child_path, child);
                }
            }
            Ok(path::get(&doc.doc, at)
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default())))
        })
        .strict(|_, value, at| match value {
            Value::Object(_) => Ok(value),
            other => Err(cast_error(at, &other, PathKind::Object)),
        })
}

/// Computed path with no storage; behaviour comes from its getters and setters.
pub fn virtual_field() -> PathDescriptor {
    PathDescriptor::new(PathKind::Virtual)
}

/// Stored as given.
pub fn raw() -> PathDescriptor {
    PathDescriptor::new(PathKind::Raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_parse_from_strings() {
        assert_eq!(parse_number(" 42 "), Some(json!(42)));
        assert_eq!(parse_number("2.5"), Some(json!(2.5)));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(truthy(&json!("no")));
        assert!(truthy(&json!([])));
    }

    #[test]
    fn dates_normalise_to_utc() {
        let parsed = parse_date(&json!("2024-03-01T10:00:00+02:00")).unwrap();
        assert_eq!(
            parsed.to_rfc3339_opts(SecondsFormat::Millis, true),
            "2024-03-01T08:00:00.000Z"
        );
        assert!(parse_date(&json!("2024-03-01")).is_some());
        assert!(parse_date(&json!(0)).is_some());
        assert!(parse_date(&json!("yesterday")).is_none());
    }
}
