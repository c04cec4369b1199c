use crate::core::{DocError, ID_FIELD, Result, path};
use crate::document::UpdateDescription;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{Level, event};

use super::{DocumentStore, FindQuery, IndexInformation, WriteOptions};

/// Round-trip counters.
#[derive(Debug, Default)]
pub struct StoreStats {
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    finds: AtomicU64,
}

impl StoreStats {
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> u64 {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn finds(&self) -> u64 {
        self.finds.load(Ordering::SeqCst)
    }

    /// Every round trip of any kind.
    pub fn total(&self) -> u64 {
        self.inserts() + self.updates() + self.removes() + self.finds()
    }
}

/// In-process document store.
///
/// Collections are vectors of JSON records in insertion order. Selectors
/// support equality on dotted paths (a `null` operand also matches an absent
/// path) and `$in`; updates support `$set`, `$unset`, `$pushAll` and `$pop`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    indexes: RwLock<HashMap<String, IndexInformation>>,
    stats: StoreStats,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Rejects every subsequent write until switched back.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub async fn ensure_index(&self, collection: &str, name: &str, keys: Value) {
        let mut indexes = self.indexes.write().await;
        indexes
            .entry(collection.to_string())
            .or_default()
            .insert(name.to_string(), keys);
    }

    /// Raw records of `collection`, for inspection.
    pub async fn records(&self, collection: &str) -> Vec<Value> {
        let collections = self.collections.read().await;
        collections.get(collection).cloned().unwrap_or_default()
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(DocError::Store("store is read-only".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, doc: &Value, options: WriteOptions) -> Result<()> {
        self.stats.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let id = path::get(doc, ID_FIELD).cloned().unwrap_or(Value::Null);
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        if !id.is_null() && records.iter().any(|r| path::get(r, ID_FIELD) == Some(&id)) {
            return Err(DocError::Store(format!(
                "duplicate key {} in collection '{}'",
                id, collection
            )));
        }
        records.push(doc.clone());
        event!(Level::TRACE, collection = %collection, safe = options.safe, "insert");
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        selector: &Value,
        update: &UpdateDescription,
        options: WriteOptions,
    ) -> Result<u64> {
        self.stats.updates.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let mut collections = self.collections.write().await;
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| matches(r, selector)))
        else {
            return Ok(0);
        };

        let mut updated = record.clone();
        apply_update(&mut updated, update)?;
        *record = updated;
        event!(Level::TRACE, collection = %collection, safe = options.safe, "update");
        Ok(1)
    }

    async fn remove(&self, collection: &str, selector: &Value) -> Result<u64> {
        self.stats.removes.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|r| !matches(r, selector));
        Ok((before - records.len()) as u64)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>> {
        self.stats.finds.fetch_add(1, Ordering::SeqCst);

        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let found = records
            .iter()
            .filter(|r| matches(r, &query.selector))
            .skip(query.skip.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|r| project(r, query.projection.as_ref()))
            .collect();
        Ok(found)
    }

    async fn count(&self, collection: &str, selector: &Value) -> Result<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map_or(0, |records| records.iter().filter(|r| matches(r, selector)).count())
            as u64)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.check_writable()?;
        self.collections.write().await.remove(collection);
        self.indexes.write().await.remove(collection);
        Ok(())
    }

    async fn index_information(&self, collection: &str) -> Result<IndexInformation> {
        let mut info = Map::new();
        info.insert("_id_".to_string(), json!({ ID_FIELD: 1 }));
        if let Some(extra) = self.indexes.read().await.get(collection) {
            info.extend(extra.clone());
        }
        Ok(info)
    }
}

fn matches(record: &Value, selector: &Value) -> bool {
    let Some(conditions) = selector.as_object() else {
        return true;
    };
    conditions.iter().all(|(field, expected)| {
        let actual = path::get(record, field);
        if let Some(candidates) = expected.get("$in") {
            return candidates
                .as_array()
                .is_some_and(|c| c.iter().any(|v| Some(v) == actual));
        }
        match expected {
            Value::Null => actual.is_none_or(Value::is_null),
            _ => actual == Some(expected),
        }
    })
}

fn project(record: &Value, projection: Option<&Value>) -> Value {
    let Some(fields) = projection.and_then(Value::as_object) else {
        return record.clone();
    };
    let including = fields.values().any(|v| v.as_i64() == Some(1));
    if including {
        let mut out = json!({});
        if let Some(id) = path::get(record, ID_FIELD) {
            path::set(&mut out, ID_FIELD, id.clone());
        }
        for (field, flag) in fields {
            if flag.as_i64() == Some(1)
                && let Some(value) = path::get(record, field)
            {
                path::set(&mut out, field, value.clone());
            }
        }
        out
    } else {
        let mut out = record.clone();
        for field in fields.keys() {
            path::remove(&mut out, field);
        }
        out
    }
}

fn apply_update(record: &mut Value, update: &UpdateDescription) -> Result<()> {
    for (field, value) in &update.set {
        path::set(record, field, value.clone());
    }
    for field in update.unset.keys() {
        path::remove(record, field);
    }
    for (field, values) in &update.push_all {
        let mut items = array_at(record, field)?;
        items.extend(values.iter().cloned());
        path::set(record, field, Value::Array(items));
    }
    for (field, end) in &update.pop {
        let mut items = array_at(record, field)?;
        if !items.is_empty() {
            if *end < 0 {
                items.remove(0);
            } else {
                items.pop();
            }
        }
        path::set(record, field, Value::Array(items));
    }
    Ok(())
}

fn array_at(record: &Value, field: &str) -> Result<Vec<Value>> {
    match path::get(record, field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(DocError::Store(format!(
            "cannot apply array modifier to non-array field '{}' ({})",
            field, other
        ))),
    }
}
