//! Store collaborator contract.
//!
//! The document layer never talks to a driver directly; it issues inserts,
//! update descriptions, removals and finds through [`DocumentStore`].

mod memory;

pub use memory::{MemoryStore, StoreStats};

use crate::core::Result;
use crate::document::UpdateDescription;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Write acknowledgement options forwarded with every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub safe: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { safe: true }
    }
}

/// A find request against one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub selector: Value,
    /// `{path: 1}` includes, `{path: 0}` excludes; `None` loads everything.
    pub projection: Option<Value>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

impl FindQuery {
    pub fn new(selector: Value) -> Self {
        Self {
            selector,
            ..Self::default()
        }
    }

    pub fn projection(mut self, projection: Option<Value>) -> Self {
        self.projection = projection;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Index name mapped to its key specification.
pub type IndexInformation = Map<String, Value>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, collection: &str, doc: &Value, options: WriteOptions) -> Result<()>;

    /// Applies `update` to the record matching `selector`; returns the match count.
    async fn update(
        &self,
        collection: &str,
        selector: &Value,
        update: &UpdateDescription,
        options: WriteOptions,
    ) -> Result<u64>;

    /// Removes every record matching `selector`; returns the removed count.
    async fn remove(&self, collection: &str, selector: &Value) -> Result<u64>;

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>>;

    async fn count(&self, collection: &str, selector: &Value) -> Result<u64>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn index_information(&self, collection: &str) -> Result<IndexInformation>;
}
