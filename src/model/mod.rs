//! Model statics.
//!
//! A [`Model`] binds a schema to a connection and exposes the collection-level
//! operations: creation, lookup, removal, counting and index inspection.

mod query;

pub use query::Query;

use crate::connection::Connection;
use crate::core::{ID_FIELD, Projection, Result};
use crate::document::Document;
use crate::schema::Schema;
use crate::store::{IndexInformation, WriteOptions};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Clone)]
pub struct Model {
    schema: Arc<Schema>,
    connection: Connection,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.schema.name())
            .field("collection", &self.schema.collection())
            .finish()
    }
}

impl Model {
    pub(crate) fn new(schema: Arc<Schema>, connection: Connection) -> Self {
        Self { schema, connection }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn collection(&self) -> &str {
        self.schema.collection()
    }

    pub fn write_options(&self) -> WriteOptions {
        self.connection.config().write_options()
    }

    /// Another registered model, looked up by name.
    pub fn related(&self, name: &str) -> Result<Model> {
        self.connection.model(name)
    }

    /// A model for documents embedded in this one; never persisted on its own.
    pub fn embedded(&self, schema: Arc<Schema>) -> Model {
        Model::new(schema, self.connection.clone())
    }

    /// A new, unsaved document initialised from `data` in assign mode.
    pub async fn new_document(&self, data: Value) -> Result<Document> {
        let mut doc = Document::blank(self.clone(), None, true);
        doc.init(data, true).await?;
        Ok(doc)
    }

    /// A persisted document loaded from a store record.
    pub async fn hydrate_document(
        &self,
        data: Value,
        projection: Option<&Projection>,
    ) -> Result<Document> {
        let mut doc = Document::blank(self.clone(), projection, false);
        doc.init(data, false).await?;
        Ok(doc)
    }

    /// Builds and saves a document.
    pub async fn create(&self, data: Value) -> Result<Document> {
        let mut doc = self.new_document(data).await?;
        doc.save().await?;
        Ok(doc)
    }

    pub fn find(&self, selector: Value) -> Query {
        Query::new(self.clone(), selector)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>> {
        self.find(json!({ ID_FIELD: id })).first().await
    }

    pub async fn all(&self) -> Result<Vec<Document>> {
        self.find(json!({})).all().await
    }

    pub async fn first(&self) -> Result<Option<Document>> {
        self.find(json!({})).first().await
    }

    /// Removes every record matching `selector` without running document hooks.
    pub async fn remove(&self, selector: Value) -> Result<u64> {
        let removed = self
            .connection
            .store()
            .remove(self.collection(), &selector)
            .await?;
        event!(Level::DEBUG, collection = %self.collection(), removed, "remove");
        Ok(removed)
    }

    pub async fn count(&self, selector: Value) -> Result<u64> {
        self.find(selector).count().await
    }

    pub async fn drop(&self) -> Result<()> {
        self.connection
            .store()
            .drop_collection(self.collection())
            .await
    }

    /// Secondary indexes of the collection; the implicit identifier index is
    /// left out.
    pub async fn indexes(&self) -> Result<IndexInformation> {
        let mut info = self
            .connection
            .store()
            .index_information(self.collection())
            .await?;
        info.remove("_id_");
        Ok(info)
    }
}
