use crate::core::{Projection, Result};
use crate::document::Document;
use crate::store::FindQuery;
use serde_json::Value;
use tracing::{Level, event};

use super::Model;

/// Minimal find builder.
///
/// Without an explicit projection the schema's default projection applies.
#[derive(Debug, Clone)]
pub struct Query {
    model: Model,
    selector: Value,
    projection: Option<Projection>,
    limit: Option<usize>,
    skip: Option<usize>,
}

impl Query {
    pub(crate) fn new(model: Model, selector: Value) -> Self {
        let projection = model.schema().default_projection().cloned();
        Self {
            model,
            selector,
            projection,
            limit: None,
            skip: None,
        }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
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

    fn to_find(&self) -> FindQuery {
        FindQuery {
            selector: self.selector.clone(),
            projection: self.projection.as_ref().map(Projection::to_selector),
            limit: self.limit,
            skip: self.skip,
        }
    }

    /// Runs the query and hydrates every record.
    pub async fn all(&self) -> Result<Vec<Document>> {
        let store = self.model.connection().store().clone();
        let records = store
            .find(self.model.collection(), &self.to_find())
            .await?;
        event!(
            Level::DEBUG,
            collection = %self.model.collection(),
            found = records.len(),
            "find"
        );

        let mut docs = Vec::with_capacity(records.len());
        for record in records {
            docs.push(
                self.model
                    .hydrate_document(record, self.projection.as_ref())
                    .await?,
            );
        }
        Ok(docs)
    }

    pub async fn first(self) -> Result<Option<Document>> {
        let docs = self.limit(1).all().await?;
        Ok(docs.into_iter().next())
    }

    pub async fn count(&self) -> Result<u64> {
        self.model
            .connection()
            .store()
            .count(self.model.collection(), &self.selector)
            .await
    }
}
