pub mod config;

use crate::core::{DocError, Result};
use crate::model::Model;
use crate::schema::{Schema, SchemaRegistry};
use crate::store::DocumentStore;
use config::ConnectionConfig;
use std::sync::Arc;

/// Mapper connection handle
///
/// Binds a store collaborator, the schema registry and the shared
/// configuration. Cloning is cheap; every clone sees the same registry.
#[derive(Clone)]
pub struct Connection {
    store: Arc<dyn DocumentStore>,
    registry: SchemaRegistry,
    config: Arc<ConnectionConfig>,
}

impl Connection {
    /// Create a connection over `store`, rejecting an invalid `config`
    pub fn new(store: Arc<dyn DocumentStore>, config: ConnectionConfig) -> Result<Self> {
        config.validate().map_err(DocError::Config)?;
        Ok(Self {
            store,
            registry: SchemaRegistry::new(),
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Register `schema` and return its model
    ///
    /// Registering a schema under an existing name replaces the earlier one.
    pub fn register(&self, schema: Schema) -> Result<Model> {
        let schema = self.registry.insert(schema)?;
        Ok(Model::new(schema, self.clone()))
    }

    /// Look up a registered model by schema name
    pub fn model(&self, name: &str) -> Result<Model> {
        let schema = self.registry.get(name)?;
        Ok(Model::new(schema, self.clone()))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("database", &self.config.database)
            .field("schemas", &self.registry.names())
            .finish()
    }
}
