use crate::core::{DocError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::Schema;

/// Name-indexed schema registry.
///
/// References between models are declared by name and looked up here at use
/// time, so mutually referencing schemas never own each other.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    schemas: Arc<RwLock<HashMap<String, Arc<Schema>>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, schema: Schema) -> Result<Arc<Schema>> {
        let schema = Arc::new(schema);
        let mut schemas = self.schemas.write()?;
        schemas.insert(schema.name().to_string(), schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Schema>> {
        let schemas = self.schemas.read()?;
        schemas.get(name).cloned().ok_or_else(|| {
            DocError::ReferenceIntegrity(format!("Model '{}' is not registered", name))
        })
    }

    pub fn names(&self) -> Vec<String> {
        match self.schemas.read() {
            Ok(schemas) => {
                let mut names: Vec<String> = schemas.keys().cloned().collect();
                names.sort();
                names
            }
            Err(_) => Vec::new(),
        }
    }
}
