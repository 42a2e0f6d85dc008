//! Schema storage boundary
//!
//! Persistence is an external collaborator; the engine only needs the three
//! calls on [`SchemaStore`]. [`MemorySchemaStore`] backs tests, the CLI and
//! embedders that keep schemas in process.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{Result, SchemaError};
use crate::graph::CompositionGraph;
use crate::schema::Schema;

/// Storage operations consumed by the registry
pub trait SchemaStore: Send + Sync {
    /// Fetch a schema by key
    fn get_by_key(&self, key: &str) -> Result<Option<Schema>>;

    /// Schemas that transitively reference `key` as a child
    fn get_ancestors(&self, key: &str) -> Result<Vec<Schema>>;

    /// Persist a schema, returning the stored copy
    fn save(&self, schema: Schema) -> Result<Schema>;
}

#[derive(Debug, Default)]
struct StoreState {
    schemas: HashMap<String, Schema>,
    graph: CompositionGraph,
    next_id: u64,
}

/// In-process store with optimistic version checks
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    state: RwLock<StoreState>,
}

fn poisoned<T>(_: PoisonError<T>) -> SchemaError {
    SchemaError::Store("schema store lock poisoned".to_string())
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.schemas.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All stored keys, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poisoned)?;
        let mut keys: Vec<_> = state.schemas.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl SchemaStore for MemorySchemaStore {
    fn get_by_key(&self, key: &str) -> Result<Option<Schema>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.schemas.get(key).cloned())
    }

    fn get_ancestors(&self, key: &str) -> Result<Vec<Schema>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .graph
            .ancestors(key)
            .iter()
            .filter_map(|k| state.schemas.get(k).cloned())
            .collect())
    }

    fn save(&self, mut schema: Schema) -> Result<Schema> {
        let mut state = self.state.write().map_err(poisoned)?;

        let current_version = state.schemas.get(&schema.key).map(|s| s.version);
        match current_version {
            Some(version) if version != schema.version => {
                return Err(SchemaError::Conflict {
                    message: format!(
                        "Schema '{}' was modified concurrently (expected version {}, found {})",
                        schema.key, schema.version, version
                    ),
                    names: vec![schema.key],
                });
            }
            None if schema.version != 0 => {
                return Err(SchemaError::Conflict {
                    message: format!(
                        "Schema '{}' does not exist at version {}",
                        schema.key, schema.version
                    ),
                    names: vec![schema.key],
                });
            }
            _ => {}
        }

        if schema.id.is_none() {
            state.next_id += 1;
            schema.id = Some(state.next_id);
        }
        schema.version += 1;

        let children = schema.children();
        state
            .graph
            .set_children(&schema.key, children.iter().map(String::as_str));
        state.schemas.insert(schema.key.clone(), schema.clone());

        Ok(schema)
    }
}
