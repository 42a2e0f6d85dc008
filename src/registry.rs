//! Schema Registry
//!
//! Owns schema reads and writes over a [`SchemaStore`], enforcing the
//! save-time invariants: key pattern, unique property names and an acyclic
//! composition graph.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{Result, SchemaError};
use crate::schema::{Schema, DEFAULT_KEY_PATTERN};
use crate::store::SchemaStore;

/// Schema graph service
pub struct SchemaRegistry<S> {
    store: S,
    key_pattern: Regex,
    /// Serializes the ancestor-check-then-write sequence of `save`
    save_guard: Mutex<()>,
}

impl<S: SchemaStore> SchemaRegistry<S> {
    /// Create a registry with the default key pattern
    pub fn new(store: S) -> Self {
        Self {
            store,
            key_pattern: default_pattern(),
            save_guard: Mutex::new(()),
        }
    }

    /// Create a registry configured from [`RegistryConfig`]
    pub fn with_config(store: S, config: &RegistryConfig) -> Result<Self> {
        let key_pattern = Regex::new(&config.key_pattern).map_err(|e| {
            SchemaError::ProvidedData(format!(
                "Invalid key pattern '{}': {}",
                config.key_pattern, e
            ))
        })?;
        Ok(Self {
            store,
            key_pattern,
            save_guard: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<Schema>> {
        self.store.get_by_key(key)
    }

    /// Fetch a schema, failing with `NotFound` when absent
    pub fn require(&self, key: &str) -> Result<Schema> {
        self.store
            .get_by_key(key)?
            .ok_or_else(|| SchemaError::schema_not_found(key))
    }

    pub fn get_ancestors(&self, key: &str) -> Result<Vec<Schema>> {
        self.store.get_ancestors(key)
    }

    /// Check a key against the configured identifier pattern
    pub fn validate_key(&self, key: &str) -> Result<()> {
        if self.key_pattern.is_match(key) {
            Ok(())
        } else {
            Err(SchemaError::InvalidKey {
                key: key.to_string(),
                pattern: self.key_pattern.as_str().to_string(),
            })
        }
    }

    /// Validate and persist a schema
    pub fn save(&self, schema: Schema) -> Result<Schema> {
        self.validate_key(&schema.key)?;

        let duplicates = schema.duplicate_property_names();
        if !duplicates.is_empty() {
            warn!(schema = %schema.key, ?duplicates, "rejecting schema with duplicate property names");
            return Err(SchemaError::DuplicateProperties(duplicates));
        }

        let _guard = self.save_guard.lock().unwrap_or_else(PoisonError::into_inner);

        self.check_composition(&schema)?;

        let saved = self.store.save(schema)?;
        info!(schema = %saved.key, version = saved.version, "saved schema");
        Ok(saved)
    }

    /// Every child must exist, must not be the schema itself and must not
    /// already contain the schema somewhere beneath it.
    fn check_composition(&self, schema: &Schema) -> Result<()> {
        let children = schema.children();
        if children.is_empty() {
            return Ok(());
        }

        let ancestors: HashSet<String> = self
            .store
            .get_ancestors(&schema.key)?
            .into_iter()
            .map(|s| s.key)
            .collect();

        for child in &children {
            if *child == schema.key {
                return Err(SchemaError::Conflict {
                    message: format!("Schema '{}' cannot be a sub-schema of itself", child),
                    names: vec![child.clone()],
                });
            }

            if self.store.get_by_key(child)?.is_none() {
                return Err(SchemaError::NotFound {
                    kind: "Child schema",
                    key: child.clone(),
                });
            }

            if ancestors.contains(child) {
                return Err(SchemaError::Conflict {
                    message: format!(
                        "Schema '{}' is a parent of '{}', cannot also be its child",
                        child, schema.key
                    ),
                    names: vec![child.clone(), schema.key.clone()],
                });
            }
        }

        debug!(schema = %schema.key, children = children.len(), "composition checks passed");
        Ok(())
    }

    /// Transitive closure of related schemas, grouped under the key of the
    /// schema that references them. Schemas without references are omitted.
    pub fn get_all_related_schemas(&self, root_key: &str) -> Result<BTreeMap<String, Vec<Schema>>> {
        let root = self.require(root_key)?;

        let mut result: BTreeMap<String, Vec<Schema>> = BTreeMap::new();
        let mut expanded = HashSet::new();
        let mut pending = vec![root];

        while let Some(schema) = pending.pop() {
            if !expanded.insert(schema.key.clone()) {
                continue;
            }

            let mut related = Vec::new();
            for (_, target) in schema.related_schemas() {
                if related.iter().any(|s: &Schema| s.key == target) {
                    continue;
                }
                related.push(self.require(target)?);
            }
            if related.is_empty() {
                continue;
            }

            pending.extend(related.iter().rev().cloned());
            result.insert(schema.key.clone(), related);
        }

        debug!(root = root_key, parents = result.len(), "collected related schemas");
        Ok(result)
    }
}

fn default_pattern() -> Regex {
    // DEFAULT_KEY_PATTERN is a fixed literal covered by tests
    Regex::new(DEFAULT_KEY_PATTERN).expect("default key pattern is valid")
}
