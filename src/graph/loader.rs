//! Schema Loading
//!
//! Loads schema definition files from a directory and saves them through a
//! registry in dependency order, so that every referenced schema exists
//! before the schemas composing it are checked.

use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::Schema;
use crate::store::SchemaStore;

/// Read every `*.json` file below `schema_dir`. A file holds either one
/// schema definition or an array of them.
pub fn load_from_directory(schema_dir: &Path) -> Result<Vec<Schema>> {
    let mut schemas = Vec::new();

    let mut files: Vec<_> = WalkDir::new(schema_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        let content = fs::read_to_string(&path)?;
        let json: serde_json::Value = serde_json::from_str(&content)?;
        match json {
            serde_json::Value::Array(items) => {
                for item in items {
                    schemas.push(serde_json::from_value(item)?);
                }
            }
            other => schemas.push(serde_json::from_value(other)?),
        }
        debug!(file = %path.display(), "read schema definitions");
    }

    Ok(schemas)
}

/// Order schemas so that children come before the schemas that compose
/// them. References to schemas outside the set are left to the registry.
pub fn order_for_save(schemas: Vec<Schema>) -> Result<Vec<Schema>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(schemas.len(), schemas.len() * 2);
    let mut node_indices = HashMap::with_capacity(schemas.len());

    for (i, schema) in schemas.iter().enumerate() {
        if node_indices.insert(schema.key.clone(), graph.add_node(i)).is_some() {
            return Err(SchemaError::Conflict {
                message: format!("Schema key '{}' is defined more than once", schema.key),
                names: vec![schema.key.clone()],
            });
        }
    }

    for schema in &schemas {
        let parent = node_indices[&schema.key];
        for child in schema.children() {
            if let Some(&child_idx) = node_indices.get(&child) {
                graph.add_edge(child_idx, parent, ());
            }
        }
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(_) => {
            let mut names: Vec<String> = kosaraju_scc(&graph)
                .into_iter()
                .filter(|scc| {
                    scc.len() > 1 || graph.contains_edge(scc[0], scc[0])
                })
                .flatten()
                .map(|idx| schemas[graph[idx]].key.clone())
                .collect();
            names.sort();
            return Err(SchemaError::Conflict {
                message: format!("Schema definitions form a cycle: {}", names.join(", ")),
                names,
            });
        }
    };

    let mut slots: Vec<Option<Schema>> = schemas.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|idx| slots[graph[idx]].take())
        .collect())
}

/// Load a directory and save every definition through `registry`.
/// Definitions for keys already stored replace the stored version.
pub fn load_into_registry<S: SchemaStore>(
    schema_dir: &Path,
    registry: &SchemaRegistry<S>,
) -> Result<Vec<Schema>> {
    let ordered = order_for_save(load_from_directory(schema_dir)?)?;

    let mut saved = Vec::with_capacity(ordered.len());
    for mut schema in ordered {
        if let Some(existing) = registry.get_by_key(&schema.key)? {
            schema.id = existing.id;
            schema.version = existing.version;
        }
        saved.push(registry.save(schema)?);
    }

    info!(dir = %schema_dir.display(), count = saved.len(), "loaded schemas");
    Ok(saved)
}
