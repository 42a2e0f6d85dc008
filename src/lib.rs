//! Casework Schema Engine
//!
//! A runtime type system for case-management data plus a structural
//! validator for the UI form trees and cross-entity mappings bound to it.
//!
//! ## Features
//!
//! - **Dynamic Schemas**: user-defined types with scalar, list and reference properties
//! - **Save-time Invariants**: key pattern, unique property names, acyclic composition
//! - **Dynamic Entities**: schema-typed instances built from untyped JSON maps
//! - **Form Validation**: every input component checked against the schema graph
//! - **Linker & Requirement Checks**: record-linker mappings and data-requirement paths
//!
//! ## Architecture
//!
//! ```text
//! SchemaStore (trait) ──► SchemaRegistry ──► FormValidator ──► RecordLinkerValidator
//!        │                      │
//!  MemorySchemaStore       DynamicEntity          DataRequirementSet
//!        │
//!  CompositionGraph (petgraph)
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod form;
pub mod graph;
pub mod linker;
pub mod registry;
pub mod requirement;
pub mod schema;
pub mod store;

pub use config::EngineConfig;
pub use entity::{DynamicEntity, EntityValue, GenericMap, ScalarValue};
pub use error::{Result, SchemaError};
pub use form::{FormComponent, FormConfiguration, FormValidator, ValidationError};
pub use graph::CompositionGraph;
pub use linker::{LinkerErrors, RecordLinker, RecordLinkerValidator};
pub use registry::SchemaRegistry;
pub use requirement::{DataRequirement, DataRequirementSet, IdentityContext};
pub use schema::{PropertyDescriptor, PropertyKind, ScalarType, Schema, SchemaDefinition};
pub use store::{MemorySchemaStore, SchemaStore};
