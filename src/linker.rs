//! Record Linker Validation
//!
//! A record linker maps fields of a separately typed record onto
//! expressions over the transaction's data. Both sides are checked by
//! synthesizing a form tree and running the [`FormValidator`]: source
//! expressions against the transaction schema, target keys against the
//! record schema.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::form::{FormComponent, FormValidator, ValidationError};
use crate::registry::SchemaRegistry;
use crate::store::SchemaStore;

/// Declarative mapping from transaction data onto a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordLinker {
    pub record_definition_key: String,
    pub record_schema_key: String,
    /// Record field -> source expression
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
}

/// Failures of one record linker, split by side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkerErrors {
    pub record_definition_key: String,
    /// Source expressions that do not resolve on the transaction schema
    pub field_value_errors: Vec<ValidationError>,
    /// Mapping keys that do not resolve on the record schema
    pub field_key_errors: Vec<ValidationError>,
}

impl LinkerErrors {
    pub fn is_empty(&self) -> bool {
        self.field_value_errors.is_empty() && self.field_key_errors.is_empty()
    }
}

/// A `data.` reference not preceded by an identifier character; group 1
/// is the dot-path after the prefix
const DATA_PATH_PATTERN: &str = r"(?:^|[^A-Za-z0-9_.])data\.([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)";

fn data_path_regex() -> &'static Regex {
    static DATA_PATH: OnceLock<Regex> = OnceLock::new();
    // DATA_PATH_PATTERN is a fixed literal covered by tests
    DATA_PATH.get_or_init(|| Regex::new(DATA_PATH_PATTERN).expect("data path pattern is valid"))
}

/// Extract every `data.` path referenced by a source expression, in order
/// of appearance. Calls, operators, parentheses and quotes around a
/// reference do not affect the result.
pub fn extract_data_paths(expression: &str) -> Vec<String> {
    data_path_regex()
        .captures_iter(expression)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fold dot-paths into nested input components. Shared prefixes become one
/// component so a path referenced twice is not reported as a duplicate.
pub fn component_tree<'p>(paths: impl IntoIterator<Item = &'p str>) -> FormComponent {
    #[derive(Default)]
    struct Node(BTreeMap<String, Node>);

    fn build(prefix: &str, node: &Node) -> Vec<FormComponent> {
        node.0
            .iter()
            .map(|(segment, child)| {
                let key = if prefix.is_empty() {
                    segment.clone()
                } else {
                    format!("{}.{}", prefix, segment)
                };
                let children = build(&key, child);
                FormComponent::input(key).with_children(children)
            })
            .collect()
    }

    let mut root = Node::default();
    for path in paths {
        let mut node = &mut root;
        for segment in path.split('.') {
            node = node.0.entry(segment.to_string()).or_default();
        }
    }
    FormComponent::container(build("", &root))
}

/// Validates record linkers against transaction and record schemas
pub struct RecordLinkerValidator<'a, S> {
    forms: FormValidator<'a, S>,
}

impl<'a, S: SchemaStore> RecordLinkerValidator<'a, S> {
    pub fn new(registry: &'a SchemaRegistry<S>) -> Self {
        Self {
            forms: FormValidator::new(registry),
        }
    }

    /// Collect the errors of one linker without failing
    pub fn check(&self, transaction_schema_key: &str, linker: &RecordLinker) -> Result<LinkerErrors> {
        if linker.field_mappings.is_empty() {
            return Err(SchemaError::ProvidedData(format!(
                "Record linker '{}' is missing its field mapping",
                linker.record_definition_key
            )));
        }

        let source_paths: Vec<String> = linker
            .field_mappings
            .values()
            .flat_map(|expression| extract_data_paths(expression))
            .collect();
        let value_tree = component_tree(source_paths.iter().map(String::as_str));
        let key_tree = component_tree(linker.field_mappings.keys().map(String::as_str));

        let errors = LinkerErrors {
            record_definition_key: linker.record_definition_key.clone(),
            field_value_errors: self.forms.validate(&value_tree, transaction_schema_key)?,
            field_key_errors: self.forms.validate(&key_tree, &linker.record_schema_key)?,
        };

        debug!(
            record = %linker.record_definition_key,
            value_errors = errors.field_value_errors.len(),
            key_errors = errors.field_key_errors.len(),
            "checked record linker"
        );
        Ok(errors)
    }

    /// Validate one linker, failing with both error lists at once
    pub fn validate(&self, transaction_schema_key: &str, linker: &RecordLinker) -> Result<()> {
        let errors = self.check(transaction_schema_key, linker)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::RecordLinker(errors))
        }
    }
}
