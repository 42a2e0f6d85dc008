//! Form Configuration Validation
//!
//! Checks a tree of UI component descriptors against the schema graph:
//! every input-bound component must carry a unique key whose last segment
//! names a property of the schema in scope, and only reference properties
//! may have child components. Errors are accumulated in document order.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::{PropertyKind, Schema};
use crate::store::SchemaStore;

/// Control name used for errors about the form as a whole
pub const ROOT_COMPONENT: &str = "ROOT_COMPONENT";

pub const MISSING_KEY: &str = "A component is missing its key";
pub const DUPLICATE_KEY: &str = "Component key is found more than once in the form configuration";
pub const NOT_A_PARENT: &str =
    "component has at least one child component, but is not a parent component in the schema";

/// One node of a form configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormComponent {
    /// Dot-path binding; absent for pure layout nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Whether the component binds to data
    #[serde(default)]
    pub input: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<FormComponent>,
    /// Children form a repeatable template bound to a list property
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub list: bool,
    /// Statically hidden
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// UI expressions, opaque here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressions: Option<serde_json::Value>,
}

impl FormComponent {
    /// An input component bound to `key`
    pub fn input(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            input: true,
            ..Default::default()
        }
    }

    /// A layout-only component
    pub fn container(components: Vec<FormComponent>) -> Self {
        Self {
            components,
            ..Default::default()
        }
    }

    pub fn with_children(mut self, components: Vec<FormComponent>) -> Self {
        self.components = components;
        self
    }

    pub fn as_list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn as_hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    fn is_hidden_list(&self) -> bool {
        self.hidden && self.list
    }
}

/// A complete form configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormConfiguration {
    #[serde(default)]
    pub components: Vec<FormComponent>,
}

impl FormConfiguration {
    /// Synthetic layout root holding the top-level components
    pub fn root(&self) -> FormComponent {
        FormComponent::container(self.components.clone())
    }
}

/// A component-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub control_name: Option<String>,
    #[serde(alias = "errorMessage")]
    pub error_name: String,
}

impl ValidationError {
    pub fn new(control_name: Option<&str>, error_name: impl Into<String>) -> Self {
        Self {
            control_name: control_name.map(str::to_string),
            error_name: error_name.into(),
        }
    }
}

pub(crate) fn schema_not_found_message(key: &str) -> String {
    format!("Schema with key '{}' not found.", key)
}

pub(crate) fn key_not_in_schema_message(key: &str) -> String {
    format!("Component key not found in schema with key '{}'", key)
}

/// Structural validator for form configurations
pub struct FormValidator<'a, S> {
    registry: &'a SchemaRegistry<S>,
    suppress_hidden_list_errors: bool,
}

impl<'a, S: SchemaStore> FormValidator<'a, S> {
    pub fn new(registry: &'a SchemaRegistry<S>) -> Self {
        Self::with_config(registry, &ValidationConfig::default())
    }

    pub fn with_config(registry: &'a SchemaRegistry<S>, config: &ValidationConfig) -> Self {
        Self {
            registry,
            suppress_hidden_list_errors: config.suppress_hidden_list_errors,
        }
    }

    /// Validate the children of `root` against the schema with `root_schema_key`.
    ///
    /// Data-shape problems are returned as errors in the list; `Err` is
    /// reserved for a blank schema key and store failures.
    pub fn validate(&self, root: &FormComponent, root_schema_key: &str) -> Result<Vec<ValidationError>> {
        if root_schema_key.trim().is_empty() {
            return Err(SchemaError::ProvidedData(
                "A root schema key is required to validate a form".to_string(),
            ));
        }

        let Some(schema) = self.registry.get_by_key(root_schema_key)? else {
            return Ok(vec![ValidationError::new(
                Some(ROOT_COMPONENT),
                schema_not_found_message(root_schema_key),
            )]);
        };

        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        self.validate_children(root, &schema, &mut seen, &mut errors)?;

        debug!(schema = root_schema_key, errors = errors.len(), "validated form configuration");
        Ok(errors)
    }

    /// Validate a whole configuration, failing with every error at once
    pub fn validate_form_configuration(&self, config: &FormConfiguration, root_schema_key: &str) -> Result<()> {
        let errors = self.validate(&config.root(), root_schema_key)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::BatchValidation(errors))
        }
    }

    fn validate_children(
        &self,
        component: &FormComponent,
        schema: &Schema,
        seen: &mut HashSet<String>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<()> {
        for child in &component.components {
            if !child.input {
                self.descend(child, schema, seen, errors)?;
                continue;
            }

            let Some(key) = child.key.as_deref().filter(|k| !k.trim().is_empty()) else {
                errors.push(ValidationError::new(None, MISSING_KEY));
                continue;
            };

            if !seen.insert(key.to_string()) {
                errors.push(ValidationError::new(Some(key), DUPLICATE_KEY));
                continue;
            }

            let property = key.rsplit('.').next().unwrap_or(key);
            let Some(kind) = schema.find_property(property) else {
                errors.push(ValidationError::new(Some(key), key_not_in_schema_message(&schema.key)));
                continue;
            };

            if child.components.is_empty() {
                continue;
            }

            match kind {
                PropertyKind::Scalar(_) | PropertyKind::ListOfScalar(_) => {
                    errors.push(ValidationError::new(Some(key), NOT_A_PARENT));
                }
                // A list's children describe the per-item template, so they
                // are checked once against the content schema.
                PropertyKind::Reference(target) | PropertyKind::ListOfReference(target) => {
                    match self.registry.get_by_key(target)? {
                        Some(related) => self.descend(child, &related, seen, errors)?,
                        None => errors.push(ValidationError::new(Some(key), schema_not_found_message(target))),
                    }
                }
            }
        }
        Ok(())
    }

    /// Recurse into `component`, dropping the errors found beneath a
    /// statically hidden list wrapper when configured to
    fn descend(
        &self,
        component: &FormComponent,
        schema: &Schema,
        seen: &mut HashSet<String>,
        errors: &mut Vec<ValidationError>,
    ) -> Result<()> {
        if !(self.suppress_hidden_list_errors && component.is_hidden_list()) {
            return self.validate_children(component, schema, seen, errors);
        }

        let mut suppressed = Vec::new();
        self.validate_children(component, schema, seen, &mut suppressed)?;
        if !suppressed.is_empty() {
            debug!(
                component = component.key.as_deref().unwrap_or("<layout>"),
                suppressed = suppressed.len(),
                "ignoring errors beneath hidden list"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ScalarType;
    use crate::store::MemorySchemaStore;
    use serde_json::json;

    fn registry() -> SchemaRegistry<MemorySchemaStore> {
        let registry = SchemaRegistry::new(MemorySchemaStore::new());
        registry
            .save(Schema::new("Address", "Address").with_property("city", PropertyKind::Scalar(ScalarType::String)))
            .unwrap();
        registry
            .save(Schema::new("person", "Person")
                .with_property("name", PropertyKind::Scalar(ScalarType::String))
                .with_property("tags", PropertyKind::ListOfScalar(ScalarType::String))
                .with_property("address", PropertyKind::reference("Address"))
                .with_property("previous", PropertyKind::list_of_reference("Address"))
                .with_computed("label", PropertyKind::Scalar(ScalarType::String), "name"))
            .unwrap();
        registry
    }

    fn form(components: Vec<FormComponent>) -> FormComponent {
        FormComponent::container(components)
    }

    #[test]
    fn test_valid_nested_form() {
        let registry = registry();
        let validator = FormValidator::new(&registry);
        let root = form(vec![
            FormComponent::input("name"),
            FormComponent::input("label"),
            FormComponent::container(vec![FormComponent::input("tags")]),
            FormComponent::input("address").with_children(vec![FormComponent::input("address.city")]),
            FormComponent::input("previous")
                .as_list()
                .with_children(vec![FormComponent::input("previous.city")]),
        ]);
        assert!(validator.validate(&root, "person").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_root_schema() {
        let registry = registry();
        let errors = FormValidator::new(&registry).validate(&form(vec![]), "ghost").unwrap();
        assert_eq!(
            errors,
            vec![ValidationError::new(Some(ROOT_COMPONENT), "Schema with key 'ghost' not found.")]
        );
    }

    #[test]
    fn test_blank_root_key_is_misuse() {
        let registry = registry();
        assert!(FormValidator::new(&registry).validate(&form(vec![]), " ").is_err());
    }

    #[test]
    fn test_errors_accumulate_in_document_order() {
        let registry = registry();
        let mut keyless = FormComponent::input("x");
        keyless.key = None;
        let root = form(vec![
            FormComponent::input("nickname"),
            keyless,
            FormComponent::input("name").with_children(vec![FormComponent::input("name.first")]),
            FormComponent::input("address").with_children(vec![FormComponent::input("address.zip")]),
        ]);

        let errors = FormValidator::new(&registry).validate(&root, "person").unwrap();
        assert_eq!(
            errors,
            vec![
                ValidationError::new(Some("nickname"), "Component key not found in schema with key 'person'"),
                ValidationError::new(None, MISSING_KEY),
                ValidationError::new(Some("name"), NOT_A_PARENT),
                ValidationError::new(Some("address.zip"), "Component key not found in schema with key 'Address'"),
            ]
        );
    }

    #[test]
    fn test_duplicate_keys_reported_once_per_extra_occurrence() {
        let registry = registry();
        let root = form(vec![
            FormComponent::input("name"),
            FormComponent::container(vec![FormComponent::container(vec![FormComponent::input("name")])]),
            FormComponent::input("name"),
            FormComponent::input("tags"),
        ]);

        let errors = FormValidator::new(&registry).validate(&root, "person").unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.error_name == DUPLICATE_KEY));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let registry = registry();
        let validator = FormValidator::new(&registry);
        let root = form(vec![FormComponent::input("bogus"), FormComponent::input("bogus")]);
        let first = validator.validate(&root, "person").unwrap();
        let second = validator.validate(&root, "person").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_reference_leaf_without_children_is_valid() {
        let registry = registry();
        let root = form(vec![FormComponent::input("address")]);
        assert!(FormValidator::new(&registry).validate(&root, "person").unwrap().is_empty());
    }

    #[test]
    fn test_hidden_list_wrapper_suppresses_template_errors() {
        let registry = registry();
        let root = form(vec![FormComponent::input("previous")
            .as_list()
            .as_hidden()
            .with_children(vec![FormComponent::input("previous.country")])]);

        let validator = FormValidator::new(&registry);
        assert!(validator.validate(&root, "person").unwrap().is_empty());

        let strict = FormValidator::with_config(
            &registry,
            &ValidationConfig {
                suppress_hidden_list_errors: false,
            },
        );
        assert_eq!(strict.validate(&root, "person").unwrap().len(), 1);
    }

    #[test]
    fn test_expression_hidden_component_is_still_validated() {
        let registry = registry();
        let mut component = FormComponent::input("missing");
        component.expressions = Some(json!({ "hide": "data.name == ''" }));
        let errors = FormValidator::new(&registry).validate(&form(vec![component]), "person").unwrap();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_batch_error_carries_every_failure() {
        let registry = registry();
        let config: FormConfiguration = serde_json::from_value(json!({
            "components": [
                { "key": "a", "input": true, "type": "textfield" },
                { "type": "panel", "input": false, "components": [
                    { "key": "b", "input": true, "type": "textfield" }
                ]}
            ]
        }))
        .unwrap();

        let err = FormValidator::new(&registry)
            .validate_form_configuration(&config, "person")
            .unwrap_err();
        match err {
            SchemaError::BatchValidation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("Expected BatchValidation, got {:?}", other),
        }
    }

    #[test]
    fn test_error_payload_shape() {
        let error = ValidationError::new(Some("name"), DUPLICATE_KEY);
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["controlName"], "name");
        assert_eq!(value["errorName"], DUPLICATE_KEY);
    }
}
