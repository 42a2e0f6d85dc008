//! End-to-end tests over the fixture schemas
//!
//! Loads `tests/fixtures/schemas` into an in-memory registry and exercises
//! form, linker, requirement and entity paths together.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use casework_schemas::form::{DUPLICATE_KEY, MISSING_KEY, NOT_A_PARENT};
use casework_schemas::graph::load_into_registry;
use casework_schemas::{
    DataRequirement, DataRequirementSet, DynamicEntity, FormComponent, FormConfiguration,
    FormValidator, GenericMap, IdentityContext, MemorySchemaStore, PropertyKind, RecordLinker,
    RecordLinkerValidator, Schema, SchemaError, SchemaRegistry, ValidationError,
};
use serde_json::json;

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn registry() -> SchemaRegistry<MemorySchemaStore> {
    let registry = SchemaRegistry::new(MemorySchemaStore::new());
    load_into_registry(&fixtures_path().join("schemas"), &registry).unwrap();
    registry
}

fn form(name: &str) -> FormConfiguration {
    let content = std::fs::read_to_string(fixtures_path().join(name)).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn linker(mappings: &[(&str, &str)]) -> RecordLinker {
    RecordLinker {
        record_definition_key: "licence-record".to_string(),
        record_schema_key: "licence".to_string(),
        field_mappings: mappings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn test_fixtures_load_in_dependency_order() {
    let registry = registry();
    assert_eq!(
        registry.store().keys().unwrap(),
        vec!["Address", "household", "licence", "person"]
    );

    let person = registry.require("person").unwrap();
    assert_eq!(person.computed_properties[0].expression, "name + ' (' + age + ')'");
    assert_eq!(person.declared("passport").unwrap().configurations, vec![json!({ "ocr": true })]);
}

#[test]
fn test_related_schemas_of_household() {
    let registry = registry();
    let related = registry.get_all_related_schemas("household").unwrap();

    let keys: BTreeMap<_, Vec<_>> = related
        .iter()
        .map(|(parent, children)| (parent.as_str(), children.iter().map(|s| s.key.as_str()).collect()))
        .collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys["household"], vec!["person"]);
    assert_eq!(keys["person"], vec!["Address"]);
}

// =============================================================================
// Form validation
// =============================================================================

#[test]
fn test_person_form_is_valid() {
    let registry = registry();
    let validator = FormValidator::new(&registry);
    assert!(validator
        .validate_form_configuration(&form("person_form.json"), "person")
        .is_ok());
}

#[test]
fn test_list_of_reference_template_is_validated_once() {
    let registry = registry();
    let validator = FormValidator::new(&registry);
    let errors = validator.validate(&form("household_form.json").root(), "household").unwrap();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[test]
fn test_broken_form_reports_everything_in_order() {
    let registry = registry();
    let validator = FormValidator::new(&registry);
    let config = form("broken_form.json");

    let expected = vec![
        ValidationError::new(None, MISSING_KEY),
        ValidationError::new(Some("age"), NOT_A_PARENT),
        ValidationError::new(Some("name"), DUPLICATE_KEY),
        ValidationError::new(
            Some("address.street"),
            "Component key not found in schema with key 'Address'",
        ),
    ];

    let first = validator.validate(&config.root(), "person").unwrap();
    let second = validator.validate(&config.root(), "person").unwrap();
    assert_eq!(first, expected);
    assert_eq!(first, second);

    match validator.validate_form_configuration(&config, "person") {
        Err(SchemaError::BatchValidation(errors)) => assert_eq!(errors, expected),
        other => panic!("Expected BatchValidation, got {:?}", other),
    }
}

#[test]
fn test_reference_bound_as_leaf() {
    let registry = registry();
    let validator = FormValidator::new(&registry);

    let nested = FormComponent::container(vec![FormComponent::input("address.city")]);
    let errors = validator.validate(&nested, "person").unwrap();
    assert_eq!(errors.len(), 1, "city is not a property of person itself");

    let wrapped = FormComponent::container(vec![FormComponent::input("address")
        .with_children(vec![FormComponent::input("address.city")])]);
    assert!(validator.validate(&wrapped, "person").unwrap().is_empty());

    let leaf = FormComponent::container(vec![FormComponent::input("address")]);
    assert!(validator.validate(&leaf, "person").unwrap().is_empty());

    let layout = FormComponent::container(vec![FormComponent::container(vec![])]);
    assert!(validator.validate(&layout, "person").unwrap().is_empty());
}

#[test]
fn test_concurrent_validations_agree() {
    let registry = Arc::new(registry());
    let config = Arc::new(form("broken_form.json"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let config = Arc::clone(&config);
            thread::spawn(move || {
                FormValidator::new(&registry)
                    .validate(&config.root(), "person")
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].len(), 4);
}

// =============================================================================
// Record linker
// =============================================================================

#[test]
fn test_valid_linker() {
    let registry = registry();
    let validator = RecordLinkerValidator::new(&registry);
    let linker = linker(&[
        ("holderName", "concat(upper(data.name), ' ', data.displayName)"),
        ("holderCity", "data.address.city"),
    ]);
    assert!(validator.validate("person", &linker).is_ok());
}

#[test]
fn test_unknown_source_path_is_field_value_error() {
    let registry = registry();
    let validator = RecordLinkerValidator::new(&registry);
    let linker = linker(&[("targetField", "data.sourcePath"), ("holderName", "data.name")]);

    match validator.validate("person", &linker) {
        Err(SchemaError::RecordLinker(errors)) => {
            assert_eq!(errors.record_definition_key, "licence-record");
            assert_eq!(
                errors.field_value_errors,
                vec![ValidationError::new(
                    Some("sourcePath"),
                    "Component key not found in schema with key 'person'"
                )]
            );
            assert_eq!(
                errors.field_key_errors,
                vec![ValidationError::new(
                    Some("targetField"),
                    "Component key not found in schema with key 'licence'"
                )]
            );
        }
        other => panic!("Expected RecordLinker error, got {:?}", other),
    }
}

#[test]
fn test_linker_without_mappings_is_provided_data_error() {
    let registry = registry();
    let err = RecordLinkerValidator::new(&registry)
        .validate("person", &linker(&[]))
        .unwrap_err();
    assert!(matches!(err, SchemaError::ProvidedData(_)));
}

// =============================================================================
// Data requirements
// =============================================================================

struct Caseworker;

impl IdentityContext for Caseworker {
    fn current_user_type(&self) -> String {
        "caseworker".to_string()
    }
}

#[test]
fn test_requirement_set_from_json() {
    let registry = registry();
    let set: DataRequirementSet = serde_json::from_value(json!({
        "requirements": [
            { "path": "members.address.city", "type": "String" },
            { "path": "members.age", "type": "Number", "userTypes": ["caseworker"] },
            { "path": "since", "type": "Boolean", "userTypes": ["citizen"] }
        ]
    }))
    .unwrap();

    assert!(set.validate(&registry, "household", &Caseworker).is_ok());

    let failing = DataRequirementSet {
        requirements: vec![
            DataRequirement::new("members.address.street", "String"),
            DataRequirement::new("since", "Number"),
        ],
    };
    let err = failing.validate(&registry, "household", &Caseworker).unwrap_err();
    assert!(matches!(err, SchemaError::NotFound { .. }), "fails fast on the first requirement");
}

// =============================================================================
// Schema save invariants
// =============================================================================

#[test]
fn test_cycle_through_fixtures_is_rejected() {
    let registry = registry();
    let address = registry
        .require("Address")
        .unwrap()
        .with_property("household", PropertyKind::reference("household"));

    let err = registry.save(address).unwrap_err();
    assert!(matches!(err, SchemaError::Conflict { .. }));
    assert!(registry.require("Address").unwrap().declared("household").is_none());
}

#[test]
fn test_new_schema_composing_fixtures_is_saved() {
    let registry = registry();
    let case = Schema::new("case_file", "Case file")
        .with_property("household", PropertyKind::reference("household"))
        .with_property("licences", PropertyKind::list_of_reference("licence"));
    let saved = registry.save(case).unwrap();
    assert_eq!(saved.version, 1);

    let ancestors: Vec<_> = registry
        .get_ancestors("Address")
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect();
    assert!(ancestors.contains(&"case_file".to_string()));
}

// =============================================================================
// Dynamic entities
// =============================================================================

#[test]
fn test_household_entity_roundtrip() {
    let registry = registry();
    let raw: GenericMap = serde_json::from_value(json!({
        "since": "2024-02-29",
        "members": [
            { "name": "Ada", "age": 36, "address": { "city": "London" } },
            { "name": "Charles", "passport": { "documentId": "p-9" } }
        ]
    }))
    .unwrap();

    let entity = DynamicEntity::build_for_key(&registry, "household", &raw).unwrap();
    let rebuilt = DynamicEntity::build_for_key(&registry, "household", &entity.to_generic_map()).unwrap();
    assert_eq!(entity, rebuilt);

    let map = entity.to_generic_map();
    assert_eq!(map["members"][1]["address"], serde_json::Value::Null);
    assert_eq!(map["members"][1]["passport"], json!({ "documentId": "p-9" }));
}
