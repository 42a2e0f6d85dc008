//! Schema types and structures
//!
//! A [`Schema`] is a user-defined structural type: a key, an ordered list of
//! declared properties and a list of computed properties. Reference-kind
//! properties point at other schemas by key, which is how schemas compose.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Default pattern a schema key must match
pub const DEFAULT_KEY_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_]{0,63}$";

/// Wire name of the single-reference kind
const ENTITY_TYPE: &str = "Entity";
/// Wire name of the list kinds
const LIST_TYPE: &str = "List";

/// Scalar value types a property can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    String,
    Number,
    Boolean,
    Date,
    Time,
    Document,
}

impl ScalarType {
    pub const ALL: [ScalarType; 6] = [
        ScalarType::String,
        ScalarType::Number,
        ScalarType::Boolean,
        ScalarType::Date,
        ScalarType::Time,
        ScalarType::Document,
    ];

    /// Canonical type name as used in schema definitions
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "String",
            ScalarType::Number => "Number",
            ScalarType::Boolean => "Boolean",
            ScalarType::Date => "Date",
            ScalarType::Time => "Time",
            ScalarType::Document => "Document",
        }
    }

    /// Parse a type name, ignoring ASCII case
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Scalar(ScalarType),
    ListOfScalar(ScalarType),
    /// Nested entity of the schema with this key
    Reference(String),
    /// List of nested entities of the schema with this key
    ListOfReference(String),
}

impl PropertyKind {
    pub fn reference(schema_key: impl Into<String>) -> Self {
        PropertyKind::Reference(schema_key.into())
    }

    pub fn list_of_reference(schema_key: impl Into<String>) -> Self {
        PropertyKind::ListOfReference(schema_key.into())
    }

    /// Key of the related schema for reference kinds
    pub fn target_schema(&self) -> Option<&str> {
        match self {
            PropertyKind::Reference(key) | PropertyKind::ListOfReference(key) => Some(key),
            PropertyKind::Scalar(_) | PropertyKind::ListOfScalar(_) => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.target_schema().is_some()
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            PropertyKind::ListOfScalar(_) | PropertyKind::ListOfReference(_)
        )
    }

    /// Split into the wire `type`, `contentType` and `entitySchema` fields
    fn to_wire(&self) -> (String, Option<String>, Option<String>) {
        match self {
            PropertyKind::Scalar(t) => (t.name().to_string(), None, None),
            PropertyKind::ListOfScalar(t) => {
                (LIST_TYPE.to_string(), Some(t.name().to_string()), None)
            }
            PropertyKind::Reference(key) => (ENTITY_TYPE.to_string(), None, Some(key.clone())),
            PropertyKind::ListOfReference(key) => (
                LIST_TYPE.to_string(),
                Some(ENTITY_TYPE.to_string()),
                Some(key.clone()),
            ),
        }
    }

    /// Rebuild a kind from the wire fields of an attribute
    fn from_wire(
        attribute: &str,
        type_name: &str,
        content_type: Option<&str>,
        entity_schema: Option<&str>,
    ) -> Result<Self, SchemaError> {
        let entity_key = || {
            entity_schema
                .filter(|k| !k.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    SchemaError::ProvidedData(format!(
                        "Attribute '{}' references an entity but has no entitySchema",
                        attribute
                    ))
                })
        };
        let scalar = |name: &str| {
            ScalarType::parse(name).ok_or_else(|| {
                SchemaError::ProvidedData(format!(
                    "Attribute '{}' has unknown type '{}'",
                    attribute, name
                ))
            })
        };

        if type_name.eq_ignore_ascii_case(ENTITY_TYPE) {
            return Ok(PropertyKind::Reference(entity_key()?));
        }
        if type_name.eq_ignore_ascii_case(LIST_TYPE) {
            return match content_type {
                Some(content) if content.eq_ignore_ascii_case(ENTITY_TYPE) => {
                    Ok(PropertyKind::ListOfReference(entity_key()?))
                }
                Some(content) => Ok(PropertyKind::ListOfScalar(scalar(content)?)),
                None => Err(SchemaError::ProvidedData(format!(
                    "List attribute '{}' has no contentType",
                    attribute
                ))),
            };
        }
        Ok(PropertyKind::Scalar(scalar(type_name)?))
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Scalar(t) => write!(f, "{}", t),
            PropertyKind::ListOfScalar(t) => write!(f, "List<{}>", t),
            PropertyKind::Reference(key) => write!(f, "Entity<{}>", key),
            PropertyKind::ListOfReference(key) => write!(f, "List<Entity<{}>>", key),
        }
    }
}

/// A declared property of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    /// Per-property configuration blobs, opaque to the engine
    pub configurations: Vec<serde_json::Value>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            configurations: Vec::new(),
        }
    }
}

/// A derived property; the expression is stored but never evaluated here
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedProperty {
    pub name: String,
    pub kind: PropertyKind,
    pub expression: String,
}

/// A named structural type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDefinition", into = "SchemaDefinition")]
pub struct Schema {
    /// Store-assigned identifier, `None` until first saved
    pub id: Option<u64>,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
    pub computed_properties: Vec<ComputedProperty>,
    /// Optimistic concurrency counter, 0 for a schema never saved
    pub version: u64,
}

impl Schema {
    /// Create an empty schema
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            name: name.into(),
            description: None,
            properties: Vec::new(),
            computed_properties: Vec::new(),
            version: 0,
        }
    }

    /// Builder: append a declared property
    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDescriptor::new(name, kind));
        self
    }

    /// Builder: append a computed property
    pub fn with_computed(
        mut self,
        name: impl Into<String>,
        kind: PropertyKind,
        expression: impl Into<String>,
    ) -> Self {
        self.computed_properties.push(ComputedProperty {
            name: name.into(),
            kind,
            expression: expression.into(),
        });
        self
    }

    /// Look up a declared property by name
    pub fn declared(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up the kind of a declared or computed property
    pub fn find_property(&self, name: &str) -> Option<&PropertyKind> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.kind)
            .or_else(|| {
                self.computed_properties
                    .iter()
                    .find(|p| p.name == name)
                    .map(|p| &p.kind)
            })
    }

    fn all_kinds(&self) -> impl Iterator<Item = (&str, &PropertyKind)> {
        self.properties
            .iter()
            .map(|p| (p.name.as_str(), &p.kind))
            .chain(
                self.computed_properties
                    .iter()
                    .map(|p| (p.name.as_str(), &p.kind)),
            )
    }

    /// (property name, related schema key) pairs in declaration order
    pub fn related_schemas(&self) -> Vec<(&str, &str)> {
        self.all_kinds()
            .filter_map(|(name, kind)| kind.target_schema().map(|target| (name, target)))
            .collect()
    }

    /// Keys of the schemas directly composed into this one
    pub fn children(&self) -> BTreeSet<String> {
        self.all_kinds()
            .filter_map(|(_, kind)| kind.target_schema().map(str::to_string))
            .collect()
    }

    /// Every property name used more than once across declared and
    /// computed properties, each reported once in first-seen order
    pub fn duplicate_property_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();
        for (name, _) in self.all_kinds() {
            if !seen.insert(name) && reported.insert(name) {
                duplicates.push(name.to_string());
            }
        }
        duplicates
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// Schema definition as exchanged with callers and stores
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub computed_attributes: Vec<ComputedAttributeDefinition>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_schema: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_configurations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedAttributeDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_schema: Option<String>,
    #[serde(default)]
    pub expression: String,
}

impl TryFrom<SchemaDefinition> for Schema {
    type Error = SchemaError;

    fn try_from(def: SchemaDefinition) -> Result<Self, Self::Error> {
        let properties = def
            .attributes
            .into_iter()
            .map(|a| {
                let kind = PropertyKind::from_wire(
                    &a.name,
                    &a.type_name,
                    a.content_type.as_deref(),
                    a.entity_schema.as_deref(),
                )?;
                Ok(PropertyDescriptor {
                    name: a.name,
                    kind,
                    configurations: a.attribute_configurations,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let computed_properties = def
            .computed_attributes
            .into_iter()
            .map(|a| {
                let kind = PropertyKind::from_wire(
                    &a.name,
                    &a.type_name,
                    a.content_type.as_deref(),
                    a.entity_schema.as_deref(),
                )?;
                Ok(ComputedProperty {
                    name: a.name,
                    kind,
                    expression: a.expression,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        Ok(Schema {
            id: def.id,
            key: def.key,
            name: def.name,
            description: def.description,
            properties,
            computed_properties,
            version: def.version,
        })
    }
}

impl From<Schema> for SchemaDefinition {
    fn from(schema: Schema) -> Self {
        let attributes = schema
            .properties
            .into_iter()
            .map(|p| {
                let (type_name, content_type, entity_schema) = p.kind.to_wire();
                AttributeDefinition {
                    name: p.name,
                    type_name,
                    content_type,
                    entity_schema,
                    attribute_configurations: p.configurations,
                }
            })
            .collect();
        let computed_attributes = schema
            .computed_properties
            .into_iter()
            .map(|p| {
                let (type_name, content_type, entity_schema) = p.kind.to_wire();
                ComputedAttributeDefinition {
                    name: p.name,
                    type_name,
                    content_type,
                    entity_schema,
                    expression: p.expression,
                }
            })
            .collect();

        SchemaDefinition {
            id: schema.id,
            key: schema.key,
            name: schema.name,
            description: schema.description,
            attributes,
            computed_attributes,
            version: schema.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_definition() {
        let schema: Schema = serde_json::from_value(json!({
            "key": "person",
            "name": "Person",
            "attributes": [
                { "name": "name", "type": "String" },
                { "name": "tags", "type": "List", "contentType": "String" },
                { "name": "address", "type": "Entity", "entitySchema": "Address" },
                { "name": "contacts", "type": "List", "contentType": "Entity", "entitySchema": "Contact" }
            ],
            "computedAttributes": [
                { "name": "displayName", "type": "String", "expression": "name + '!'" }
            ]
        }))
        .unwrap();

        assert_eq!(schema.properties.len(), 4);
        assert_eq!(
            schema.find_property("tags"),
            Some(&PropertyKind::ListOfScalar(ScalarType::String))
        );
        assert_eq!(
            schema.find_property("contacts"),
            Some(&PropertyKind::list_of_reference("Contact"))
        );
        assert_eq!(
            schema.find_property("displayName"),
            Some(&PropertyKind::Scalar(ScalarType::String))
        );
        assert_eq!(
            schema.related_schemas(),
            vec![("address", "Address"), ("contacts", "Contact")]
        );
        assert_eq!(
            schema.children().into_iter().collect::<Vec<_>>(),
            vec!["Address".to_string(), "Contact".to_string()]
        );
    }

    #[test]
    fn test_entity_without_schema_is_rejected() {
        let result: Result<Schema, _> = serde_json::from_value(json!({
            "key": "person",
            "attributes": [{ "name": "address", "type": "Entity" }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<Schema, _> = serde_json::from_value(json!({
            "key": "person",
            "attributes": [{ "name": "age", "type": "Integer" }]
        }));
        assert!(result.unwrap_err().to_string().contains("Integer"));
    }

    #[test]
    fn test_duplicate_names_across_declared_and_computed() {
        let schema = Schema::new("person", "Person")
            .with_property("name", PropertyKind::Scalar(ScalarType::String))
            .with_property("age", PropertyKind::Scalar(ScalarType::Number))
            .with_property("name", PropertyKind::Scalar(ScalarType::String))
            .with_computed("age", PropertyKind::Scalar(ScalarType::Number), "1")
            .with_computed("name", PropertyKind::Scalar(ScalarType::String), "x");

        assert_eq!(schema.duplicate_property_names(), vec!["name", "age"]);
    }

    #[test]
    fn test_definition_serializes_wire_names() {
        let schema = Schema::new("person", "Person")
            .with_property("address", PropertyKind::reference("Address"));
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["attributes"][0]["type"], "Entity");
        assert_eq!(value["attributes"][0]["entitySchema"], "Address");
        assert_eq!(value["computedAttributes"], json!([]));
    }

    #[test]
    fn test_scalar_type_parse_ignores_case() {
        assert_eq!(ScalarType::parse("number"), Some(ScalarType::Number));
        assert_eq!(ScalarType::parse("Entity"), None);
    }
}
