//! Dynamic entities
//!
//! A [`DynamicEntity`] is a schema-typed instance built from an untyped
//! JSON map. Every declared property of the schema gets an entry; values
//! are coerced per leaf according to the property kind, and reference
//! properties recurse into nested entities of the related schema.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime};
use serde_json::{Map, Number, Value};

use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::{PropertyKind, ScalarType, Schema};
use crate::store::SchemaStore;

/// Untyped key/value payload
pub type GenericMap = Map<String, Value>;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 3] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

/// A coerced scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Document handle, kept opaque
    Document(Value),
}

/// The value stored for one property
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    /// Property absent or null
    Empty,
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
    Entity(Box<DynamicEntity>),
    EntityList(Vec<DynamicEntity>),
}

impl EntityValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, EntityValue::Empty)
    }
}

/// A schema-typed runtime instance
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicEntity {
    pub schema_key: String,
    pub values: BTreeMap<String, EntityValue>,
}

impl DynamicEntity {
    /// Build an entity from an untyped map. Keys the schema does not
    /// declare are ignored.
    pub fn build<S: SchemaStore>(
        registry: &SchemaRegistry<S>,
        schema: &Schema,
        raw: &GenericMap,
    ) -> Result<Self> {
        let mut values = BTreeMap::new();
        for property in &schema.properties {
            let value = match raw.get(&property.name) {
                None | Some(Value::Null) => EntityValue::Empty,
                Some(value) => coerce(registry, &property.name, &property.kind, value)?,
            };
            values.insert(property.name.clone(), value);
        }

        Ok(Self {
            schema_key: schema.key.clone(),
            values,
        })
    }

    /// Build an entity for the schema with the given key
    pub fn build_for_key<S: SchemaStore>(
        registry: &SchemaRegistry<S>,
        schema_key: &str,
        raw: &GenericMap,
    ) -> Result<Self> {
        let schema = registry.require(schema_key)?;
        Self::build(registry, &schema, raw)
    }

    pub fn get(&self, property: &str) -> Option<&EntityValue> {
        self.values.get(property)
    }

    /// Convert back into an untyped map; empty values become `null`
    pub fn to_generic_map(&self) -> GenericMap {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect()
    }

    /// Apply a partial update, merging nested entities leaf by leaf
    pub fn apply_update<S: SchemaStore>(
        &self,
        registry: &SchemaRegistry<S>,
        update: &GenericMap,
    ) -> Result<Self> {
        let schema = registry.require(&self.schema_key)?;
        let merged = merge_generic_maps(registry, &schema, &self.to_generic_map(), update)?;
        Self::build(registry, &schema, &merged)
    }
}

/// Merge `update` over `base`. Top-level keys are replaced, except that
/// single-reference properties holding objects on both sides merge
/// recursively against the related schema.
pub fn merge_generic_maps<S: SchemaStore>(
    registry: &SchemaRegistry<S>,
    schema: &Schema,
    base: &GenericMap,
    update: &GenericMap,
) -> Result<GenericMap> {
    let mut merged = base.clone();
    for (key, new_value) in update {
        let nested = match (schema.find_property(key), merged.get(key), new_value) {
            (Some(PropertyKind::Reference(target)), Some(Value::Object(old)), Value::Object(new)) => {
                let related = registry.require(target)?;
                Some(merge_generic_maps(registry, &related, old, new)?)
            }
            _ => None,
        };
        let value = match nested {
            Some(map) => Value::Object(map),
            None => new_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    Ok(merged)
}

fn coerce<S: SchemaStore>(
    registry: &SchemaRegistry<S>,
    property: &str,
    kind: &PropertyKind,
    value: &Value,
) -> Result<EntityValue> {
    let value = match kind {
        PropertyKind::Scalar(scalar) => EntityValue::Scalar(coerce_scalar(property, *scalar, value)?),
        PropertyKind::ListOfScalar(scalar) => EntityValue::List(
            elements(value)
                .map(|item| coerce_scalar(property, *scalar, item))
                .collect::<Result<_>>()?,
        ),
        PropertyKind::Reference(target) => {
            let schema = registry.require(target)?;
            EntityValue::Entity(Box::new(nested_entity(registry, &schema, property, value)?))
        }
        PropertyKind::ListOfReference(target) => {
            let schema = registry.require(target)?;
            EntityValue::EntityList(
                elements(value)
                    .map(|item| nested_entity(registry, &schema, property, item))
                    .collect::<Result<_>>()?,
            )
        }
    };
    Ok(value)
}

/// Array items, or the value itself as a single element
fn elements(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Array(items) => Box::new(items.iter()),
        other => Box::new(std::iter::once(other)),
    }
}

fn nested_entity<S: SchemaStore>(
    registry: &SchemaRegistry<S>,
    schema: &Schema,
    property: &str,
    value: &Value,
) -> Result<DynamicEntity> {
    match value {
        Value::Object(map) => DynamicEntity::build(registry, schema, map),
        other => Err(mismatch(property, &format!("Entity<{}>", schema.key), other)),
    }
}

fn mismatch(property: &str, expected: &str, value: &Value) -> SchemaError {
    SchemaError::ProvidedData(format!(
        "Property '{}' expects {}, got {}",
        property, expected, value
    ))
}

fn coerce_scalar(property: &str, scalar: ScalarType, value: &Value) -> Result<ScalarValue> {
    let fail = || mismatch(property, scalar.name(), value);
    let coerced = match (scalar, value) {
        (ScalarType::String, Value::String(s)) => ScalarValue::String(s.clone()),
        (ScalarType::String, Value::Number(n)) => ScalarValue::String(n.to_string()),
        (ScalarType::String, Value::Bool(b)) => ScalarValue::String(b.to_string()),

        (ScalarType::Number, Value::Number(n)) => ScalarValue::Number(n.as_f64().ok_or_else(fail)?),
        (ScalarType::Number, Value::String(s)) => {
            ScalarValue::Number(s.trim().parse::<f64>().map_err(|_| fail())?)
        }

        (ScalarType::Boolean, Value::Bool(b)) => ScalarValue::Boolean(*b),
        (ScalarType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => ScalarValue::Boolean(true),
            "false" => ScalarValue::Boolean(false),
            _ => return Err(fail()),
        },

        (ScalarType::Date, Value::String(s)) => ScalarValue::Date(parse_date(s.trim()).ok_or_else(fail)?),
        (ScalarType::Time, Value::String(s)) => ScalarValue::Time(parse_time(s.trim()).ok_or_else(fail)?),

        (ScalarType::Document, Value::Null) => return Err(fail()),
        (ScalarType::Document, other) => ScalarValue::Document(other.clone()),

        _ => return Err(fail()),
    };
    Ok(coerced)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
}

fn scalar_to_json(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::String(s) => Value::String(s.clone()),
        ScalarValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        ScalarValue::Boolean(b) => Value::Bool(*b),
        ScalarValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        ScalarValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        ScalarValue::Document(doc) => doc.clone(),
    }
}

fn value_to_json(value: &EntityValue) -> Value {
    match value {
        EntityValue::Empty => Value::Null,
        EntityValue::Scalar(scalar) => scalar_to_json(scalar),
        EntityValue::List(items) => Value::Array(items.iter().map(scalar_to_json).collect()),
        EntityValue::Entity(entity) => Value::Object(entity.to_generic_map()),
        EntityValue::EntityList(items) => Value::Array(
            items
                .iter()
                .map(|e| Value::Object(e.to_generic_map()))
                .collect(),
        ),
    }
}
