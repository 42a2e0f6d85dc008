//! Data Requirement Constraints
//!
//! A transaction-definition set may require that a schema exposes a value
//! of a given type at a dot-separated path. The path walk is fail-fast: the
//! first unresolved segment or type mismatch is returned as the error.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::PropertyKind;
use crate::store::SchemaStore;

/// Identity facts supplied by the surrounding system
pub trait IdentityContext {
    fn current_user_type(&self) -> String;
}

/// A path + expected-type assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequirement {
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// User types this requirement applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_types: Vec<String>,
}

impl DataRequirement {
    pub fn new(path: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            type_name: type_name.into(),
            user_types: Vec::new(),
        }
    }

    pub fn applies_to(&self, user_type: &str) -> bool {
        self.user_types.is_empty() || self.user_types.iter().any(|t| t == user_type)
    }
}

/// Requirements declared by a transaction-definition set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequirementSet {
    #[serde(default)]
    pub requirements: Vec<DataRequirement>,
}

impl DataRequirementSet {
    /// Requirements relevant to the caller's user type
    pub fn applicable<'s>(&'s self, identity: &dyn IdentityContext) -> Vec<&'s DataRequirement> {
        let user_type = identity.current_user_type();
        self.requirements
            .iter()
            .filter(|r| r.applies_to(&user_type))
            .collect()
    }

    /// Check every applicable requirement against `root_key`, stopping at
    /// the first failure
    pub fn validate<S: SchemaStore>(
        &self,
        registry: &SchemaRegistry<S>,
        root_key: &str,
        identity: &dyn IdentityContext,
    ) -> Result<()> {
        let applicable = self.applicable(identity);
        debug!(schema = root_key, requirements = applicable.len(), "checking data requirements");
        for requirement in applicable {
            validate_requirement(registry, root_key, requirement)?;
        }
        Ok(())
    }
}

/// Walk `requirement.path` from the schema with `root_key` and check the
/// type found at its end
pub fn validate_requirement<S: SchemaStore>(
    registry: &SchemaRegistry<S>,
    root_key: &str,
    requirement: &DataRequirement,
) -> Result<()> {
    let mut schema = registry.require(root_key)?;
    let mut segments = requirement.path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let property = schema.declared(segment).ok_or_else(|| SchemaError::NotFound {
            kind: "Property",
            key: format!("{}.{}", schema.key, segment),
        })?;
        let is_last = segments.peek().is_none();

        match &property.kind {
            PropertyKind::Reference(target) | PropertyKind::ListOfReference(target) => {
                let related = registry.require(target)?;
                if is_last {
                    return expect_type(requirement, target);
                }
                schema = related;
            }
            PropertyKind::ListOfScalar(content) => {
                return expect_type(requirement, content.name());
            }
            PropertyKind::Scalar(scalar) => {
                if !is_last {
                    return Err(SchemaError::ConstraintViolation(format!(
                        "path '{}' continues past scalar property '{}'",
                        requirement.path, segment
                    )));
                }
                return expect_type(requirement, scalar.name());
            }
        }
    }

    // split always yields at least one segment
    Err(SchemaError::ConstraintViolation(format!(
        "path '{}' is empty",
        requirement.path
    )))
}

fn expect_type(requirement: &DataRequirement, actual: &str) -> Result<()> {
    if actual.eq_ignore_ascii_case(&requirement.type_name) {
        Ok(())
    } else {
        Err(SchemaError::ConstraintViolation(format!(
            "path '{}' has type '{}', expected '{}'",
            requirement.path, actual, requirement.type_name
        )))
    }
}
