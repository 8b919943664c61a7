//! Named, typed configuration values of a step.
//!
//! Steps declare their parameters with defaults; the configuration layer reads
//! and writes them through [`StepNode::set_parameter`] and
//! [`StepNode::parameters`].
//!
//! [`StepNode::set_parameter`]: crate::graph::step::StepNode::set_parameter
//! [`StepNode::parameters`]: crate::graph::step::StepNode::parameters

use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A parameter value as stored in graph files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    FloatList(Vec<f64>),
}

/// Kind of a [`ParameterValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Bool,
    Int,
    Float,
    String,
    FloatList,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterKind::Bool => "bool",
            ParameterKind::Int => "integer",
            ParameterKind::Float => "float",
            ParameterKind::String => "string",
            ParameterKind::FloatList => "float list",
        };
        f.write_str(name)
    }
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Bool(_) => ParameterKind::Bool,
            ParameterValue::Int(_) => ParameterKind::Int,
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::String(_) => ParameterKind::String,
            ParameterValue::FloatList(_) => ParameterKind::FloatList,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            ParameterValue::FloatList(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to `kind` where this is lossless (integer to float, integer
    /// lists written as floats are already floats).
    fn coerce(self, kind: ParameterKind) -> Option<ParameterValue> {
        match (self, kind) {
            (ParameterValue::Int(v), ParameterKind::Float) => Some(ParameterValue::Float(v as f64)),
            (value, kind) if value.kind() == kind => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        ParameterValue::Bool(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        ParameterValue::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        ParameterValue::String(v.to_string())
    }
}

impl From<Vec<f64>> for ParameterValue {
    fn from(v: Vec<f64>) -> Self {
        ParameterValue::FloatList(v)
    }
}

/// Declared parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub default: ParameterValue,
    /// Constant parameters cannot change while the step is running.
    pub constant: bool,
}

/// Builder for the parameters of a step.
#[derive(Debug, Default)]
pub struct ParameterDeclarations {
    specs: Vec<ParameterSpec>,
}

impl ParameterDeclarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, default: impl Into<ParameterValue>) -> &mut Self {
        self.specs.push(ParameterSpec {
            name: name.to_string(),
            default: default.into(),
            constant: false,
        });
        self
    }

    pub fn constant(&mut self, name: &str, default: impl Into<ParameterValue>) -> &mut Self {
        self.specs.push(ParameterSpec {
            name: name.to_string(),
            default: default.into(),
            constant: true,
        });
        self
    }
}

/// Current parameter values of a step.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    specs: Vec<ParameterSpec>,
    values: BTreeMap<String, ParameterValue>,
}

impl Parameters {
    pub(crate) fn from_declarations(declarations: ParameterDeclarations) -> Result<Self> {
        let mut values = BTreeMap::new();
        for spec in &declarations.specs {
            if values
                .insert(spec.name.clone(), spec.default.clone())
                .is_some()
            {
                return Err(GraphError::Duplicate(format!("parameter '{}'", spec.name)));
            }
        }
        Ok(Self {
            specs: declarations.specs,
            values,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn values(&self) -> &BTreeMap<String, ParameterValue> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check `value` against the declaration of `name`, converting it to the
    /// declared kind.
    pub fn validate(&self, name: &str, value: ParameterValue, running: bool) -> Result<ParameterValue> {
        let spec = self
            .spec(name)
            .ok_or_else(|| GraphError::UnknownParameter(name.to_string()))?;
        if spec.constant && running {
            return Err(GraphError::ConstantParameter(name.to_string()));
        }
        let expected = spec.default.kind();
        let found = value.kind();
        value.coerce(expected).ok_or_else(|| GraphError::InvalidParameter {
            name: name.to_string(),
            message: format!("expected {}, found {}", expected, found),
        })
    }

    pub(crate) fn store(&mut self, name: &str, value: ParameterValue) {
        self.values.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> Parameters {
        let mut decl = ParameterDeclarations::new();
        decl.add("gain", 1.0).constant("size", 3i64).add("expr", "in");
        Parameters::from_declarations(decl).unwrap()
    }

    #[test]
    fn test_defaults() {
        let params = parameters();
        assert_eq!(params.get("gain"), Some(&ParameterValue::Float(1.0)));
        assert_eq!(params.get("size").and_then(|v| v.as_int()), Some(3));
        assert_eq!(params.get("expr").and_then(|v| v.as_str()), Some("in"));
    }

    #[test]
    fn test_int_widens_to_float() {
        let params = parameters();
        let value = params.validate("gain", ParameterValue::Int(2), false).unwrap();
        assert_eq!(value, ParameterValue::Float(2.0));
    }

    #[test]
    fn test_validate_rejects() {
        let params = parameters();
        assert!(matches!(
            params.validate("missing", 1.0.into(), false),
            Err(GraphError::UnknownParameter(_))
        ));
        assert!(matches!(
            params.validate("gain", "two".into(), false),
            Err(GraphError::InvalidParameter { .. })
        ));
        assert!(matches!(
            params.validate("size", 4i64.into(), true),
            Err(GraphError::ConstantParameter(_))
        ));
        assert!(params.validate("size", 4i64.into(), false).is_ok());
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut decl = ParameterDeclarations::new();
        decl.add("gain", 1.0).add("gain", 2.0);
        assert!(Parameters::from_declarations(decl).is_err());
    }

    #[test]
    fn test_untagged_serde() {
        let value: ParameterValue = serde_json::from_str("2").unwrap();
        assert_eq!(value, ParameterValue::Int(2));
        let value: ParameterValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(value, ParameterValue::Float(2.5));
        let value: ParameterValue = serde_json::from_str("[1.0, 2.0]").unwrap();
        assert_eq!(value, ParameterValue::FloatList(vec![1.0, 2.0]));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(ParameterValue::Bool(true).as_bool(), Some(true));
        assert_eq!(ParameterValue::Int(42).as_int(), Some(42));
        assert_eq!(ParameterValue::Int(42).as_float(), Some(42.0));
        assert_eq!(ParameterValue::String("hello".into()).as_str(), Some("hello"));
    }
}
