//! Data buffers exchanged between steps.

use crate::sync::Lock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Type tag of a [`DataValue`]; `Any` accepts every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Any,
    Scalar,
    Integer,
    Bool,
    Vector,
    Matrix,
    Text,
}

impl DataType {
    /// Whether data of type `other` may be connected to a slot of this type.
    pub fn accepts(&self, other: DataType) -> bool {
        *self == DataType::Any || *self == other
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Any => "any",
            DataType::Scalar => "scalar",
            DataType::Integer => "integer",
            DataType::Bool => "bool",
            DataType::Vector => "vector",
            DataType::Matrix => "matrix",
            DataType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Contents of a data buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Scalar(f64),
    Integer(i64),
    Bool(bool),
    Vector(Vec<f64>),
    Matrix {
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
    Text(String),
}

impl DataValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::Scalar(_) => DataType::Scalar,
            DataValue::Integer(_) => DataType::Integer,
            DataValue::Bool(_) => DataType::Bool,
            DataValue::Vector(_) => DataType::Vector,
            DataValue::Matrix { .. } => DataType::Matrix,
            DataValue::Text(_) => DataType::Text,
        }
    }

    /// Zero-filled matrix.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        DataValue::Matrix {
            rows,
            cols,
            values: vec![0.0; rows * cols],
        }
    }

    /// Numeric value of scalar-like data (integers and bools included).
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            DataValue::Scalar(v) => Some(*v),
            DataValue::Integer(v) => Some(*v as f64),
            DataValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            DataValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Element values of vectors and matrices (row-major).
    pub fn as_slice(&self) -> Option<&[f64]> {
        match self {
            DataValue::Vector(values) | DataValue::Matrix { values, .. } => Some(values),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Apply `f` to every numeric element, keeping the shape. Non-numeric
    /// data yields `None`.
    pub fn map_numeric(&self, f: impl Fn(f64) -> f64) -> Option<DataValue> {
        match self {
            DataValue::Scalar(v) => Some(DataValue::Scalar(f(*v))),
            DataValue::Integer(v) => Some(DataValue::Scalar(f(*v as f64))),
            DataValue::Vector(values) => Some(DataValue::Vector(values.iter().map(|v| f(*v)).collect())),
            DataValue::Matrix { rows, cols, values } => Some(DataValue::Matrix {
                rows: *rows,
                cols: *cols,
                values: values.iter().map(|v| f(*v)).collect(),
            }),
            DataValue::Bool(_) | DataValue::Text(_) => None,
        }
    }
}

impl Default for DataValue {
    fn default() -> Self {
        DataValue::Scalar(0.0)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Scalar(value)
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Integer(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Bool(value)
    }
}

impl From<Vec<f64>> for DataValue {
    fn from(values: Vec<f64>) -> Self {
        DataValue::Vector(values)
    }
}

/// A lockable data buffer.
pub type Data = Lock<DataValue>;

/// Shared handle to a data buffer; the owning step and all consumers hold
/// clones of it.
pub type DataPtr = Arc<Data>;

pub fn new_data(value: impl Into<DataValue>) -> DataPtr {
    Arc::new(Lock::new(value.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_accepts_everything() {
        for ty in [DataType::Scalar, DataType::Vector, DataType::Text] {
            assert!(DataType::Any.accepts(ty));
        }
        assert!(DataType::Scalar.accepts(DataType::Scalar));
        assert!(!DataType::Scalar.accepts(DataType::Vector));
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(DataValue::Integer(3).as_scalar(), Some(3.0));
        assert_eq!(DataValue::Bool(true).as_scalar(), Some(1.0));
        assert_eq!(DataValue::Text("x".into()).as_scalar(), None);
    }

    #[test]
    fn test_map_numeric_keeps_shape() {
        let m = DataValue::Matrix {
            rows: 1,
            cols: 2,
            values: vec![1.0, 2.0],
        };
        let doubled = m.map_numeric(|v| v * 2.0).unwrap();
        assert_eq!(doubled.as_slice(), Some(&[2.0, 4.0][..]));
        assert_eq!(doubled.data_type(), DataType::Matrix);
        assert!(DataValue::Text("a".into()).map_numeric(|v| v).is_none());
    }

    #[test]
    fn test_shared_data() {
        let data = new_data(1.5);
        let consumer = data.clone();
        *data.write() = DataValue::Scalar(2.5);
        assert_eq!(consumer.read().as_scalar(), Some(2.5));
        assert_eq!(data.id(), consumer.id());
    }
}
