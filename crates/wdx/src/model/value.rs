// SPDX-License-Identifier: MPL-2.0

//! Typed parameter values.
//!
//! A value is a tagged variant over the primitive types, arrays thereof,
//! class instantiations, and instance-id references. Values travel between
//! front ends, the dispatcher and providers; JSON is the interchange form
//! used by the WDM/WDD documents.

use serde::{Deserialize, Serialize};

use crate::model::types::InstanceId;

/// One class instantiation as carried by an `instantiations` value.
///
/// Providers report `{id, classes}`; the core re-resolves the collected
/// classes against the live model before exposing the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInstantiation {
    #[serde(rename = "ID")]
    pub id: InstanceId,
    #[serde(rename = "Classes", default)]
    pub classes: Vec<String>,
}

/// A typed parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    /// Also carries enum member names and file ids.
    String(String),
    Bytes(Vec<u8>),
    /// Reference to a class instance by its instance id.
    InstanceIdReference(InstanceId),
    /// The instance set of a class.
    Instantiations(Vec<ClassInstantiation>),
    /// Array-ranked value.
    Array(Vec<ParameterValue>),
}

impl ParameterValue {
    /// Numeric view used for min/max range checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int8(v) => Some(f64::from(*v)),
            ParameterValue::Int16(v) => Some(f64::from(*v)),
            ParameterValue::Int32(v) => Some(f64::from(*v)),
            ParameterValue::Int64(v) => Some(*v as f64),
            ParameterValue::Uint8(v) => Some(f64::from(*v)),
            ParameterValue::Uint16(v) => Some(f64::from(*v)),
            ParameterValue::Uint32(v) => Some(f64::from(*v)),
            ParameterValue::Uint64(v) => Some(*v as f64),
            ParameterValue::Float(v) => Some(f64::from(*v)),
            ParameterValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String view (strings, enum members, file ids).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Instantiations view.
    pub fn instantiations(&self) -> Option<&[ClassInstantiation]> {
        match self {
            ParameterValue::Instantiations(list) => Some(list),
            _ => None,
        }
    }

    /// Serializes into the JSON interchange form.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            ParameterValue::Bool(v) => json!(v),
            ParameterValue::Int8(v) => json!(v),
            ParameterValue::Int16(v) => json!(v),
            ParameterValue::Int32(v) => json!(v),
            ParameterValue::Int64(v) => json!(v),
            ParameterValue::Uint8(v) => json!(v),
            ParameterValue::Uint16(v) => json!(v),
            ParameterValue::Uint32(v) => json!(v),
            ParameterValue::Uint64(v) => json!(v),
            ParameterValue::Float(v) => json!(v),
            ParameterValue::Double(v) => json!(v),
            ParameterValue::String(v) => json!(v),
            ParameterValue::Bytes(v) => {
                Value::Array(v.iter().map(|b| json!(b)).collect())
            }
            ParameterValue::InstanceIdReference(v) => json!(v),
            ParameterValue::Instantiations(v) => {
                serde_json::to_value(v).unwrap_or(Value::Null)
            }
            ParameterValue::Array(v) => {
                Value::Array(v.iter().map(ParameterValue::to_json).collect())
            }
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_view() {
        assert_eq!(ParameterValue::Int32(-7).as_f64(), Some(-7.0));
        assert_eq!(ParameterValue::Uint64(9).as_f64(), Some(9.0));
        assert_eq!(ParameterValue::String("x".into()).as_f64(), None);
    }

    #[test]
    fn test_json_round_shape() {
        let value = ParameterValue::Array(vec![
            ParameterValue::Uint8(1),
            ParameterValue::Uint8(2),
        ]);
        assert_eq!(value.to_json(), serde_json::json!([1, 2]));
    }

    #[test]
    fn test_instantiations_json_shape() {
        let value = ParameterValue::Instantiations(vec![ClassInstantiation {
            id: 3,
            classes: vec!["IoChannel".into()],
        }]);
        assert_eq!(
            value.to_json(),
            serde_json::json!([{"ID": 3, "Classes": ["IoChannel"]}])
        );
    }
}
