// SPDX-License-Identifier: MPL-2.0

//! Document loaders: WDM (device model) and WDD (device description), plus
//! the WDMM version gate.

pub mod version;
pub mod wdd;
pub mod wdm;

pub use version::{WdmmVersion, SUPPORTED_WDMM_VERSION};
pub use wdd::{DeviceDescription, DeviceDescriptionLoader};
pub use wdm::DeviceModelLoader;

use crate::model::definitions::{ValueRank, ValueType};
use crate::model::value::{ClassInstantiation, ParameterValue};

/// Converts a JSON document value into a typed parameter value.
pub(crate) fn parse_value(
    value_type: ValueType,
    value_rank: ValueRank,
    json: &serde_json::Value,
) -> Option<ParameterValue> {
    if value_rank == ValueRank::Array {
        let elements = json.as_array()?;
        let parsed: Option<Vec<ParameterValue>> = elements
            .iter()
            .map(|e| parse_value(value_type, ValueRank::Scalar, e))
            .collect();
        return Some(ParameterValue::Array(parsed?));
    }

    match value_type {
        ValueType::Bool => json.as_bool().map(ParameterValue::Bool),
        ValueType::Int8 => json.as_i64().and_then(|v| i8::try_from(v).ok()).map(ParameterValue::Int8),
        ValueType::Int16 => json
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .map(ParameterValue::Int16),
        ValueType::Int32 => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(ParameterValue::Int32),
        ValueType::Int64 => json.as_i64().map(ParameterValue::Int64),
        ValueType::Uint8 => json
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .map(ParameterValue::Uint8),
        ValueType::Uint16 => json
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(ParameterValue::Uint16),
        ValueType::Uint32 => json
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(ParameterValue::Uint32),
        ValueType::Uint64 => json.as_u64().map(ParameterValue::Uint64),
        ValueType::Float => json.as_f64().map(|v| ParameterValue::Float(v as f32)),
        ValueType::Double => json.as_f64().map(ParameterValue::Double),
        ValueType::String | ValueType::Enum | ValueType::FileId => {
            json.as_str().map(|s| ParameterValue::String(s.to_string()))
        }
        ValueType::Bytes => {
            let elements = json.as_array()?;
            let bytes: Option<Vec<u8>> = elements
                .iter()
                .map(|e| e.as_u64().and_then(|v| u8::try_from(v).ok()))
                .collect();
            Some(ParameterValue::Bytes(bytes?))
        }
        ValueType::InstanceIdReference => json
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(ParameterValue::InstanceIdReference),
        ValueType::Instantiations => {
            let instantiations: Vec<ClassInstantiation> =
                serde_json::from_value(json.clone()).ok()?;
            Some(ParameterValue::Instantiations(instantiations))
        }
        ValueType::Method => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_parsing() {
        assert_eq!(
            parse_value(ValueType::String, ValueRank::Scalar, &json!("O")),
            Some(ParameterValue::String("O".into()))
        );
        assert_eq!(
            parse_value(ValueType::Uint32, ValueRank::Scalar, &json!(31)),
            Some(ParameterValue::Uint32(31))
        );
        assert_eq!(
            parse_value(ValueType::Uint8, ValueRank::Scalar, &json!(300)),
            None
        );
    }

    #[test]
    fn test_array_parsing() {
        assert_eq!(
            parse_value(ValueType::Uint8, ValueRank::Array, &json!([1, 2])),
            Some(ParameterValue::Array(vec![
                ParameterValue::Uint8(1),
                ParameterValue::Uint8(2)
            ]))
        );
        assert_eq!(parse_value(ValueType::Uint8, ValueRank::Array, &json!(1)), None);
    }

    #[test]
    fn test_instantiations_parsing() {
        let parsed = parse_value(
            ValueType::Instantiations,
            ValueRank::Scalar,
            &json!([{"ID": 1, "Classes": ["A"]}]),
        )
        .expect("instantiations");
        match parsed {
            ParameterValue::Instantiations(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].id, 1);
                assert_eq!(list[0].classes, vec!["A".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
