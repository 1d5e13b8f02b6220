// SPDX-License-Identifier: MPL-2.0

//! Value validation against definitions.
//!
//! Validation is a pure function over `(value, definition)`. It is applied to
//! fixed values at load time, to client writes before dispatch, to provider
//! read results before integration, and to method in/out arguments.

use log::warn;
use regex::Regex;

use crate::model::definitions::{
    EnumDefinition, MethodArgumentDefinition, Overrideables, ParameterDefinition, ValueRank,
    ValueType,
};
use crate::model::value::ParameterValue;
use crate::status::StatusCode;

/// Validates a value against a parameter definition.
pub fn check_parameter_value(
    value: Option<&ParameterValue>,
    definition: &ParameterDefinition,
) -> StatusCode {
    let Some(value) = value else {
        return StatusCode::InvalidValue;
    };
    check_ranked(
        value,
        definition.value_type,
        definition.value_rank,
        definition.enum_def.as_deref(),
        Some(&definition.overrideables),
    )
}

/// Validates a method argument against its definition.
pub fn check_argument_value(
    value: Option<&ParameterValue>,
    definition: &MethodArgumentDefinition,
) -> StatusCode {
    let Some(value) = value else {
        return StatusCode::InvalidValue;
    };
    check_ranked(
        value,
        definition.value_type,
        definition.value_rank,
        definition.enum_def.as_deref(),
        None,
    )
}

fn check_ranked(
    value: &ParameterValue,
    value_type: ValueType,
    value_rank: ValueRank,
    enum_def: Option<&EnumDefinition>,
    overrideables: Option<&Overrideables>,
) -> StatusCode {
    match value_rank {
        ValueRank::Array => {
            let ParameterValue::Array(elements) = value else {
                return StatusCode::InvalidType;
            };
            for element in elements {
                let status = check_scalar(element, value_type, enum_def, overrideables);
                if status.is_error() {
                    return status;
                }
            }
            StatusCode::Success
        }
        ValueRank::Scalar => {
            if matches!(value, ParameterValue::Array(_)) {
                return StatusCode::InvalidType;
            }
            check_scalar(value, value_type, enum_def, overrideables)
        }
    }
}

fn check_scalar(
    value: &ParameterValue,
    value_type: ValueType,
    enum_def: Option<&EnumDefinition>,
    overrideables: Option<&Overrideables>,
) -> StatusCode {
    if !type_matches(value, value_type) {
        return StatusCode::InvalidType;
    }

    if value_type == ValueType::Enum {
        if let (Some(enum_def), Some(member)) = (enum_def, value.as_str()) {
            if !enum_def.contains_member(member) {
                return StatusCode::ValueNotInAllowedSet;
            }
        }
    }

    let Some(overrideables) = overrideables else {
        return StatusCode::Success;
    };

    if let (Some(pattern), Some(text)) = (overrideables.pattern.as_deref(), value.as_str()) {
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) => {
                if !re.is_match(text) {
                    return StatusCode::PatternMismatch;
                }
            }
            Err(err) => {
                warn!("Unusable pattern '{pattern}' in parameter definition: {err}");
            }
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = overrideables.min {
            if number < min {
                return StatusCode::ValueOutOfRange;
            }
        }
        if let Some(max) = overrideables.max {
            if number > max {
                return StatusCode::ValueOutOfRange;
            }
        }
    }

    if let Some(allowed) = &overrideables.allowed_values {
        if !allowed.whitelist.is_empty() && !allowed.whitelist.contains(value) {
            return StatusCode::ValueNotInAllowedSet;
        }
        if allowed.blacklist.contains(value) {
            return StatusCode::ValueNotInAllowedSet;
        }
    }

    StatusCode::Success
}

fn type_matches(value: &ParameterValue, value_type: ValueType) -> bool {
    match value_type {
        ValueType::Bool => matches!(value, ParameterValue::Bool(_)),
        ValueType::Int8 => matches!(value, ParameterValue::Int8(_)),
        ValueType::Int16 => matches!(value, ParameterValue::Int16(_)),
        ValueType::Int32 => matches!(value, ParameterValue::Int32(_)),
        ValueType::Int64 => matches!(value, ParameterValue::Int64(_)),
        ValueType::Uint8 => matches!(value, ParameterValue::Uint8(_)),
        ValueType::Uint16 => matches!(value, ParameterValue::Uint16(_)),
        ValueType::Uint32 => matches!(value, ParameterValue::Uint32(_)),
        ValueType::Uint64 => matches!(value, ParameterValue::Uint64(_)),
        ValueType::Float => matches!(value, ParameterValue::Float(_)),
        ValueType::Double => matches!(value, ParameterValue::Double(_)),
        ValueType::String => matches!(value, ParameterValue::String(_)),
        ValueType::Bytes => matches!(value, ParameterValue::Bytes(_)),
        ValueType::Enum | ValueType::FileId => matches!(value, ParameterValue::String(_)),
        ValueType::InstanceIdReference => matches!(
            value,
            ParameterValue::InstanceIdReference(_) | ParameterValue::Uint16(_)
        ),
        ValueType::Instantiations => matches!(value, ParameterValue::Instantiations(_)),
        // methods carry no value at all
        ValueType::Method => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definitions::{AllowedValues, EnumMember};
    use std::sync::Arc;

    fn string_def() -> ParameterDefinition {
        ParameterDefinition::new(11, "Param", ValueType::String)
    }

    #[test]
    fn test_type_mismatch() {
        let def = string_def();
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(1)), &def),
            StatusCode::InvalidType
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::String("x".into())), &def),
            StatusCode::Success
        );
    }

    #[test]
    fn test_missing_value_is_invalid() {
        assert_eq!(
            check_parameter_value(None, &string_def()),
            StatusCode::InvalidValue
        );
    }

    #[test]
    fn test_pattern_full_match() {
        let mut def = string_def();
        def.overrideables.pattern = Some("O".into());
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::String("O".into())), &def),
            StatusCode::Success
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::String("OO".into())), &def),
            StatusCode::PatternMismatch
        );
    }

    #[test]
    fn test_range_check() {
        let mut def = ParameterDefinition::new(7, "Limit", ValueType::Uint32);
        def.overrideables.min = Some(10.0);
        def.overrideables.max = Some(20.0);
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(15)), &def),
            StatusCode::Success
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(999)), &def),
            StatusCode::ValueOutOfRange
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(9)), &def),
            StatusCode::ValueOutOfRange
        );
    }

    #[test]
    fn test_whitelist_and_blacklist() {
        let mut def = ParameterDefinition::new(8, "Choice", ValueType::Uint32);
        def.overrideables.allowed_values = Some(AllowedValues {
            whitelist: vec![ParameterValue::Uint32(42), ParameterValue::Uint32(53)],
            blacklist: Vec::new(),
        });
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(42)), &def),
            StatusCode::Success
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(1)), &def),
            StatusCode::ValueNotInAllowedSet
        );

        def.overrideables.allowed_values = Some(AllowedValues {
            whitelist: Vec::new(),
            blacklist: vec![ParameterValue::Uint32(42)],
        });
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(42)), &def),
            StatusCode::ValueNotInAllowedSet
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint32(1)), &def),
            StatusCode::Success
        );
    }

    #[test]
    fn test_enum_membership() {
        let mut def = ParameterDefinition::new(9, "Mode", ValueType::Enum);
        def.enum_def = Some(Arc::new(EnumDefinition {
            name: "Modes".into(),
            members: vec![
                EnumMember {
                    name: "Off".into(),
                    value: 0,
                },
                EnumMember {
                    name: "On".into(),
                    value: 1,
                },
            ],
        }));
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::String("On".into())), &def),
            StatusCode::Success
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::String("Blink".into())), &def),
            StatusCode::ValueNotInAllowedSet
        );
    }

    #[test]
    fn test_array_rank() {
        let mut def = ParameterDefinition::new(10, "List", ValueType::Uint8);
        def.value_rank = ValueRank::Array;
        assert_eq!(
            check_parameter_value(
                Some(&ParameterValue::Array(vec![
                    ParameterValue::Uint8(1),
                    ParameterValue::Uint8(2)
                ])),
                &def
            ),
            StatusCode::Success
        );
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Uint8(1)), &def),
            StatusCode::InvalidType
        );
        assert_eq!(
            check_parameter_value(
                Some(&ParameterValue::Array(vec![ParameterValue::Bool(true)])),
                &def
            ),
            StatusCode::InvalidType
        );
    }

    #[test]
    fn test_methods_have_no_value() {
        let def = ParameterDefinition::new(12, "Restart", ValueType::Method);
        assert_eq!(
            check_parameter_value(Some(&ParameterValue::Bool(true)), &def),
            StatusCode::InvalidType
        );
    }
}
