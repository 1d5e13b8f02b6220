// SPDX-License-Identifier: MPL-2.0

//! The data model: identifiers, typed values, immutable definitions, the
//! live device model, multi-inheritance resolution and value validation.

pub mod definitions;
pub mod device_model;
pub mod resolver;
pub mod types;
pub mod validate;
pub mod value;

pub use definitions::{
    AllowedValues, ClassDefinition, ClassInstantiationInternal, EnumDefinition, EnumMember,
    FeatureDefinition, MethodArgumentDefinition, MethodSignature, OverrideField, Overrideables,
    ParameterDefinition, ParameterOverride, ResolvedClassSet, ValueRank, ValueType,
};
pub use device_model::{names_equal, DeviceModel};
pub use types::{
    device_collections, parse_collection_name, parse_device_path, DeviceCollectionId, DeviceId,
    InstanceId, ParameterId, ParameterInstanceId, ParameterInstancePath, SlotIndex,
    DYNAMIC_PLACEHOLDER_INSTANCE_ID, FIRMWARE_VERSION_PARAMETER_ID, ORDER_NUMBER_PARAMETER_ID,
};
pub use validate::{check_argument_value, check_parameter_value};
pub use value::{ClassInstantiation, ParameterValue};
