// SPDX-License-Identifier: MPL-2.0

//! Immutable definition records.
//!
//! Definitions are shared behind `Arc` after model load. Per-instance
//! overrides produce a new cloned definition layered over the parent; an
//! instance whose effective overrideables equal the class-resolved ones
//! shares the class's allocation (observable by pointer equality).

use std::sync::Arc;

use crate::model::types::{InstanceId, ParameterId};
use crate::model::value::ParameterValue;

/// Kind of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    String,
    Bytes,
    Enum,
    FileId,
    Method,
    Instantiations,
    InstanceIdReference,
}

impl ValueType {
    /// Parses the WDM spelling.
    pub fn parse(text: &str) -> Option<ValueType> {
        Some(match text {
            "Boolean" => ValueType::Bool,
            "Int8" => ValueType::Int8,
            "Int16" => ValueType::Int16,
            "Int32" => ValueType::Int32,
            "Int64" => ValueType::Int64,
            "Uint8" => ValueType::Uint8,
            "Uint16" => ValueType::Uint16,
            "Uint32" => ValueType::Uint32,
            "Uint64" => ValueType::Uint64,
            "Float" => ValueType::Float,
            "Double" => ValueType::Double,
            "String" => ValueType::String,
            "Bytes" => ValueType::Bytes,
            "Enum" => ValueType::Enum,
            "FileId" => ValueType::FileId,
            "Method" => ValueType::Method,
            "Instantiations" => ValueType::Instantiations,
            "InstanceIdReference" => ValueType::InstanceIdReference,
            _ => return None,
        })
    }
}

/// Scalar or array rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueRank {
    #[default]
    Scalar,
    Array,
}

impl ValueRank {
    pub fn parse(text: &str) -> Option<ValueRank> {
        match text {
            "Scalar" => Some(ValueRank::Scalar),
            "Array" => Some(ValueRank::Array),
            _ => None,
        }
    }
}

/// Allowed-values restriction: either a whitelist or a blacklist.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllowedValues {
    pub whitelist: Vec<ParameterValue>,
    pub blacklist: Vec<ParameterValue>,
}

/// The attributes a class or WDD override may replace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Overrideables {
    pub default_value: Option<ParameterValue>,
    pub pattern: Option<String>,
    pub allowed_values: Option<AllowedValues>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub inactive: bool,
}

/// One override declaration: only the present fields are replaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterOverride {
    pub id: ParameterId,
    pub default_value: Option<ParameterValue>,
    pub pattern: Option<String>,
    pub allowed_values: Option<AllowedValues>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub inactive: Option<bool>,
}

impl ParameterOverride {
    /// Applies the present fields onto `target`.
    pub fn apply_to(&self, target: &mut Overrideables) {
        if let Some(value) = &self.default_value {
            target.default_value = Some(value.clone());
        }
        if let Some(pattern) = &self.pattern {
            target.pattern = Some(pattern.clone());
        }
        if let Some(allowed) = &self.allowed_values {
            target.allowed_values = Some(allowed.clone());
        }
        if let Some(min) = self.min {
            target.min = Some(min);
        }
        if let Some(max) = self.max {
            target.max = Some(max);
        }
        if let Some(inactive) = self.inactive {
            target.inactive = inactive;
        }
    }

    /// True when the override carries the given field.
    pub fn touches(&self, field: OverrideField) -> bool {
        match field {
            OverrideField::DefaultValue => self.default_value.is_some(),
            OverrideField::Pattern => self.pattern.is_some(),
            OverrideField::AllowedValues => self.allowed_values.is_some(),
            OverrideField::Min => self.min.is_some(),
            OverrideField::Max => self.max.is_some(),
            OverrideField::Inactive => self.inactive.is_some(),
        }
    }
}

/// The individually overridable fields; precedence is decided per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideField {
    DefaultValue,
    Pattern,
    AllowedValues,
    Min,
    Max,
    Inactive,
}

impl OverrideField {
    pub const ALL: [OverrideField; 6] = [
        OverrideField::DefaultValue,
        OverrideField::Pattern,
        OverrideField::AllowedValues,
        OverrideField::Min,
        OverrideField::Max,
        OverrideField::Inactive,
    ];
}

/// Member of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

/// Named enumeration definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDefinition {
    pub name: String,
    pub members: Vec<EnumMember>,
}

impl EnumDefinition {
    pub fn contains_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

/// Argument of a method (in or out).
#[derive(Debug, Clone, PartialEq)]
pub struct MethodArgumentDefinition {
    pub name: String,
    pub value_type: ValueType,
    pub value_rank: ValueRank,
    pub enum_def: Option<Arc<EnumDefinition>>,
    pub default_value: Option<ParameterValue>,
}

/// Ordered in/out argument lists of a method parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodSignature {
    pub in_args: Vec<MethodArgumentDefinition>,
    pub out_args: Vec<MethodArgumentDefinition>,
}

/// Definition of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDefinition {
    /// Unique within the model; `0` only for instantiation pseudo-parameters
    /// of classes without a base id (not numerically addressable).
    pub id: ParameterId,
    /// Path fragment below the owning class's base path (or absolute for
    /// feature-owned parameters).
    pub path: String,
    pub value_type: ValueType,
    pub value_rank: ValueRank,
    pub writeable: bool,
    pub is_beta: bool,
    pub is_deprecated: bool,
    pub user_setting: bool,
    pub only_online: bool,
    pub instance_key: bool,
    pub overrideables: Overrideables,
    /// Name of the owning class, if class-owned.
    pub class_name: Option<String>,
    /// Base path of the owning class (cached to compose instance paths
    /// without a model lookup).
    pub class_base_path: Option<String>,
    /// Name of the owning feature, if known.
    pub feature_name: Option<String>,
    /// Enum definition for `Enum`-typed parameters.
    pub enum_def: Option<Arc<EnumDefinition>>,
    /// In/out arguments for `Method`-typed parameters.
    pub method: Option<Arc<MethodSignature>>,
}

impl ParameterDefinition {
    /// A blank definition; loaders fill in the rest.
    pub fn new(id: ParameterId, path: impl Into<String>, value_type: ValueType) -> Self {
        ParameterDefinition {
            id,
            path: path.into(),
            value_type,
            value_rank: ValueRank::Scalar,
            writeable: false,
            is_beta: false,
            is_deprecated: false,
            user_setting: false,
            only_online: false,
            instance_key: false,
            overrideables: Overrideables::default(),
            class_name: None,
            class_base_path: None,
            feature_name: None,
            enum_def: None,
            method: None,
        }
    }
}

/// Definition of a class.
#[derive(Debug, Clone, Default)]
pub struct ClassDefinition {
    pub name: String,
    /// Id of the synthetic instantiations parameter; `0` means none.
    pub base_id: ParameterId,
    pub base_path: String,
    /// Base classes, ordered for override precedence.
    pub includes: Vec<String>,
    pub parameter_definitions: Vec<Arc<ParameterDefinition>>,
    pub overrides: Vec<ParameterOverride>,
    pub is_dynamic: bool,
    pub feature_name: Option<String>,
    // filled by resolution
    /// Transitive include closure, first-occurrence order.
    pub resolved_includes: Vec<String>,
    /// Own + inherited definitions with class-level overrides applied.
    pub resolved_parameter_definitions: Vec<Arc<ParameterDefinition>>,
    /// Synthetic `instantiations` parameter at the class base path.
    pub instantiations_parameter: Option<Arc<ParameterDefinition>>,
    pub is_resolved: bool,
}

impl ClassDefinition {
    /// Builds the synthetic instantiations parameter for the class.
    pub fn build_instantiations_parameter(&mut self) {
        let mut definition =
            ParameterDefinition::new(self.base_id, self.base_path.clone(), ValueType::Instantiations);
        definition.writeable = true;
        definition.class_name = Some(self.name.clone());
        self.instantiations_parameter = Some(Arc::new(definition));
    }

    /// True when `ancestor` is a strict ancestor of this class.
    pub fn has_ancestor(&self, ancestor: &str) -> bool {
        self.resolved_includes.iter().any(|n| n == ancestor)
    }
}

/// Definition of a feature: a named group of classes and parameters.
#[derive(Debug, Clone, Default)]
pub struct FeatureDefinition {
    pub name: String,
    pub includes: Vec<String>,
    pub classes: Vec<String>,
    pub parameter_definitions: Vec<Arc<ParameterDefinition>>,
    pub is_beta: bool,
    pub is_deprecated: bool,
    // filled by resolution
    /// Transitive include closure, first-occurrence order.
    pub resolved_includes: Vec<String>,
    /// Own + class + included-feature definitions, deduplicated by id.
    pub resolved_parameter_definitions: Vec<Arc<ParameterDefinition>>,
}

impl FeatureDefinition {
    /// True when this feature equals `other` or is included by it
    /// (directly or transitively).
    pub fn is_part_of(&self, other: &FeatureDefinition) -> bool {
        crate::model::device_model::names_equal(&self.name, &other.name)
            || other
                .resolved_includes
                .iter()
                .any(|n| crate::model::device_model::names_equal(n, &self.name))
    }
}

/// Bag of resolved classes backing one class instantiation.
#[derive(Debug, Clone, Default)]
pub struct ResolvedClassSet {
    /// All classes in the chain, first-occurrence order (most derived first).
    pub class_names: Vec<String>,
    /// Effective definitions for the chain.
    pub parameter_definitions: Vec<Arc<ParameterDefinition>>,
}

/// A class instantiation as tracked inside the service: the public value
/// plus resolved classes and instance-scoped overrides.
#[derive(Debug, Clone, Default)]
pub struct ClassInstantiationInternal {
    pub id: InstanceId,
    pub classes: Vec<String>,
    pub collected_classes: ResolvedClassSet,
    pub overrides: Vec<ParameterOverride>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_applies_only_present_fields() {
        let mut target = Overrideables {
            default_value: Some(ParameterValue::String("O".into())),
            pattern: Some("O".into()),
            ..Overrideables::default()
        };
        let ov = ParameterOverride {
            id: 11,
            default_value: Some(ParameterValue::String("B".into())),
            ..ParameterOverride::default()
        };
        ov.apply_to(&mut target);
        assert_eq!(
            target.default_value,
            Some(ParameterValue::String("B".into()))
        );
        assert_eq!(target.pattern.as_deref(), Some("O"));
    }

    #[test]
    fn test_value_type_spellings() {
        assert_eq!(ValueType::parse("String"), Some(ValueType::String));
        assert_eq!(ValueType::parse("Boolean"), Some(ValueType::Bool));
        assert_eq!(
            ValueType::parse("Instantiations"),
            Some(ValueType::Instantiations)
        );
        assert_eq!(ValueType::parse("string"), None);
    }

    #[test]
    fn test_instantiations_parameter_shape() {
        let mut class = ClassDefinition {
            name: "IoChannel".into(),
            base_id: 13,
            base_path: "Io/Channels".into(),
            ..ClassDefinition::default()
        };
        class.build_instantiations_parameter();
        let param = class.instantiations_parameter.expect("parameter");
        assert_eq!(param.id, 13);
        assert_eq!(param.path, "Io/Channels");
        assert_eq!(param.value_type, ValueType::Instantiations);
        assert!(param.writeable);
    }
}
