// SPDX-License-Identifier: MPL-2.0

//! The live device model: the normative catalog of features, classes,
//! parameters, enums and methods. Mutable only while the service's param
//! mutex is held (model reloads happen under the lock).

use std::sync::Arc;

use crate::model::definitions::{
    ClassDefinition, EnumDefinition, FeatureDefinition, ParameterDefinition,
};
use crate::model::types::ParameterId;

/// Case-insensitive comparison used for feature and enum names.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// The loaded model.
#[derive(Debug, Default)]
pub struct DeviceModel {
    pub name: String,
    pub features: Vec<Arc<FeatureDefinition>>,
    pub classes: Vec<Arc<ClassDefinition>>,
    pub enums: Vec<Arc<EnumDefinition>>,
    /// All parameter definitions, including class instantiation parameters.
    pub definitions: Vec<Arc<ParameterDefinition>>,
}

impl DeviceModel {
    pub fn new() -> Self {
        DeviceModel::default()
    }

    /// Looks up a parameter definition by numeric id. Id `0` is reserved for
    /// unaddressable instantiation pseudo-parameters and never matches.
    pub fn find_definition(&self, id: ParameterId) -> Option<Arc<ParameterDefinition>> {
        if id == 0 {
            return None;
        }
        self.definitions.iter().find(|d| d.id == id).cloned()
    }

    /// Looks up a class by exact name.
    pub fn find_class_definition(&self, name: &str) -> Option<Arc<ClassDefinition>> {
        self.classes.iter().find(|c| c.name == name).cloned()
    }

    /// Looks up a feature by case-insensitive name.
    pub fn find_feature_definition(&self, name: &str) -> Option<Arc<FeatureDefinition>> {
        self.features
            .iter()
            .find(|f| names_equal(&f.name, name))
            .cloned()
    }

    /// Looks up an enum by case-insensitive name.
    pub fn find_enum_definition(&self, name: &str) -> Option<Arc<EnumDefinition>> {
        self.enums
            .iter()
            .find(|e| names_equal(&e.name, name))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definitions::ValueType;

    #[test]
    fn test_find_definition_skips_id_zero() {
        let mut model = DeviceModel::new();
        model.definitions.push(Arc::new(ParameterDefinition::new(
            0,
            "Unaddressable",
            ValueType::Instantiations,
        )));
        model.definitions.push(Arc::new(ParameterDefinition::new(
            7,
            "Addressable",
            ValueType::String,
        )));
        assert!(model.find_definition(0).is_none());
        assert_eq!(model.find_definition(7).expect("definition").path, "Addressable");
    }

    #[test]
    fn test_feature_lookup_is_case_insensitive() {
        let mut model = DeviceModel::new();
        model.features.push(Arc::new(FeatureDefinition {
            name: "NetworkConfig".into(),
            ..FeatureDefinition::default()
        }));
        assert!(model.find_feature_definition("networkconfig").is_some());
        assert!(model.find_feature_definition("NETWORKCONFIG").is_some());
        assert!(model.find_feature_definition("other").is_none());
    }

    #[test]
    fn test_class_lookup_is_exact() {
        let mut model = DeviceModel::new();
        model.classes.push(Arc::new(ClassDefinition {
            name: "IoChannel".into(),
            ..ClassDefinition::default()
        }));
        assert!(model.find_class_definition("IoChannel").is_some());
        assert!(model.find_class_definition("iochannel").is_none());
    }
}
