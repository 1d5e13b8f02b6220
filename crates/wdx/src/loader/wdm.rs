// SPDX-License-Identifier: MPL-2.0

//! WDM (device model) loader.
//!
//! Parses the JSON model document and merges it into the live
//! [`DeviceModel`]: features, classes (with includes and overrides),
//! parameters, enums and methods. Loading is additive; definitions already
//! known by name/id are kept, so model text may arrive incrementally from
//! several providers. After each load the class and feature closures are
//! re-resolved.

use serde::Deserialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::loader::parse_value;
use crate::loader::version::WdmmVersion;
use crate::model::definitions::{
    AllowedValues, ClassDefinition, EnumDefinition, EnumMember, FeatureDefinition,
    MethodArgumentDefinition, MethodSignature, ParameterDefinition, ParameterOverride, ValueRank,
    ValueType,
};
use crate::model::device_model::DeviceModel;
use crate::model::resolver::{resolve_model_classes, resolve_model_features};
use crate::model::validate::check_parameter_value;

#[derive(Debug, Deserialize)]
struct WdmDocument {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "WDMMVersion", default)]
    wdmm_version: String,
    #[serde(rename = "Features", default)]
    features: Vec<WdmFeature>,
    #[serde(rename = "Classes", default)]
    classes: Vec<WdmClass>,
    #[serde(rename = "Enums", default)]
    enums: Vec<WdmEnum>,
}

#[derive(Debug, Deserialize)]
struct WdmFeature {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Includes", default)]
    includes: Vec<String>,
    #[serde(rename = "Classes", default)]
    classes: Vec<String>,
    #[serde(rename = "Parameters", default)]
    parameters: Vec<WdmParameter>,
    #[serde(rename = "Beta", default)]
    beta: bool,
    #[serde(rename = "Deprecated", default)]
    deprecated: bool,
}

#[derive(Debug, Deserialize)]
struct WdmClass {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "BaseID", default)]
    base_id: u32,
    #[serde(rename = "BasePath", default)]
    base_path: String,
    #[serde(rename = "Includes", default)]
    includes: Vec<String>,
    #[serde(rename = "Parameters", default)]
    parameters: Vec<WdmParameter>,
    #[serde(rename = "Overrides", default)]
    overrides: Vec<WdmOverride>,
    #[serde(rename = "Dynamic", default)]
    dynamic: bool,
}

#[derive(Debug, Deserialize)]
struct WdmParameter {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "Type")]
    value_type: String,
    #[serde(rename = "Rank", default)]
    rank: Option<String>,
    #[serde(rename = "Writeable", default)]
    writeable: Option<bool>,
    #[serde(rename = "Beta", default)]
    beta: bool,
    #[serde(rename = "Deprecated", default)]
    deprecated: bool,
    #[serde(rename = "UserSetting", default)]
    user_setting: bool,
    #[serde(rename = "OnlyOnline", default)]
    only_online: bool,
    #[serde(rename = "InstanceKey", default)]
    instance_key: bool,
    #[serde(rename = "Enum", default)]
    enum_name: Option<String>,
    #[serde(rename = "DefaultValue", default)]
    default_value: Option<serde_json::Value>,
    #[serde(rename = "Pattern", default)]
    pattern: Option<String>,
    #[serde(rename = "AllowedValues", default)]
    allowed_values: Option<WdmAllowedValues>,
    #[serde(rename = "Min", default)]
    min: Option<f64>,
    #[serde(rename = "Max", default)]
    max: Option<f64>,
    #[serde(rename = "Inactive", default)]
    inactive: Option<bool>,
    #[serde(rename = "InArgs", default)]
    in_args: Vec<WdmMethodArgument>,
    #[serde(rename = "OutArgs", default)]
    out_args: Vec<WdmMethodArgument>,
}

#[derive(Debug, Deserialize)]
struct WdmMethodArgument {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    value_type: String,
    #[serde(rename = "Rank", default)]
    rank: Option<String>,
    #[serde(rename = "Enum", default)]
    enum_name: Option<String>,
    #[serde(rename = "DefaultValue", default)]
    default_value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WdmAllowedValues {
    #[serde(rename = "List", default)]
    list: Vec<serde_json::Value>,
    #[serde(rename = "Not", default)]
    not: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WdmOverride {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "DefaultValue", default)]
    default_value: Option<serde_json::Value>,
    #[serde(rename = "Pattern", default)]
    pattern: Option<String>,
    #[serde(rename = "AllowedValues", default)]
    allowed_values: Option<WdmAllowedValues>,
    #[serde(rename = "Min", default)]
    min: Option<f64>,
    #[serde(rename = "Max", default)]
    max: Option<f64>,
    #[serde(rename = "Inactive", default)]
    inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WdmEnum {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Members", default)]
    members: Vec<WdmEnumMember>,
}

#[derive(Debug, Deserialize)]
struct WdmEnumMember {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: i64,
}

/// Loads WDM documents into a [`DeviceModel`].
pub struct DeviceModelLoader;

impl DeviceModelLoader {
    /// Parses `wdm_content` and merges it into `model`.
    pub fn load(wdm_content: &str, model: &mut DeviceModel) -> Result<()> {
        let document: WdmDocument = serde_json::from_str(wdm_content)
            .map_err(|err| Error::ModelFormat(err.to_string()))?;

        if !document.wdmm_version.is_empty() {
            WdmmVersion::parse_supported(&document.wdmm_version)?;
        }
        if model.name.is_empty() {
            model.name = document.name.clone();
        }

        for raw in &document.enums {
            if model.find_enum_definition(&raw.id).is_none() {
                model.enums.push(Arc::new(EnumDefinition {
                    name: raw.id.clone(),
                    members: raw
                        .members
                        .iter()
                        .map(|m| EnumMember {
                            name: m.name.clone(),
                            value: m.value,
                        })
                        .collect(),
                }));
            }
        }

        for raw in &document.classes {
            if model.find_class_definition(&raw.id).is_some() {
                continue;
            }
            let class = Self::build_class(raw, model)?;
            model.classes.push(Arc::new(class));
        }

        for raw in &document.features {
            if model.find_feature_definition(&raw.id).is_some() {
                continue;
            }
            let feature = Self::build_feature(raw, model)?;
            model.features.push(Arc::new(feature));
        }

        Self::attribute_classes_to_features(model);
        resolve_model_classes(model);
        resolve_model_features(model);
        Self::check_fixed_defaults(model);
        Ok(())
    }

    fn build_class(raw: &WdmClass, model: &DeviceModel) -> Result<ClassDefinition> {
        let mut class = ClassDefinition {
            name: raw.id.clone(),
            base_id: raw.base_id,
            base_path: raw.base_path.clone(),
            includes: raw.includes.clone(),
            is_dynamic: raw.dynamic,
            ..ClassDefinition::default()
        };
        for parameter in &raw.parameters {
            let definition = Self::build_parameter(
                parameter,
                model,
                None,
                Some((&class.name, &class.base_path)),
            )?;
            class.parameter_definitions.push(Arc::new(definition));
        }
        let mut parsed_overrides = Vec::with_capacity(raw.overrides.len());
        for raw_override in &raw.overrides {
            parsed_overrides.push(Self::build_override(raw_override, model, &class)?);
        }
        class.overrides = parsed_overrides;
        class.build_instantiations_parameter();
        Ok(class)
    }

    fn build_feature(raw: &WdmFeature, model: &DeviceModel) -> Result<FeatureDefinition> {
        let mut feature = FeatureDefinition {
            name: raw.id.clone(),
            includes: raw.includes.clone(),
            classes: raw.classes.clone(),
            is_beta: raw.beta,
            is_deprecated: raw.deprecated,
            ..FeatureDefinition::default()
        };
        for parameter in &raw.parameters {
            let definition =
                Self::build_parameter(parameter, model, Some(&feature.name), None)?;
            feature.parameter_definitions.push(Arc::new(definition));
        }
        Ok(feature)
    }

    fn build_parameter(
        raw: &WdmParameter,
        model: &DeviceModel,
        feature_name: Option<&str>,
        class_context: Option<(&str, &str)>,
    ) -> Result<ParameterDefinition> {
        let value_type = ValueType::parse(&raw.value_type).ok_or_else(|| {
            Error::ModelFormat(format!(
                "parameter {} has unknown type '{}'",
                raw.id, raw.value_type
            ))
        })?;
        let value_rank = match &raw.rank {
            Some(rank_text) => ValueRank::parse(rank_text).ok_or_else(|| {
                Error::ModelFormat(format!(
                    "parameter {} has unknown rank '{rank_text}'",
                    raw.id
                ))
            })?,
            None => ValueRank::Scalar,
        };

        let mut definition = ParameterDefinition::new(raw.id, raw.path.clone(), value_type);
        definition.value_rank = value_rank;
        // parameters are writeable unless the model says otherwise
        definition.writeable = raw.writeable.unwrap_or(true);
        definition.is_beta = raw.beta;
        definition.is_deprecated = raw.deprecated;
        definition.user_setting = raw.user_setting;
        definition.only_online = raw.only_online;
        definition.instance_key = raw.instance_key;
        definition.feature_name = feature_name.map(str::to_string);
        if let Some((class_name, class_base_path)) = class_context {
            definition.class_name = Some(class_name.to_string());
            definition.class_base_path = Some(class_base_path.to_string());
        }
        if let Some(enum_name) = &raw.enum_name {
            definition.enum_def = model.find_enum_definition(enum_name);
        }

        definition.overrideables.pattern = raw.pattern.clone();
        definition.overrideables.min = raw.min;
        definition.overrideables.max = raw.max;
        definition.overrideables.inactive = raw.inactive.unwrap_or(false);
        if let Some(allowed) = &raw.allowed_values {
            definition.overrideables.allowed_values =
                Some(Self::build_allowed_values(allowed, value_type)?);
        }
        if let Some(default) = &raw.default_value {
            definition.overrideables.default_value = parse_value(value_type, value_rank, default);
            if definition.overrideables.default_value.is_none() {
                return Err(Error::ModelFormat(format!(
                    "parameter {} has a default value not matching its type",
                    raw.id
                )));
            }
        }

        if value_type == ValueType::Method {
            definition.method = Some(Arc::new(MethodSignature {
                in_args: Self::build_arguments(&raw.in_args, model)?,
                out_args: Self::build_arguments(&raw.out_args, model)?,
            }));
        }
        Ok(definition)
    }

    fn build_arguments(
        raw_args: &[WdmMethodArgument],
        model: &DeviceModel,
    ) -> Result<Vec<MethodArgumentDefinition>> {
        let mut arguments = Vec::with_capacity(raw_args.len());
        for raw in raw_args {
            let value_type = ValueType::parse(&raw.value_type).ok_or_else(|| {
                Error::ModelFormat(format!(
                    "method argument '{}' has unknown type '{}'",
                    raw.name, raw.value_type
                ))
            })?;
            let value_rank = match &raw.rank {
                Some(rank_text) => ValueRank::parse(rank_text).ok_or_else(|| {
                    Error::ModelFormat(format!(
                        "method argument '{}' has unknown rank '{rank_text}'",
                        raw.name
                    ))
                })?,
                None => ValueRank::Scalar,
            };
            let default_value = raw
                .default_value
                .as_ref()
                .and_then(|v| parse_value(value_type, value_rank, v));
            arguments.push(MethodArgumentDefinition {
                name: raw.name.clone(),
                value_type,
                value_rank,
                enum_def: raw
                    .enum_name
                    .as_ref()
                    .and_then(|n| model.find_enum_definition(n)),
                default_value,
            });
        }
        Ok(arguments)
    }

    fn build_override(
        raw: &WdmOverride,
        model: &DeviceModel,
        class: &ClassDefinition,
    ) -> Result<ParameterOverride> {
        // the overridden definition may live in a base class parsed earlier
        // or in this very class; its type drives the value parsing
        let target_type = class
            .parameter_definitions
            .iter()
            .find(|d| d.id == raw.id)
            .map(|d| (d.value_type, d.value_rank))
            .or_else(|| {
                model
                    .classes
                    .iter()
                    .flat_map(|c| c.parameter_definitions.iter())
                    .find(|d| d.id == raw.id)
                    .map(|d| (d.value_type, d.value_rank))
            })
            .or_else(|| {
                model
                    .find_definition(raw.id)
                    .map(|d| (d.value_type, d.value_rank))
            });

        let default_value = match (&raw.default_value, target_type) {
            (Some(json), Some((value_type, value_rank))) => {
                parse_value(value_type, value_rank, json)
            }
            (Some(json), None) => {
                // target unknown (yet); keep the raw string form if any
                json.as_str().map(|s| crate::model::value::ParameterValue::String(s.into()))
            }
            (None, _) => None,
        };

        let allowed_values = match (&raw.allowed_values, target_type) {
            (Some(allowed), Some((value_type, _))) => {
                Some(Self::build_allowed_values(allowed, value_type)?)
            }
            (Some(allowed), None) => Some(Self::build_allowed_values(
                allowed,
                ValueType::String,
            )?),
            (None, _) => None,
        };

        Ok(ParameterOverride {
            id: raw.id,
            default_value,
            pattern: raw.pattern.clone(),
            allowed_values,
            min: raw.min,
            max: raw.max,
            inactive: raw.inactive,
        })
    }

    fn build_allowed_values(
        raw: &WdmAllowedValues,
        value_type: ValueType,
    ) -> Result<AllowedValues> {
        let parse_list = |values: &[serde_json::Value]| -> Result<Vec<_>> {
            values
                .iter()
                .map(|v| {
                    parse_value(value_type, ValueRank::Scalar, v).ok_or_else(|| {
                        Error::ModelFormat("allowed value not matching parameter type".into())
                    })
                })
                .collect()
        };
        Ok(AllowedValues {
            whitelist: parse_list(&raw.list)?,
            blacklist: parse_list(&raw.not)?,
        })
    }

    /// Stamps each class (and its parameters) with the first feature listing
    /// it.
    fn attribute_classes_to_features(model: &mut DeviceModel) {
        let mut updated_classes = Vec::with_capacity(model.classes.len());
        for class in &model.classes {
            if class.feature_name.is_some() {
                updated_classes.push(Arc::clone(class));
                continue;
            }
            let owner = model
                .features
                .iter()
                .find(|f| f.classes.iter().any(|c| c == &class.name))
                .map(|f| f.name.clone());
            match owner {
                Some(feature_name) => {
                    let mut cloned = (**class).clone();
                    cloned.feature_name = Some(feature_name.clone());
                    cloned.parameter_definitions = cloned
                        .parameter_definitions
                        .iter()
                        .map(|d| {
                            let mut def = (**d).clone();
                            def.feature_name = Some(feature_name.clone());
                            Arc::new(def)
                        })
                        .collect();
                    updated_classes.push(Arc::new(cloned));
                }
                None => updated_classes.push(Arc::clone(class)),
            }
        }
        model.classes = updated_classes;

        // rebuild the flat definitions catalog from features and classes
        let mut definitions = Vec::new();
        for feature in &model.features {
            for definition in &feature.parameter_definitions {
                definitions.push(Arc::clone(definition));
            }
        }
        for class in &model.classes {
            for definition in &class.parameter_definitions {
                definitions.push(Arc::clone(definition));
            }
        }
        model.definitions = definitions;
    }

    /// Every fixed default must satisfy its own definition.
    fn check_fixed_defaults(model: &DeviceModel) {
        for definition in &model.definitions {
            if let Some(default) = &definition.overrideables.default_value {
                let status = check_parameter_value(Some(default), definition);
                if status.is_error() {
                    log::warn!(
                        "Default value of parameter {} ({}) does not satisfy its definition: {status}",
                        definition.id,
                        definition.path
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_WDM: &str = r#"
    {
        "Name": "Test",
        "WDMMVersion": "1.0.0",
        "Features": [
            {
                "ID": "Networking",
                "Parameters": [
                    { "ID": 20, "Path": "Networking/Hostname", "Type": "String" }
                ],
                "Classes": ["Interface"]
            }
        ],
        "Classes": [
            {
                "ID": "Interface",
                "BaseID": 40,
                "BasePath": "Networking/Interfaces",
                "Parameters": [
                    { "ID": 41, "Path": "IpAddress", "Type": "String" },
                    { "ID": 42, "Path": "Mtu", "Type": "Uint32", "Min": 68, "Max": 9000 }
                ]
            }
        ],
        "Enums": [
            {
                "ID": "LinkState",
                "Members": [
                    { "Name": "Down", "Value": 0 },
                    { "Name": "Up", "Value": 1 }
                ]
            }
        ]
    }
    "#;

    #[test]
    fn test_load_builds_catalog() {
        let mut model = DeviceModel::new();
        DeviceModelLoader::load(SMALL_WDM, &mut model).expect("load");
        assert_eq!(model.name, "Test");
        assert!(model.find_feature_definition("Networking").is_some());
        assert!(model.find_class_definition("Interface").is_some());
        assert!(model.find_enum_definition("LinkState").is_some());
        assert!(model.find_definition(20).is_some());
        assert!(model.find_definition(41).is_some());
        // synthetic instantiations parameter of the class
        assert!(model.find_definition(40).is_some());
    }

    #[test]
    fn test_class_parameters_carry_class_context() {
        let mut model = DeviceModel::new();
        DeviceModelLoader::load(SMALL_WDM, &mut model).expect("load");
        let definition = model.find_definition(41).expect("definition");
        assert_eq!(definition.class_name.as_deref(), Some("Interface"));
        assert_eq!(
            definition.class_base_path.as_deref(),
            Some("Networking/Interfaces")
        );
        assert_eq!(definition.feature_name.as_deref(), Some("Networking"));
    }

    #[test]
    fn test_unsupported_version_is_rejected() {
        let mut model = DeviceModel::new();
        let newer = SMALL_WDM.replace("1.0.0", "2.0.0");
        assert!(DeviceModelLoader::load(&newer, &mut model).is_err());
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        let mut model = DeviceModel::new();
        assert!(matches!(
            DeviceModelLoader::load("{ not json", &mut model),
            Err(Error::ModelFormat(_))
        ));
    }

    #[test]
    fn test_load_is_additive() {
        let mut model = DeviceModel::new();
        DeviceModelLoader::load(SMALL_WDM, &mut model).expect("first load");
        let more = r#"
        {
            "Name": "Test",
            "WDMMVersion": "1.0.0",
            "Features": [
                {
                    "ID": "Clock",
                    "Parameters": [
                        { "ID": 60, "Path": "Clock/TimeZone", "Type": "String" }
                    ]
                }
            ]
        }
        "#;
        DeviceModelLoader::load(more, &mut model).expect("second load");
        assert!(model.find_definition(20).is_some());
        assert!(model.find_definition(60).is_some());
    }
}
