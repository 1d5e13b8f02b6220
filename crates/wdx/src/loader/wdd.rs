// SPDX-License-Identifier: MPL-2.0

//! WDD (device description) loader.
//!
//! A WDD selects features for one device, instantiates classes (with
//! `AdditionalClasses` and per-instance values/overrides), declares fixed
//! values and applies device-wide overrides. Parsing is side-effect free;
//! application materializes parameter instances into the device. When model
//! information is missing the application reports incompleteness so the
//! device can retry once more model text arrives.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::instances::device::Device;
use crate::instances::instance::ValueDeclaration;
use crate::loader::parse_value;
use crate::loader::version::WdmmVersion;
use crate::model::definitions::{
    ClassInstantiationInternal, ParameterOverride, ResolvedClassSet, ValueType,
};
use crate::model::device_model::{names_equal, DeviceModel};
use crate::model::resolver::{apply_override_layers, collect_chain, effective_definitions};
use crate::model::types::{InstanceId, ParameterId, ParameterInstanceId};
use crate::model::value::{ClassInstantiation, ParameterValue};

// ---------------------------------------------------------------------------
// Document shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct WddDocument {
    #[serde(rename = "ModelReference", default)]
    model_reference: String,
    #[serde(rename = "WDMMVersion", default)]
    wdmm_version: String,
    #[serde(rename = "Features", default)]
    features: Vec<String>,
    #[serde(rename = "Instantiations", default)]
    instantiations: Vec<RawInstantiation>,
    #[serde(rename = "ParameterValues", default)]
    parameter_values: Vec<RawValueDeclaration>,
    #[serde(rename = "Overrides", default)]
    overrides: Vec<RawOverride>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawInstantiation {
    #[serde(rename = "Class")]
    class: String,
    #[serde(rename = "AdditionalClasses", default)]
    additional_classes: Vec<String>,
    #[serde(rename = "Instances", default)]
    instances: Vec<RawInstance>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawInstance {
    #[serde(rename = "ID")]
    id: InstanceId,
    #[serde(rename = "ParameterValues", default)]
    parameter_values: Vec<RawValueDeclaration>,
    #[serde(rename = "Overrides", default)]
    overrides: Vec<RawOverride>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawValueDeclaration {
    #[serde(rename = "ID")]
    id: ParameterId,
    #[serde(rename = "Value")]
    value: serde_json::Value,
    #[serde(rename = "StatusUnavailableIfNotProvided", default)]
    status_unavailable_if_not_provided: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawOverride {
    #[serde(rename = "ID")]
    id: ParameterId,
    #[serde(rename = "DefaultValue", default)]
    default_value: Option<serde_json::Value>,
    #[serde(rename = "Pattern", default)]
    pattern: Option<String>,
    #[serde(rename = "AllowedValues", default)]
    allowed_values: Option<RawAllowedValues>,
    #[serde(rename = "Min", default)]
    min: Option<f64>,
    #[serde(rename = "Max", default)]
    max: Option<f64>,
    #[serde(rename = "Inactive", default)]
    inactive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAllowedValues {
    #[serde(rename = "List", default)]
    list: Vec<serde_json::Value>,
    #[serde(rename = "Not", default)]
    not: Vec<serde_json::Value>,
}

/// A parsed device description, kept for deferred re-application.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    document: WddDocument,
}

impl DeviceDescription {
    /// Description carrying only extension features (no document text).
    pub fn with_features(features: Vec<String>) -> Self {
        DeviceDescription {
            document: WddDocument {
                model_reference: String::new(),
                wdmm_version: String::new(),
                features,
                instantiations: Vec::new(),
                parameter_values: Vec::new(),
                overrides: Vec::new(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Applies parsed descriptions to a device against the live model.
pub struct DeviceDescriptionLoader<'a> {
    model: &'a DeviceModel,
    device: &'a mut Device,
    complete: bool,
}

impl<'a> DeviceDescriptionLoader<'a> {
    pub fn new(model: &'a DeviceModel, device: &'a mut Device) -> Self {
        DeviceDescriptionLoader {
            model,
            device,
            complete: true,
        }
    }

    /// Parses WDD text. Version problems and malformed JSON are hard errors;
    /// missing model information is not (it is reported by `apply`).
    pub fn parse(wdd_content: &str) -> Result<DeviceDescription> {
        let document: WddDocument = serde_json::from_str(wdd_content)
            .map_err(|err| Error::DescriptionFormat(err.to_string()))?;
        if !document.wdmm_version.is_empty() {
            WdmmVersion::parse_supported(&document.wdmm_version)?;
        }
        Ok(DeviceDescription { document })
    }

    /// Applies `description` to the device. Returns false when model
    /// information was missing (the caller keeps the description for a
    /// retry).
    pub fn apply(&mut self, description: &DeviceDescription) -> bool {
        let document = &description.document;

        if !document.model_reference.is_empty()
            && !names_equal(&document.model_reference, &self.model.name)
        {
            // referenced model not loaded yet
            self.complete = false;
            return self.complete;
        }

        let global_overrides = self.convert_overrides(&document.overrides, None);
        let global_values = self.convert_values(&document.parameter_values, 0);

        self.apply_features(&document.features, &global_overrides, &global_values);
        self.apply_instantiations(document, &global_overrides, &global_values);
        self.refresh_parameter_flags();

        self.complete
    }

    // -- features ----------------------------------------------------------

    fn apply_features(
        &mut self,
        features: &[String],
        global_overrides: &[ParameterOverride],
        global_values: &[ValueDeclaration],
    ) {
        for name in features {
            if self.model.find_feature_definition(name).is_none() {
                self.complete = false;
                continue;
            }
            let already = self
                .device
                .collected_features
                .includes
                .iter()
                .any(|f| names_equal(f, name));
            if !already {
                self.device.collected_features.includes.push(name.clone());
            }
        }
        self.recollect_features();

        // scalar instances for feature-owned parameters
        let feature_names = self.device.collected_features.resolved_includes.clone();
        for name in &feature_names {
            let Some(feature) = self.model.find_feature_definition(name) else {
                continue;
            };
            let scalar_defs: Vec<_> = feature
                .parameter_definitions
                .iter()
                .filter(|d| d.class_name.is_none())
                .cloned()
                .collect();
            let effective = apply_override_layers(&scalar_defs, &[global_overrides]);
            self.device.parameter_instances.add_instances(
                self.device.id,
                0,
                &effective,
                global_values,
                false,
            );
        }
    }

    /// Rebuilds the device's collected feature closure from its includes.
    fn recollect_features(&mut self) {
        let mut resolved: Vec<String> = Vec::new();
        for name in &self.device.collected_features.includes {
            if let Some(feature) = self.model.find_feature_definition(name) {
                for candidate in
                    std::iter::once(&feature.name).chain(feature.resolved_includes.iter())
                {
                    if !resolved.iter().any(|r| names_equal(r, candidate)) {
                        resolved.push(candidate.clone());
                    }
                }
            } else if !resolved.iter().any(|r| names_equal(r, name)) {
                // keep the unresolvable name visible; a later model load
                // completes it
                resolved.push(name.clone());
            }
        }

        let mut definitions = Vec::new();
        let mut seen_ids: std::collections::HashSet<ParameterId> = std::collections::HashSet::new();
        for name in &resolved {
            if let Some(feature) = self.model.find_feature_definition(name) {
                for definition in &feature.resolved_parameter_definitions {
                    if definition.id == 0 || seen_ids.insert(definition.id) {
                        definitions.push(Arc::clone(definition));
                    }
                }
            }
        }
        self.device.collected_features.resolved_includes = resolved;
        self.device.collected_features.resolved_parameter_definitions = definitions;
    }

    // -- instantiations ----------------------------------------------------

    fn apply_instantiations(
        &mut self,
        document: &WddDocument,
        global_overrides: &[ParameterOverride],
        global_values: &[ValueDeclaration],
    ) {
        // declared instance lists per primary class, for the fixed values of
        // static instantiations parameters
        let mut declared_per_class: HashMap<String, Vec<ClassInstantiation>> = HashMap::new();

        for raw in &document.instantiations {
            let mut chain_names = vec![raw.class.clone()];
            chain_names.extend(raw.additional_classes.iter().cloned());

            let chain = collect_chain(self.model, &chain_names);
            if !chain.is_complete() {
                self.complete = false;
                continue;
            }

            for raw_instance in &raw.instances {
                let instance_overrides =
                    self.convert_overrides(&raw_instance.overrides, Some(&chain_names));
                let definitions = effective_definitions(
                    &chain.classes,
                    &[global_overrides, &instance_overrides],
                );

                let mut values =
                    self.convert_values(&raw_instance.parameter_values, raw_instance.id);
                values.extend_from_slice(global_values);

                self.device.parameter_instances.add_instances(
                    self.device.id,
                    raw_instance.id,
                    &definitions,
                    &values,
                    false,
                );

                declared_per_class
                    .entry(raw.class.clone())
                    .or_default()
                    .push(ClassInstantiation {
                        id: raw_instance.id,
                        classes: chain_names.clone(),
                    });

                let already_tracked = self
                    .device
                    .class_instantiations
                    .iter()
                    .any(|ci| ci.id == raw_instance.id && ci.classes == chain_names);
                if !already_tracked {
                    self.device.class_instantiations.push(ClassInstantiationInternal {
                        id: raw_instance.id,
                        classes: chain_names.clone(),
                        collected_classes: ResolvedClassSet {
                            class_names: chain.classes.iter().map(|c| c.name.clone()).collect(),
                            parameter_definitions: definitions,
                        },
                        overrides: instance_overrides,
                    });
                }
            }
        }

        self.add_instantiation_parameters(&declared_per_class);
    }

    /// Creates the instantiations pseudo-instances: fixed lists for static
    /// classes, provider-backed parameters plus dynamic placeholders for
    /// dynamic classes.
    fn add_instantiation_parameters(
        &mut self,
        declared_per_class: &HashMap<String, Vec<ClassInstantiation>>,
    ) {
        let mut class_names: Vec<String> = Vec::new();
        for name in self
            .device
            .collected_features
            .resolved_includes
            .clone()
            .iter()
            .filter_map(|f| self.model.find_feature_definition(f))
            .flat_map(|f| f.classes.clone())
        {
            if !class_names.contains(&name) {
                class_names.push(name);
            }
        }
        for name in declared_per_class.keys() {
            if !class_names.contains(name) {
                class_names.push(name.clone());
            }
        }

        for name in class_names {
            let Some(class) = self.model.find_class_definition(&name) else {
                self.complete = false;
                continue;
            };
            let Some(definition) = class.instantiations_parameter.clone() else {
                continue;
            };

            if class.is_dynamic {
                // provider reports the instance set at read time
                self.add_class_instance_once(&class.base_path, definition, ValueDeclaration::default());
                self.device.parameter_instances.add_instances(
                    self.device.id,
                    crate::model::types::DYNAMIC_PLACEHOLDER_INSTANCE_ID,
                    &class.resolved_parameter_definitions,
                    &[],
                    false,
                );
            } else {
                let declared = declared_per_class.get(&name).cloned().unwrap_or_default();
                let force = ValueDeclaration {
                    id: None,
                    value: Some(ParameterValue::Instantiations(declared)),
                    status_unavailable_if_not_provided: false,
                };
                self.add_class_instance_once(&class.base_path, definition, force);
            }
        }
    }

    fn add_class_instance_once(
        &mut self,
        base_path: &str,
        definition: Arc<crate::model::definitions::ParameterDefinition>,
        force: ValueDeclaration,
    ) {
        // a re-applied description refreshes the declared instance set of an
        // already materialized instantiations parameter
        if self
            .device
            .parameter_instances
            .refresh_class_instance_value(base_path, &force)
        {
            return;
        }
        self.device.parameter_instances.add_class_instance(
            self.device.id,
            base_path,
            definition,
            &force,
        );
    }

    // -- conversions -------------------------------------------------------

    fn convert_values(
        &mut self,
        raw_values: &[RawValueDeclaration],
        instance_id: InstanceId,
    ) -> Vec<ValueDeclaration> {
        let mut declarations = Vec::with_capacity(raw_values.len());
        for raw in raw_values {
            let Some(definition) = self.model.find_definition(raw.id) else {
                self.complete = false;
                continue;
            };
            let value = parse_value(definition.value_type, definition.value_rank, &raw.value);
            if value.is_none() {
                log::warn!(
                    "Declared value for parameter {} does not match its type, ignoring",
                    raw.id
                );
            }
            declarations.push(ValueDeclaration {
                id: Some(ParameterInstanceId::new(raw.id, instance_id, self.device.id)),
                value,
                status_unavailable_if_not_provided: raw.status_unavailable_if_not_provided,
            });
        }
        declarations
    }

    fn convert_overrides(
        &mut self,
        raw_overrides: &[RawOverride],
        chain_names: Option<&[String]>,
    ) -> Vec<ParameterOverride> {
        let mut overrides = Vec::with_capacity(raw_overrides.len());
        for raw in raw_overrides {
            let target = self.find_target_definition(raw.id, chain_names);
            let Some((value_type, value_rank)) = target else {
                self.complete = false;
                continue;
            };

            let allowed_values = raw.allowed_values.as_ref().map(|allowed| {
                crate::model::definitions::AllowedValues {
                    whitelist: allowed
                        .list
                        .iter()
                        .filter_map(|v| parse_value(value_type, crate::model::definitions::ValueRank::Scalar, v))
                        .collect(),
                    blacklist: allowed
                        .not
                        .iter()
                        .filter_map(|v| parse_value(value_type, crate::model::definitions::ValueRank::Scalar, v))
                        .collect(),
                }
            });

            overrides.push(ParameterOverride {
                id: raw.id,
                default_value: raw
                    .default_value
                    .as_ref()
                    .and_then(|v| parse_value(value_type, value_rank, v)),
                pattern: raw.pattern.clone(),
                allowed_values,
                min: raw.min,
                max: raw.max,
                inactive: raw.inactive,
            });
        }
        overrides
    }

    fn find_target_definition(
        &self,
        id: ParameterId,
        chain_names: Option<&[String]>,
    ) -> Option<(ValueType, crate::model::definitions::ValueRank)> {
        if let Some(names) = chain_names {
            let chain = collect_chain(self.model, names);
            for class in &chain.classes {
                if let Some(definition) =
                    class.parameter_definitions.iter().find(|d| d.id == id)
                {
                    return Some((definition.value_type, definition.value_rank));
                }
            }
        }
        self.model
            .find_definition(id)
            .map(|d| (d.value_type, d.value_rank))
    }

    // -- flags -------------------------------------------------------------

    fn refresh_parameter_flags(&mut self) {
        let mut has_beta = false;
        let mut has_deprecated = false;
        for definition in &self.device.collected_features.resolved_parameter_definitions {
            has_beta |= definition.is_beta;
            has_deprecated |= definition.is_deprecated;
        }
        self.device.has_beta_parameters = has_beta;
        self.device.has_deprecated_parameters = has_deprecated;
    }
}
