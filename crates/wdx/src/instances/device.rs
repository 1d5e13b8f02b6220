// SPDX-License-Identifier: MPL-2.0

//! A registered device: instance collection, collected features, class
//! instantiations and deferred description loads.

use log::{info, warn};

use crate::instances::collection::ParameterInstanceCollection;
use crate::loader::wdd::{DeviceDescription, DeviceDescriptionLoader};
use crate::model::definitions::{ClassInstantiationInternal, FeatureDefinition};
use crate::model::device_model::DeviceModel;
use crate::model::types::DeviceId;
use crate::error::Result;

pub struct Device {
    pub id: DeviceId,

    /// Collection answering value and attribute requests.
    pub parameter_instances: ParameterInstanceCollection,

    /// Everything the device's descriptions selected, for model requests
    /// (features, instances, classes).
    pub collected_features: FeatureDefinition,

    /// Class instantiations chosen by the device's descriptions.
    pub class_instantiations: Vec<ClassInstantiationInternal>,

    pub has_beta_parameters: bool,
    pub has_deprecated_parameters: bool,

    order_number: String,
    firmware_version: String,
    /// Descriptions that hit missing model information; re-run when new
    /// model text arrives.
    incomplete_descriptions: Vec<DeviceDescription>,
}

impl Device {
    pub fn new(
        id: DeviceId,
        order_number: impl Into<String>,
        firmware_version: impl Into<String>,
    ) -> Self {
        Device {
            id,
            parameter_instances: ParameterInstanceCollection::new(),
            collected_features: FeatureDefinition::default(),
            class_instantiations: Vec::new(),
            has_beta_parameters: false,
            has_deprecated_parameters: false,
            order_number: order_number.into(),
            firmware_version: firmware_version.into(),
            incomplete_descriptions: Vec::new(),
        }
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    /// Parses and applies a WDD document.
    pub fn add_wdd(&mut self, wdd_content: &str, model: &DeviceModel) -> Result<()> {
        let description = DeviceDescriptionLoader::parse(wdd_content)?;
        self.add_description(description, model);
        Ok(())
    }

    /// Applies an already parsed description (WDD or extension).
    pub fn add_description(&mut self, description: DeviceDescription, model: &DeviceModel) {
        let mut loader = DeviceDescriptionLoader::new(model, self);
        let complete = loader.apply(&description);
        if !complete {
            warn!(
                "Missing model information - Not all device description information could be processed."
            );
            self.incomplete_descriptions.push(description);
        }
    }

    /// Re-runs deferred description loads against an updated model.
    pub fn retry_unfinished_device_informations(&mut self, model: &DeviceModel) {
        if self.incomplete_descriptions.is_empty() {
            return;
        }
        info!(
            "New model information arrived - retrying {} device information sources",
            self.incomplete_descriptions.len()
        );
        let pending = std::mem::take(&mut self.incomplete_descriptions);
        for description in pending {
            let mut loader = DeviceDescriptionLoader::new(model, self);
            if !loader.apply(&description) {
                self.incomplete_descriptions.push(description);
            }
        }
        info!(
            "{} incomplete device information sources remaining.",
            self.incomplete_descriptions.len()
        );
    }
}
