// SPDX-License-Identifier: MPL-2.0

//! Registration of devices and providers, and selector-driven binding of
//! instances to providers.
//!
//! On provider registration and on model/description updates the registry
//! rescans every instance; re-binding a provided instance logs a warning and
//! overwrites. Unregistration clears the affected bindings and evicts upload
//! ids owned by the removed provider.

use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::instances::device::Device;
use crate::instances::instance::ParameterInstance;
use crate::loader::wdd::DeviceDescription;
use crate::loader::wdm::DeviceModelLoader;
use crate::model::definitions::{ClassDefinition, FeatureDefinition};
use crate::model::device_model::{names_equal, DeviceModel};
use crate::model::types::{
    DeviceCollectionId, DeviceId, ParameterId, ParameterInstanceId,
    FIRMWARE_VERSION_PARAMETER_ID, ORDER_NUMBER_PARAMETER_ID,
};
use crate::model::value::ParameterValue;
use crate::provider::{
    DeviceDescriptionProvider, DeviceDescriptionProviderRef, DeviceExtensionProvider,
    DeviceExtensionProviderRef, DeviceExtensionResponse, DeviceSelector, ModelProvider,
    ModelProviderRef, ParameterProvider, ParameterProviderRef, ParameterSelector,
    ParameterSelectorKind, ProviderCallMode, SerialParameterProvider,
};
use crate::responses::{Response, WddResponse, WdmResponse};
use crate::service::{ParameterService, ProviderData, ServiceState};
use crate::status::StatusCode;
use crate::sync::future::{resolved_future, Future};

/// One device to register.
#[derive(Debug, Clone)]
pub struct RegisterDeviceRequest {
    pub device_id: DeviceId,
    pub order_number: String,
    pub firmware_version: String,
}

/// True when `instance` belongs to the resolved definitions of `owner`.
fn belongs_to(definitions: &[Arc<crate::model::definitions::ParameterDefinition>], instance: &ParameterInstance) -> bool {
    definitions.iter().any(|d| d.id == instance.id.id)
}

fn belongs_to_class(class: &ClassDefinition, instance: &ParameterInstance) -> bool {
    belongs_to(&class.resolved_parameter_definitions, instance)
        || (class.is_dynamic && class.base_id == instance.id.id)
}

fn belongs_to_feature(
    model: &DeviceModel,
    feature: &FeatureDefinition,
    instance: &ParameterInstance,
) -> bool {
    if belongs_to(&feature.resolved_parameter_definitions, instance) {
        return true;
    }
    if let Some(instance_feature) = &instance.definition.feature_name {
        if names_equal(instance_feature, &feature.name)
            || feature
                .resolved_includes
                .iter()
                .any(|f| names_equal(f, instance_feature))
        {
            return true;
        }
    }
    // fallback over the feature's classes for definitions without a feature
    // reference
    for class_name in &feature.classes {
        if let Some(class) = model.find_class_definition(class_name) {
            if belongs_to_class(&class, instance) {
                return true;
            }
        }
    }
    false
}

impl ParameterService {
    // ----------------------------------------------------------------------
    // Devices
    // ----------------------------------------------------------------------

    /// Registers devices; each gets its instance collection and receives all
    /// matching descriptions.
    pub fn register_devices(
        self: &Arc<Self>,
        requests: Vec<RegisterDeviceRequest>,
    ) -> Future<Vec<Response>> {
        let mut result = Vec::with_capacity(requests.len());

        for request in requests {
            let device_id = request.device_id;
            {
                let mut guard = self.state.lock();
                match guard.device(device_id) {
                    Ok(_) => {
                        result.push(Response::new(StatusCode::DeviceAlreadyExists));
                        continue;
                    }
                    Err(StatusCode::UnknownDevice) => {}
                    Err(status) => {
                        result.push(Response::new(status));
                        continue;
                    }
                }

                let device = Device::new(
                    device_id,
                    request.order_number.clone(),
                    request.firmware_version.clone(),
                );
                guard.collections[device_id.collection as usize][device_id.slot as usize] =
                    Some(device);

                // extension features apply synchronously
                self.extension_providers.for_each(|_, response| {
                    Self::apply_extension_to_device(&mut guard, device_id, response);
                });
                Self::set_builtin_values(&mut guard, device_id, &request);
                self.rebind_device(&mut guard, device_id);
            }

            // description providers answer asynchronously
            self.description_providers.for_each(|provider, selectors| {
                self.load_matched_device_information(
                    Arc::clone(provider),
                    selectors,
                    device_id,
                    &request.order_number,
                    &request.firmware_version,
                );
            });

            info!(
                "Loaded device {device_id} with orderNumber '{}'",
                request.order_number
            );
            result.push(Response::new(StatusCode::Success));
        }

        resolved_future(result)
    }

    /// Removes devices; their instance collections die with them.
    pub fn unregister_devices(
        self: &Arc<Self>,
        device_ids: Vec<DeviceId>,
    ) -> Future<Vec<Response>> {
        let mut guard = self.state.lock();
        let mut result = Vec::with_capacity(device_ids.len());
        for id in device_ids {
            match guard.device(id) {
                Ok(_) => {
                    guard.collections[id.collection as usize][id.slot as usize] = None;
                    info!("Unloaded device {id}");
                    result.push(Response::new(StatusCode::Success));
                }
                Err(status) => result.push(Response::new(status)),
            }
        }
        resolved_future(result)
    }

    /// Removes every device of one collection.
    pub fn unregister_all_devices(
        self: &Arc<Self>,
        collection_id: DeviceCollectionId,
    ) -> Future<Response> {
        let mut guard = self.state.lock();
        if guard.collection(collection_id).is_err() {
            return resolved_future(Response::new(StatusCode::UnknownDeviceCollection));
        }
        for slot in guard.collections[collection_id as usize].iter_mut() {
            *slot = None;
        }
        info!("Unloaded devices for collection {collection_id}");
        resolved_future(Response::new(StatusCode::Success))
    }

    /// Reserved parameter ids 1 and 6 carry order number and firmware
    /// version as fixed values when the model defines them.
    fn set_builtin_values(
        state: &mut ServiceState,
        device_id: DeviceId,
        request: &RegisterDeviceRequest,
    ) {
        for (parameter_id, text) in [
            (ORDER_NUMBER_PARAMETER_ID, &request.order_number),
            (FIRMWARE_VERSION_PARAMETER_ID, &request.firmware_version),
        ] {
            Self::set_builtin_value(
                state,
                device_id,
                parameter_id,
                ParameterValue::String(text.clone()),
            );
        }
    }

    fn set_builtin_value(
        state: &mut ServiceState,
        device_id: DeviceId,
        parameter_id: ParameterId,
        value: ParameterValue,
    ) {
        let Some(definition) = state.model.find_definition(parameter_id) else {
            return;
        };
        let status = crate::model::validate::check_parameter_value(Some(&value), &definition);
        if status.is_error() {
            error!(
                "Builtin value for {} did not match model definition: {status}",
                definition.path
            );
            return;
        }
        let Ok(device) = state.device_mut(device_id) else {
            return;
        };
        let id = ParameterInstanceId::new(parameter_id, 0, device_id);
        if device.parameter_instances.get_instance(&id).is_none() {
            device
                .parameter_instances
                .add_instances(device_id, 0, &[definition], &[], false);
        }
        for instance in device.parameter_instances.all_mut() {
            if instance.id == id {
                instance.fixed_value = Some(value);
                break;
            }
        }
    }

    // ----------------------------------------------------------------------
    // Parameter providers
    // ----------------------------------------------------------------------

    /// Registers parameter providers. In serialized mode each provider is
    /// transparently wrapped so it observes at most one outstanding call.
    pub fn register_parameter_providers(
        self: &Arc<Self>,
        providers: Vec<ParameterProviderRef>,
        mode: ProviderCallMode,
    ) -> Future<Vec<Response>> {
        let mut result = Vec::with_capacity(providers.len());
        for provider in providers {
            let status = match mode {
                ProviderCallMode::Serialized => {
                    let wrapper: ParameterProviderRef =
                        Arc::new(SerialParameterProvider::new(Arc::clone(&provider)));
                    self.add_parameter_provider(wrapper, Some(provider))
                }
                ProviderCallMode::Concurrent => self.add_parameter_provider(provider, None),
            };
            result.push(Response::new(status));
        }
        resolved_future(result)
    }

    fn add_parameter_provider(
        self: &Arc<Self>,
        registered: ParameterProviderRef,
        wrapped: Option<ParameterProviderRef>,
    ) -> StatusCode {
        if !self.providers.add(
            Arc::clone(&registered),
            ProviderData {
                selectors: Vec::new(),
                wrapped: wrapped.clone(),
            },
        ) {
            error!("ParameterProvider already registered");
            return StatusCode::ProviderNotOperational;
        }

        // no core lock may be held here, the provider may re-enter
        let response = registered.get_provided_parameters();
        if response.has_error() {
            error!("ParameterProvider could not initialize: {}", response.status);
            self.providers.remove(&registered);
            return StatusCode::ProviderNotOperational;
        }
        let selectors = response.selected_parameters;
        if !self.providers.update_data(
            &registered,
            ProviderData {
                selectors: selectors.clone(),
                wrapped,
            },
        ) {
            error!("Could not update data for unknown ParameterProvider");
            return StatusCode::ProviderNotOperational;
        }

        let mut guard = self.state.lock();
        for device_id in guard.device_ids() {
            Self::match_selected_parameters(&mut guard, device_id, &registered, &selectors);
        }
        StatusCode::Success
    }

    /// Unregisters parameter providers (accepts wrapped or registered
    /// handles) and clears their bindings and upload ids.
    pub fn unregister_parameter_providers(self: &Arc<Self>, providers: Vec<ParameterProviderRef>) {
        for provider in providers {
            let registered = if self.providers.remove(&provider) {
                Some(provider)
            } else {
                let wrapper = self.providers.find(|_, data| {
                    data.wrapped
                        .as_ref()
                        .is_some_and(|w| Arc::ptr_eq(w, &provider))
                });
                match wrapper {
                    Some(wrapper) if self.providers.remove(&wrapper) => Some(wrapper),
                    _ => None,
                }
            };

            let Some(removed) = registered else {
                warn!("Could not unregister provider, was not found");
                continue;
            };

            {
                let mut guard = self.state.lock();
                Self::unprovide(&mut guard, &removed);
            }
            self.upload_ids
                .retain(|_, data| !Arc::ptr_eq(&data.creator, &removed));
        }
    }

    fn unprovide(state: &mut ServiceState, provider: &ParameterProviderRef) {
        let mut found_any = false;
        for collection in &mut state.collections {
            for device in collection.iter_mut().flatten() {
                for instance in device.parameter_instances.all_mut() {
                    if instance.provided_by(provider) {
                        debug!("Unprovide {}", instance.id);
                        found_any = true;
                        instance.provider = None;
                    }
                }
            }
        }
        Self::log_unmatched_unprovide(found_any);
    }

    /// Binds matching instances of one device to `provider`.
    pub(crate) fn match_selected_parameters(
        state: &mut ServiceState,
        device_id: DeviceId,
        provider: &ParameterProviderRef,
        selectors: &[ParameterSelector],
    ) {
        for selector in selectors {
            if !selector.devices.matches(device_id) {
                continue;
            }

            // model lookups before the device borrow
            let feature = match &selector.kind {
                ParameterSelectorKind::Feature(name) => {
                    match state.model.find_feature_definition(name) {
                        Some(feature) => Some(feature),
                        None => continue,
                    }
                }
                _ => None,
            };
            let class = match &selector.kind {
                ParameterSelectorKind::Class(name) => {
                    match state.model.find_class_definition(name) {
                        Some(class) => Some(class),
                        None => continue,
                    }
                }
                _ => None,
            };

            let ServiceState {
                model, collections, ..
            } = &mut *state;
            let Some(device) = collections
                .get_mut(device_id.collection as usize)
                .and_then(|c| c.get_mut(device_id.slot as usize))
                .and_then(Option::as_mut)
            else {
                return;
            };

            if let Some(feature) = &feature {
                // ignore when the device lacks the selected feature entirely
                let device_has = device
                    .collected_features
                    .resolved_includes
                    .iter()
                    .any(|f| names_equal(f, &feature.name));
                if !device_has {
                    continue;
                }
            }

            for instance in device.parameter_instances.all_mut() {
                if instance.fixed_value.is_some() {
                    continue;
                }
                let matches = match &selector.kind {
                    ParameterSelectorKind::Definition(id) => instance.id.id == *id,
                    ParameterSelectorKind::Feature(_) => feature
                        .as_ref()
                        .is_some_and(|f| belongs_to_feature(model, f, instance)),
                    ParameterSelectorKind::Class(_) => class
                        .as_ref()
                        .is_some_and(|c| belongs_to_class(c, instance)),
                };
                if !matches {
                    continue;
                }
                if instance.provider.is_some() && !instance.provided_by(provider) {
                    // not fatal to overprovide parameters
                    warn!(
                        "ParameterInstance {} was already provided, overwriting",
                        instance.id
                    );
                }
                instance.provider = Some(Arc::clone(provider));
            }
        }
    }

    /// Re-applies every registered provider's selectors to one device.
    pub(crate) fn rebind_device(self: &Arc<Self>, state: &mut ServiceState, device_id: DeviceId) {
        self.providers.for_each(|provider, data| {
            Self::match_selected_parameters(state, device_id, provider, &data.selectors);
        });
    }

    // ----------------------------------------------------------------------
    // Model providers
    // ----------------------------------------------------------------------

    /// Registers model providers; their model text merges into the live
    /// model, deferred description loads are retried and all instances are
    /// re-matched.
    pub fn register_model_providers(
        self: &Arc<Self>,
        providers: Vec<ModelProviderRef>,
    ) -> Future<Vec<Response>> {
        let mut result = Vec::with_capacity(providers.len());
        for provider in providers {
            if !self.model_providers.add(Arc::clone(&provider), ()) {
                error!("ModelProvider already registered");
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }

            let future = provider.get_model_information();
            future.set_error_notifier(|err| {
                error!("ModelProvider could not initialize: {err}");
            });
            let service = Arc::clone(self);
            future.set_notifier(move |response: WdmResponse| {
                if response.has_error() {
                    error!("ModelProvider could not initialize: {}", response.status);
                    return;
                }
                if response.wdm_content.is_empty() {
                    return;
                }
                service.load_model_text(&response.wdm_content);
            });
            result.push(Response::new(StatusCode::Success));
        }
        resolved_future(result)
    }

    pub fn unregister_model_providers(&self, providers: Vec<ModelProviderRef>) {
        for provider in providers {
            if !self.model_providers.remove(&provider) {
                warn!("Could not unregister provider, was not found");
            }
        }
    }

    /// Merges model text, retries deferred descriptions and re-matches all
    /// provider selectors.
    pub fn load_model_text(self: &Arc<Self>, wdm_content: &str) {
        let mut guard = self.state.lock();
        if let Err(err) = DeviceModelLoader::load(wdm_content, &mut guard.model) {
            error!("Could not load model from ModelProvider: {err}");
            return;
        }
        {
            let ServiceState {
                model, collections, ..
            } = &mut *guard;
            for collection in collections.iter_mut() {
                for device in collection.iter_mut().flatten() {
                    device.retry_unfinished_device_informations(model);
                }
            }
        }
        for device_id in guard.device_ids() {
            self.rebind_device(&mut guard, device_id);
        }
    }

    // ----------------------------------------------------------------------
    // Device description providers
    // ----------------------------------------------------------------------

    pub fn register_device_description_providers(
        self: &Arc<Self>,
        providers: Vec<DeviceDescriptionProviderRef>,
    ) -> Future<Vec<Response>> {
        let mut result = Vec::with_capacity(providers.len());
        for provider in providers {
            if !self
                .description_providers
                .add(Arc::clone(&provider), Vec::new())
            {
                error!("DeviceDescriptionProvider already registered");
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }

            // no core lock may be held here
            let response = provider.get_provided_devices();
            if response.status.is_error() {
                error!(
                    "DeviceDescriptionProvider could not initialize: {}",
                    response.status
                );
                self.description_providers.remove(&provider);
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }
            let selectors = response.selected_devices;
            if !self
                .description_providers
                .update_data(&provider, selectors.clone())
            {
                error!("Could not update data for unknown DeviceDescriptionProvider");
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }

            let devices: Vec<(DeviceId, String, String)> = {
                let guard = self.state.lock();
                let mut devices = Vec::new();
                guard.for_each_device(|device| {
                    devices.push((
                        device.id,
                        device.order_number().to_string(),
                        device.firmware_version().to_string(),
                    ));
                });
                devices
            };
            for (device_id, order_number, firmware_version) in devices {
                self.load_matched_device_information(
                    Arc::clone(&provider),
                    &selectors,
                    device_id,
                    &order_number,
                    &firmware_version,
                );
            }
            result.push(Response::new(StatusCode::Success));
        }
        resolved_future(result)
    }

    pub fn unregister_device_description_providers(
        &self,
        providers: Vec<DeviceDescriptionProviderRef>,
    ) {
        for provider in providers {
            if !self.description_providers.remove(&provider) {
                warn!("Could not unregister provider, was not found");
            }
        }
    }

    /// Asks one description provider about one device and applies the
    /// answer when it arrives.
    fn load_matched_device_information(
        self: &Arc<Self>,
        provider: DeviceDescriptionProviderRef,
        selectors: &[DeviceSelector],
        device_id: DeviceId,
        order_number: &str,
        firmware_version: &str,
    ) {
        if !selectors.iter().any(|s| s.matches(device_id)) {
            return;
        }

        let future =
            provider.get_device_information(order_number.to_string(), firmware_version.to_string());
        {
            let order_number = order_number.to_string();
            let firmware_version = firmware_version.to_string();
            future.set_error_notifier(move |err| {
                error!(
                    "Could not get information ({order_number}, {firmware_version}) from DeviceDescriptionProvider: {err}"
                );
            });
        }
        let service = Arc::clone(self);
        let order_number = order_number.to_string();
        let firmware_version = firmware_version.to_string();
        future.set_notifier(move |response: WddResponse| {
            if !response.is_determined() {
                return;
            }
            if response.has_error() {
                warn!(
                    "Device description provider has reported problem with ({order_number}, {firmware_version}, {device_id}): {}",
                    response.status
                );
                return;
            }

            if !response.wdm_content.is_empty() {
                service.load_model_text(&response.wdm_content);
            }

            let mut guard = service.state.lock();
            if !response.content.is_empty() {
                let ServiceState {
                    model, collections, ..
                } = &mut *guard;
                let Some(device) = collections
                    .get_mut(device_id.collection as usize)
                    .and_then(|c| c.get_mut(device_id.slot as usize))
                    .and_then(Option::as_mut)
                else {
                    return;
                };
                if let Err(err) = device.add_wdd(&response.content, model) {
                    error!(
                        "Could not load information ({order_number}, {firmware_version}) from DeviceDescriptionProvider: {err}"
                    );
                    return;
                }
            }
            service.rebind_device(&mut guard, device_id);
        });
    }

    // ----------------------------------------------------------------------
    // Device extension providers
    // ----------------------------------------------------------------------

    pub fn register_device_extension_providers(
        self: &Arc<Self>,
        providers: Vec<DeviceExtensionProviderRef>,
    ) -> Future<Vec<Response>> {
        let mut result = Vec::with_capacity(providers.len());
        for provider in providers {
            if !self
                .extension_providers
                .add(Arc::clone(&provider), DeviceExtensionResponse::default())
            {
                error!("DeviceExtensionProvider already registered");
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }

            // no core lock may be held here
            let response = provider.get_device_extensions();
            if response.has_error() {
                error!(
                    "DeviceExtensionProvider could not initialize: {}",
                    response.status
                );
                self.extension_providers.remove(&provider);
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }
            if !self
                .extension_providers
                .update_data(&provider, response.clone())
            {
                error!("Could not update data for unknown DeviceExtensionProvider");
                result.push(Response::new(StatusCode::ProviderNotOperational));
                continue;
            }

            {
                let mut guard = self.state.lock();
                for device_id in guard.device_ids() {
                    Self::apply_extension_to_device(&mut guard, device_id, &response);
                    self.rebind_device(&mut guard, device_id);
                }
            }
            result.push(Response::new(StatusCode::Success));
        }
        resolved_future(result)
    }

    pub fn unregister_device_extension_providers(
        &self,
        providers: Vec<DeviceExtensionProviderRef>,
    ) {
        for provider in providers {
            if !self.extension_providers.remove(&provider) {
                warn!("Could not unregister provider, was not found");
            }
        }
    }

    fn apply_extension_to_device(
        state: &mut ServiceState,
        device_id: DeviceId,
        response: &DeviceExtensionResponse,
    ) {
        if !response.selected_devices.matches(device_id) {
            return;
        }
        let ServiceState {
            model, collections, ..
        } = &mut *state;
        let Some(device) = collections
            .get_mut(device_id.collection as usize)
            .and_then(|c| c.get_mut(device_id.slot as usize))
            .and_then(Option::as_mut)
        else {
            return;
        };
        device.add_description(
            DeviceDescription::with_features(response.extension_features.clone()),
            model,
        );
    }
}
