// SPDX-License-Identifier: MPL-2.0

//! Catalog reads: devices, features, enums, and the filtered/paged parameter
//! listing.
//!
//! Listing strategy with dynamic classes: filtered instances are gathered
//! with the dynamic-instantiation parameters sorted last. If the paging
//! window never reaches them, one pass suffices. Otherwise the instantiation
//! values are fetched first, the listing re-runs with the reported instances
//! materialized, and the first pass's instantiation values are re-used in
//! the final response for consistency. Until the window reaches the dynamic
//! tail, `total_entries` is not accurate.

use log::{error, warn};
use std::sync::Arc;

use crate::instances::collection::ParameterInstanceCollection;
use crate::instances::device::Device;
use crate::model::definitions::{ClassInstantiationInternal, ValueType};
use crate::model::device_model::names_equal;
use crate::model::resolver::prepare_class_instantiation;
use crate::model::types::{DeviceCollectionId, DeviceId, ParameterInstanceId, ParameterInstancePath};
use crate::model::value::ParameterValue;
use crate::provider::DeviceSelector;
use crate::responses::{
    DeviceCollectionResponse, DeviceFeatureInformation, DeviceResponse, EnumDefinitionResponse,
    FeatureListResponse, FeatureResponse, ParameterResponse, ParameterResponseListResponse,
};
use crate::service::{ParameterService, ResolvedItem, ServiceState};
use crate::status::StatusCode;
use crate::sync::future::{resolved_future, Future, Promise};

/// Filter for the parameter listing request family.
#[derive(Debug, Clone, Default)]
pub struct ParameterFilter {
    pub only_methods: bool,
    pub without_methods: bool,
    pub only_file_ids: bool,
    pub without_file_ids: bool,
    pub only_beta: bool,
    pub without_beta: bool,
    pub only_deprecated: bool,
    pub without_deprecated: bool,
    pub only_usersettings: bool,
    pub without_usersettings: bool,
    pub only_writeable: bool,
    pub without_writeable: bool,
    /// Restrict to parameters of these features (case-insensitive).
    pub only_features: Vec<String>,
    /// Restrict to parameters below this path.
    pub only_subpath: String,
    /// Restrict to matching devices.
    pub device: Option<DeviceSelector>,
}

/// One gathered listing candidate.
#[derive(Clone)]
struct CatalogItem {
    item: ResolvedItem,
    is_placeholder: bool,
}

impl ParameterFilter {
    fn accepts(&self, entry: &CatalogItem) -> bool {
        if entry.is_placeholder {
            return false;
        }
        let definition = &entry.item.definition;
        if self.without_methods && definition.value_type == ValueType::Method {
            return false;
        }
        if self.only_methods && definition.value_type != ValueType::Method {
            return false;
        }
        if self.without_file_ids && definition.value_type == ValueType::FileId {
            return false;
        }
        if self.only_file_ids && definition.value_type != ValueType::FileId {
            return false;
        }
        if self.without_beta && definition.is_beta {
            return false;
        }
        if self.only_beta && !definition.is_beta {
            return false;
        }
        if self.without_deprecated && definition.is_deprecated {
            return false;
        }
        if self.only_deprecated && !definition.is_deprecated {
            return false;
        }
        let active_user_setting = definition.user_setting && !definition.overrideables.inactive;
        if self.without_usersettings && active_user_setting {
            return false;
        }
        if self.only_usersettings && !active_user_setting {
            return false;
        }
        let effectively_writeable = definition.writeable && !definition.overrideables.inactive;
        if self.without_writeable && effectively_writeable {
            return false;
        }
        if self.only_writeable && !effectively_writeable {
            return false;
        }
        if !self.only_features.is_empty() {
            let Some(feature_name) = &definition.feature_name else {
                warn!(
                    "Parameter definition '{}' (id={}) belongs to no feature",
                    definition.path, definition.id
                );
                return false;
            };
            if !self
                .only_features
                .iter()
                .any(|f| names_equal(f, feature_name))
            {
                return false;
            }
        }
        true
    }

    fn accepts_second_phase(&self, entry: &CatalogItem) -> bool {
        if !self.accepts(entry) {
            return false;
        }
        if self.only_subpath.is_empty() {
            return true;
        }
        let own = entry.item.path.parameter_path.to_ascii_lowercase();
        let sub = self.only_subpath.to_ascii_lowercase();
        own == sub || own.starts_with(&format!("{sub}/"))
    }

    fn device_matches(&self, device_id: DeviceId) -> bool {
        self.device
            .map_or(true, |selector| selector.matches(device_id))
    }
}

fn catalog_item(device: &Device, index: usize) -> CatalogItem {
    let instance = device.parameter_instances.by_index(index);
    CatalogItem {
        item: ResolvedItem {
            id: instance.id,
            path: ParameterInstancePath::new(
                instance.id.device.to_string(),
                ParameterInstanceCollection::build_parameter_instance_path(instance),
            ),
            definition: Arc::clone(&instance.definition),
            fixed_value: instance.fixed_value.clone(),
            provider: instance.provider.clone(),
            status_unavailable_if_not_provided: instance.status_unavailable_if_not_provided,
        },
        is_placeholder: instance.id.instance
            == crate::model::types::DYNAMIC_PLACEHOLDER_INSTANCE_ID,
    }
}

impl ParameterService {
    // ----------------------------------------------------------------------
    // Devices
    // ----------------------------------------------------------------------

    pub fn get_device(self: &Arc<Self>, device: DeviceId) -> Future<DeviceResponse> {
        let state = self.state.lock();
        let response = match state.device(device) {
            Ok(device) => device_response(device),
            Err(status) => DeviceResponse {
                status,
                ..DeviceResponse::default()
            },
        };
        resolved_future(response)
    }

    pub fn get_all_devices(self: &Arc<Self>) -> Future<DeviceCollectionResponse> {
        let state = self.state.lock();
        let mut response = DeviceCollectionResponse::new(StatusCode::Success);
        state.for_each_device(|device| response.devices.push(device_response(device)));
        resolved_future(response)
    }

    pub fn get_subdevices(
        self: &Arc<Self>,
        collection_id: DeviceCollectionId,
    ) -> Future<DeviceCollectionResponse> {
        let state = self.state.lock();
        let response = match state.collection(collection_id) {
            Ok(collection) => {
                let mut response = DeviceCollectionResponse::new(StatusCode::Success);
                for device in collection.iter().flatten() {
                    response.devices.push(device_response(device));
                }
                response
            }
            Err(_) => DeviceCollectionResponse::new(StatusCode::UnknownDeviceCollection),
        };
        resolved_future(response)
    }

    pub fn get_subdevices_by_collection_name(
        self: &Arc<Self>,
        collection_name: &str,
    ) -> Future<DeviceCollectionResponse> {
        match crate::model::types::parse_collection_name(collection_name) {
            Ok(collection_id) => self.get_subdevices(collection_id),
            Err(status) => resolved_future(DeviceCollectionResponse::new(status)),
        }
    }

    // ----------------------------------------------------------------------
    // Features
    // ----------------------------------------------------------------------

    pub fn get_features(
        self: &Arc<Self>,
        device_paths: Vec<String>,
    ) -> Future<Vec<FeatureListResponse>> {
        let state = self.state.lock();
        let mut result = Vec::with_capacity(device_paths.len());
        for device_path in &device_paths {
            let mut response = FeatureListResponse::default();
            let resolved = state
                .device_by_path(device_path)
                .map(|d| (d.id, d.collected_features.resolved_includes.clone()));
            match resolved {
                Ok((device_id, names)) => {
                    response.device_path = device_id.to_string();
                    response.features = build_feature_infos(&state, device_id, &names);
                    response.status = StatusCode::Success;
                }
                Err(status) => response.status = status,
            }
            result.push(response);
        }
        resolved_future(result)
    }

    pub fn get_features_of_all_devices(self: &Arc<Self>) -> Future<Vec<FeatureListResponse>> {
        let device_paths: Vec<String> = {
            let state = self.state.lock();
            state.device_ids().iter().map(DeviceId::to_string).collect()
        };
        self.get_features(device_paths)
    }

    pub fn get_feature_definition(
        self: &Arc<Self>,
        device_path: String,
        feature_name: String,
    ) -> Future<FeatureResponse> {
        let state = self.state.lock();
        let mut response = FeatureResponse {
            device_path: device_path.clone(),
            ..FeatureResponse::default()
        };
        let resolved = state
            .device_by_path(&device_path)
            .map(|d| (d.id, d.collected_features.resolved_includes.clone()));
        match resolved {
            Ok((device_id, device_features)) => {
                let infos =
                    build_feature_infos(&state, device_id, &[feature_name.clone()]);
                if infos.is_empty() {
                    response.status = StatusCode::UnknownFeatureName;
                } else if !device_features.iter().any(|f| names_equal(f, &feature_name)) {
                    response.status = StatusCode::FeatureNotAvailable;
                } else {
                    response.status = StatusCode::Success;
                    response.feature = infos.into_iter().next();
                }
            }
            Err(status) => response.status = status,
        }
        resolved_future(response)
    }

    // ----------------------------------------------------------------------
    // Enums
    // ----------------------------------------------------------------------

    pub fn get_enum_definition(self: &Arc<Self>, enum_name: &str) -> Future<EnumDefinitionResponse> {
        let state = self.state.lock();
        let mut response = EnumDefinitionResponse::default();
        response.definition = state.model.find_enum_definition(enum_name);
        response.status = if response.definition.is_some() {
            StatusCode::Success
        } else {
            StatusCode::UnknownEnumName
        };
        resolved_future(response)
    }

    pub fn get_all_enum_definitions(self: &Arc<Self>) -> Future<Vec<EnumDefinitionResponse>> {
        let state = self.state.lock();
        let result = state
            .model
            .enums
            .iter()
            .map(|definition| EnumDefinitionResponse {
                status: StatusCode::Success,
                definition: Some(Arc::clone(definition)),
            })
            .collect();
        resolved_future(result)
    }

    // ----------------------------------------------------------------------
    // Filtered parameter listing
    // ----------------------------------------------------------------------

    /// All value parameters matching `filter`, paged.
    pub fn get_all_parameters(
        self: &Arc<Self>,
        mut filter: ParameterFilter,
        paging_offset: usize,
        paging_limit: usize,
    ) -> Future<ParameterResponseListResponse> {
        filter.without_methods = true;
        filter.only_methods = false;
        self.get_all_parameters_internal(filter, paging_offset, paging_limit, true, Vec::new(), false)
    }

    /// All value-parameter definitions matching `filter`, paged.
    pub fn get_all_parameter_definitions(
        self: &Arc<Self>,
        mut filter: ParameterFilter,
        paging_offset: usize,
        paging_limit: usize,
    ) -> Future<ParameterResponseListResponse> {
        filter.without_methods = true;
        filter.only_methods = false;
        self.get_all_parameters_internal(filter, paging_offset, paging_limit, true, Vec::new(), true)
    }

    /// All method definitions matching `filter`, paged.
    pub fn get_all_method_definitions(
        self: &Arc<Self>,
        mut filter: ParameterFilter,
        paging_offset: usize,
        paging_limit: usize,
    ) -> Future<ParameterResponseListResponse> {
        filter.only_methods = true;
        filter.without_methods = false;
        self.get_all_parameters_internal(filter, paging_offset, paging_limit, true, Vec::new(), true)
    }

    fn get_all_parameters_internal(
        self: &Arc<Self>,
        filter: ParameterFilter,
        paging_offset: usize,
        paging_limit: usize,
        first_phase: bool,
        dyn_instantiation_responses: Vec<ParameterResponse>,
        only_definitions: bool,
    ) -> Future<ParameterResponseListResponse> {
        debug_assert!(filter.only_methods || filter.without_methods);

        let apply_paging = paging_offset > 0 || paging_limit != usize::MAX;
        let filter_path = !filter.only_subpath.is_empty();

        let (portions, responses, entries_count, ask_dynamic) = {
            let mut state = self.state.lock();

            // gather candidates
            let mut gathered: Vec<CatalogItem> = Vec::new();
            for device_id in state.device_ids() {
                if !filter.device_matches(device_id) {
                    continue;
                }
                let Ok(device) = state.device(device_id) else {
                    continue;
                };
                if filter_path {
                    for index in device.parameter_instances.all_under_subpath(&filter.only_subpath)
                    {
                        gathered.push(catalog_item(device, index));
                    }
                } else {
                    for index in 0..device.parameter_instances.all().len() {
                        gathered.push(catalog_item(device, index));
                    }
                }
            }

            // dynamic instantiation parameters sort last and bypass the
            // filter in the first phase
            let mut instances: Vec<CatalogItem> = Vec::new();
            let mut dynamic_params: Vec<CatalogItem> = Vec::new();
            for entry in gathered {
                if entry.item.definition.value_type == ValueType::Instantiations
                    && entry.item.fixed_value.is_none()
                {
                    dynamic_params.push(entry);
                } else if filter.accepts(&entry) {
                    instances.push(entry);
                }
            }

            let found_dyn = !dynamic_params.is_empty();
            let first_dyn_idx = instances.len();

            if first_phase {
                instances.extend(dynamic_params.iter().cloned());
            } else {
                for entry in &dynamic_params {
                    if filter.accepts_second_phase(entry) {
                        instances.push(entry.clone());
                    }
                }
                // materialize the instances reported by the providers
                for dyn_response in &dyn_instantiation_responses {
                    if dyn_response.status != StatusCode::Success {
                        continue;
                    }
                    let Some(ParameterValue::Instantiations(list)) = &dyn_response.value else {
                        continue;
                    };
                    let Some(response_id) = dyn_response.id else {
                        continue;
                    };
                    let mut materialized: Vec<CatalogItem> = Vec::new();
                    {
                        let device_id = response_id.device;
                        for instantiation in list {
                            let mut internal = ClassInstantiationInternal {
                                id: instantiation.id,
                                classes: instantiation.classes.clone(),
                                ..ClassInstantiationInternal::default()
                            };
                            prepare_class_instantiation(&mut internal, &state.model, false);
                            let definition_ids: Vec<u32> = internal
                                .collected_classes
                                .parameter_definitions
                                .iter()
                                .map(|d| d.id)
                                .collect();
                            let Ok(device) = state.device_mut(device_id) else {
                                continue;
                            };
                            for definition_id in definition_ids {
                                let target = ParameterInstanceId::new(
                                    definition_id,
                                    instantiation.id,
                                    device_id,
                                );
                                if let Some(instance) =
                                    device.parameter_instances.get_instance(&target)
                                {
                                    let entry = CatalogItem {
                                        item: ResolvedItem {
                                            id: instance.id,
                                            path: ParameterInstancePath::new(
                                                instance.id.device.to_string(),
                                                ParameterInstanceCollection::build_parameter_instance_path(instance),
                                            ),
                                            definition: Arc::clone(&instance.definition),
                                            fixed_value: instance.fixed_value.clone(),
                                            provider: instance.provider.clone(),
                                            status_unavailable_if_not_provided: instance
                                                .status_unavailable_if_not_provided,
                                        },
                                        is_placeholder: false,
                                    };
                                    materialized.push(entry);
                                }
                            }
                        }
                    }
                    for entry in materialized {
                        if filter.accepts_second_phase(&entry) {
                            instances.push(entry);
                        }
                    }
                }
            }

            let entries_count = instances.len();
            let mut ask_dynamic = false;
            let mut window: Vec<CatalogItem> = Vec::new();

            if apply_paging {
                if (!found_dyn || !first_phase) && paging_offset >= entries_count {
                    let mut response =
                        ParameterResponseListResponse::new(StatusCode::Success);
                    response.total_entries = entries_count;
                    return resolved_future(response);
                }
                let max_to_get = paging_limit.min(entries_count);
                let last_idx_exclusive = (paging_offset + max_to_get).min(entries_count);
                ask_dynamic = first_phase && found_dyn && first_dyn_idx < last_idx_exclusive;
                if !ask_dynamic {
                    window = instances[paging_offset.min(entries_count)..last_idx_exclusive]
                        .to_vec();
                }
            } else {
                ask_dynamic = first_phase && found_dyn;
                if !ask_dynamic {
                    window = instances;
                }
            }

            if ask_dynamic {
                // find out all dynamic instantiations first, unpaged
                let items: Vec<Option<ResolvedItem>> =
                    dynamic_params.iter().map(|e| Some(e.item.clone())).collect();
                let mut responses = vec![ParameterResponse::default(); items.len()];
                let portions =
                    Self::prepare_get_parameters(&items, &mut responses, false);
                (portions, responses, entries_count, true)
            } else {
                let items: Vec<Option<ResolvedItem>> =
                    window.iter().map(|e| Some(e.item.clone())).collect();
                let mut responses = vec![ParameterResponse::default(); items.len()];
                let portions =
                    Self::prepare_get_parameters(&items, &mut responses, only_definitions);
                (portions, responses, entries_count, false)
            }
        };

        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");

        let read_future = self.dispatch_read_portions(portions, responses);
        if ask_dynamic {
            let service = Arc::clone(self);
            {
                let promise = Arc::clone(&promise);
                read_future.set_error_notifier(move |err| {
                    let _ = promise.set_error(err);
                });
            }
            read_future.set_notifier(move |dyn_responses: Vec<ParameterResponse>| {
                let second = service.get_all_parameters_internal(
                    filter,
                    paging_offset,
                    paging_limit,
                    false,
                    dyn_responses.clone(),
                    only_definitions,
                );
                {
                    let promise = Arc::clone(&promise);
                    second.set_error_notifier(move |err| {
                        let _ = promise.set_error(err);
                    });
                }
                second.set_notifier(move |mut response: ParameterResponseListResponse| {
                    // keep the first pass's instantiation values so the
                    // materialized instances stay consistent with them
                    for dyn_response in &dyn_responses {
                        if dyn_response.status != StatusCode::Success {
                            continue;
                        }
                        let Some(dyn_id) = dyn_response.id else { continue };
                        for item in &mut response.param_responses {
                            if item.id.is_some_and(|id| id.id == dyn_id.id) {
                                item.value = dyn_response.value.clone();
                                break;
                            }
                        }
                    }
                    let _ = promise.set_value(response);
                });
            });
        } else {
            {
                let promise = Arc::clone(&promise);
                read_future.set_error_notifier(move |err| {
                    let _ = promise.set_error(err);
                });
            }
            read_future.set_notifier(move |responses: Vec<ParameterResponse>| {
                let mut response = ParameterResponseListResponse::new(StatusCode::Success);
                response.param_responses = responses;
                response.total_entries = entries_count;
                let _ = promise.set_value(response);
            });
        }
        future
    }
}

fn device_response(device: &Device) -> DeviceResponse {
    DeviceResponse {
        status: StatusCode::Success,
        message: String::new(),
        id: Some(device.id),
        order_number: device.order_number().to_string(),
        firmware_version: device.firmware_version().to_string(),
        has_beta_parameters: device.has_beta_parameters,
        has_deprecated_parameters: device.has_deprecated_parameters,
    }
}

/// Recursively builds feature infos, restricted to the definitions the
/// device actually collected.
fn build_feature_infos(
    state: &ServiceState,
    device_id: DeviceId,
    feature_names: &[String],
) -> Vec<DeviceFeatureInformation> {
    let Ok(device) = state.device(device_id) else {
        return Vec::new();
    };
    let collected = &device.collected_features.resolved_parameter_definitions;

    let mut result = Vec::new();
    for name in feature_names {
        let Some(feature) = state.model.find_feature_definition(name) else {
            continue;
        };
        let mut info = DeviceFeatureInformation {
            name: feature.name.clone(),
            is_beta: feature.is_beta,
            is_deprecated: feature.is_deprecated,
            ..DeviceFeatureInformation::default()
        };
        for definition in &feature.parameter_definitions {
            if let Some(collected_def) = collected.iter().find(|d| d.id == definition.id) {
                info.parameter_definitions.push(Arc::clone(collected_def));
            }
        }
        info.includes = build_feature_infos(state, device_id, &feature.includes);
        result.push(info);
    }
    if result.is_empty() && !feature_names.is_empty() {
        error!("No feature information available for requested names");
    }
    result
}
