// SPDX-License-Identifier: MPL-2.0

//! Write path.
//!
//! Two passes per batch: a pre-check pass (inactive / not writeable / not
//! provided / value validation) and, per provider, a consistency pass for
//! class-instantiation resets. A provider whose portion contains any invalid
//! item receives nothing; its remaining undetermined items are rejected as
//! `other_invalid_value_in_set` so backends never see partially invalid sets.

use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::model::definitions::{ClassDefinition, ParameterDefinition, ValueRank, ValueType};
use crate::model::device_model::DeviceModel;
use crate::model::types::{ParameterInstanceId, ParameterInstancePath};
use crate::model::validate::check_parameter_value;
use crate::model::value::ParameterValue;
use crate::provider::{ParameterProvider, ParameterProviderRef, ValueRequest};
use crate::responses::{ParameterResponse, SetParameterResponse};
use crate::service::{
    integrate_and_subscribe_next, ParameterService, PartialJob, ResolvedItem, ServiceState,
};
use crate::status::StatusCode;
use crate::sync::future::{Future, Promise};

/// A value write addressed by path.
#[derive(Debug, Clone)]
pub struct ValuePathRequest {
    pub path: ParameterInstancePath,
    pub value: Option<ParameterValue>,
}

impl ValuePathRequest {
    pub fn new(path: ParameterInstancePath, value: Option<ParameterValue>) -> Self {
        ValuePathRequest { path, value }
    }
}

/// One class-instantiation reset found in a portion.
struct InstanceReset {
    /// Id of the instantiations parameter instance being written.
    reset_id: ParameterInstanceId,
    /// The class whose instantiations parameter it is.
    base_class: Arc<ClassDefinition>,
    /// Definition of the instantiations parameter (path = class base path).
    definition: Arc<ParameterDefinition>,
}

/// A per-provider write portion ready for dispatch.
struct WritePortion {
    provider: ParameterProviderRef,
    ids_to_write: Vec<ValueRequest>,
    result_positions: Vec<usize>,
}

impl ParameterService {
    /// Batched write by numeric ids.
    pub fn set_parameter_values(
        self: &Arc<Self>,
        value_requests: Vec<ValueRequest>,
    ) -> Future<Vec<SetParameterResponse>> {
        self.set_parameter_values_connection_aware(value_requests, false)
    }

    /// Batched write by ids; `defer_wda_connection_changes` is handed through
    /// to the providers so control-channel changes can be staged.
    pub fn set_parameter_values_connection_aware(
        self: &Arc<Self>,
        value_requests: Vec<ValueRequest>,
        defer_wda_connection_changes: bool,
    ) -> Future<Vec<SetParameterResponse>> {
        let (portions, result) = {
            let mut state = self.state.lock();
            let mut param_responses = vec![ParameterResponse::default(); value_requests.len()];
            let ids: Vec<ParameterInstanceId> =
                value_requests.iter().map(|r| r.id).collect();
            let items = Self::resolve_id_targets(&mut state, &ids, &mut param_responses);
            let values: Vec<Option<ParameterValue>> =
                value_requests.into_iter().map(|r| r.value).collect();
            let result: Vec<SetParameterResponse> = param_responses
                .iter()
                .map(|r| SetParameterResponse::new(r.status))
                .collect();
            prepare_write(&state, &items, &values, result)
        };
        self.dispatch_write_portions(portions, result, defer_wda_connection_changes)
    }

    /// Batched write by paths.
    pub fn set_parameter_values_by_path(
        self: &Arc<Self>,
        value_path_requests: Vec<ValuePathRequest>,
    ) -> Future<Vec<SetParameterResponse>> {
        self.set_parameter_values_by_path_connection_aware(value_path_requests, false)
    }

    /// Batched write by paths with staged control-channel changes.
    pub fn set_parameter_values_by_path_connection_aware(
        self: &Arc<Self>,
        value_path_requests: Vec<ValuePathRequest>,
        defer_wda_connection_changes: bool,
    ) -> Future<Vec<SetParameterResponse>> {
        let (portions, result) = {
            let mut state = self.state.lock();
            let mut param_responses =
                vec![ParameterResponse::default(); value_path_requests.len()];
            let paths: Vec<ParameterInstancePath> = value_path_requests
                .iter()
                .map(|r| r.path.clone())
                .collect();
            let items = Self::resolve_path_targets(&mut state, &paths, &mut param_responses);
            let values: Vec<Option<ParameterValue>> =
                value_path_requests.into_iter().map(|r| r.value).collect();
            let result: Vec<SetParameterResponse> = param_responses
                .iter()
                .map(|r| SetParameterResponse::new(r.status))
                .collect();
            prepare_write(&state, &items, &values, result)
        };
        self.dispatch_write_portions(portions, result, defer_wda_connection_changes)
    }

    fn dispatch_write_portions(
        self: &Arc<Self>,
        portions: Vec<WritePortion>,
        result: Vec<SetParameterResponse>,
        defer_wda_connection_changes: bool,
    ) -> Future<Vec<SetParameterResponse>> {
        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");

        let mut jobs: Vec<
            Option<PartialJob<Vec<SetParameterResponse>, Vec<SetParameterResponse>>>,
        > = Vec::with_capacity(portions.len());

        for portion in portions {
            debug!(
                "Calling ParameterProvider {} with {} parameters",
                portion.provider.display_name(),
                portion.ids_to_write.len()
            );
            let provider_future = portion
                .provider
                .set_parameter_values_connection_aware(
                    portion.ids_to_write,
                    defer_wda_connection_changes,
                );
            let result_positions = portion.result_positions;
            jobs.push(Some(PartialJob::new(
                provider_future,
                move |provider_result: Vec<SetParameterResponse>,
                      whole_result: &mut Vec<SetParameterResponse>| {
                    integrate_write_portion(&result_positions, provider_result, whole_result);
                },
            )));
        }

        integrate_and_subscribe_next(
            Arc::new(Mutex::new(jobs)),
            Arc::new(Mutex::new(Some(result))),
            promise,
            0,
        );
        future
    }
}

fn integrate_write_portion(
    result_positions: &[usize],
    provider_result: Vec<SetParameterResponse>,
    whole_result: &mut Vec<SetParameterResponse>,
) {
    for (idx, response) in provider_result.into_iter().enumerate() {
        let Some(&position) = result_positions.get(idx) else {
            warn!("ParameterProvider returned more set-responses than requested, ignoring excess");
            break;
        };
        let single_result = &mut whole_result[position];
        if response.has_error() {
            single_result.status = response.status;
            single_result.domain_specific_status_code = response.domain_specific_status_code;
            single_result.message = response.message;
        } else if response.is_determined() {
            single_result.status = response.status;
            single_result.value = response.value;
        } else {
            single_result.status = StatusCode::ParameterNotProvided;
            single_result.message =
                "Associated parameter provider did not handle this parameter.".into();
        }
        debug!("Set-response [{idx}] -> position [{position}]: {}", single_result.status);
    }
}

/// Pre-check and consistency passes; returns only dispatchable portions.
fn prepare_write(
    state: &ServiceState,
    items: &[Option<ResolvedItem>],
    values: &[Option<ParameterValue>],
    mut result: Vec<SetParameterResponse>,
) -> (Vec<WritePortion>, Vec<SetParameterResponse>) {
    debug!("WRITE: Preparing {} requested parameters", items.len());

    let mut providers: Vec<ParameterProviderRef> = Vec::new();
    let mut invalid_providers: Vec<ParameterProviderRef> = Vec::new();

    let mut note_invalid = |list: &mut Vec<ParameterProviderRef>, provider: &ParameterProviderRef| {
        if !list.iter().any(|p| Arc::ptr_eq(p, provider)) {
            list.push(Arc::clone(provider));
        }
    };

    // pre-check pass
    for (idx, item) in items.iter().enumerate() {
        if result[idx].is_determined() {
            debug!("Parameter [{idx}]: {}", result[idx].status);
            continue;
        }
        let Some(item) = item else {
            result[idx].status = StatusCode::InternalError;
            continue;
        };

        if item.definition.overrideables.inactive {
            result[idx].status = StatusCode::Ignored;
            result[idx].message =
                "Parameter is inactive according to the device description.".into();
            continue;
        }
        if !item.definition.writeable {
            result[idx].status = StatusCode::ParameterNotWriteable;
            result[idx].message =
                "Parameter is not writeable according to the parameter definition.".into();
            continue;
        }
        let Some(provider) = &item.provider else {
            result[idx].status = StatusCode::ParameterNotProvided;
            result[idx].message =
                "No parameter provider is associated with this parameter.".into();
            continue;
        };

        let validation = check_parameter_value(values[idx].as_ref(), &item.definition);
        if validation.is_error() {
            result[idx].status = validation;
            result[idx].message = "Value is invalid according to the parameter definition.".into();
            warn!("Rejected invalid value for parameter {}: {validation}", item.id);
            note_invalid(&mut invalid_providers, provider);
            continue;
        }

        note_invalid(&mut providers, provider);
    }

    // consistency pass, then dispatch preparation, per provider
    let mut portions = Vec::new();
    for provider in providers {
        let is_invalid =
            |list: &[ParameterProviderRef]| list.iter().any(|p| Arc::ptr_eq(p, &provider));

        let mut ids_to_write: Vec<ValueRequest> = Vec::new();
        let mut result_positions: Vec<usize> = Vec::new();
        let mut resets: Vec<InstanceReset> = Vec::new();
        let mut keys: Vec<(ParameterInstanceId, Arc<ParameterDefinition>)> = Vec::new();

        if !is_invalid(&invalid_providers) {
            debug!("Collecting parameters for provider {}", provider.display_name());
            let mut collect_ok = true;
            for (idx, item) in items.iter().enumerate() {
                if result[idx].is_determined() {
                    continue;
                }
                let Some(item) = item else { continue };
                if !item.provided_by_ref(&provider) {
                    continue;
                }
                let request = ValueRequest::new(item.id, values[idx].clone());
                if item.definition.value_type == ValueType::Instantiations {
                    // instantiations come first
                    ids_to_write.insert(0, request);
                    result_positions.insert(0, idx);
                    let Some(base_class) =
                        class_for_instantiation(&state.model, &item.definition)
                    else {
                        result[idx].status = StatusCode::InternalError;
                        result[idx].message =
                            "Unable to find base class definition for instantiation.".into();
                        note_invalid(&mut invalid_providers, &provider);
                        collect_ok = false;
                        break;
                    };
                    resets.push(InstanceReset {
                        reset_id: item.id,
                        base_class,
                        definition: Arc::clone(&item.definition),
                    });
                } else if item.definition.instance_key {
                    keys.push((item.id, Arc::clone(&item.definition)));
                    ids_to_write.push(request);
                    result_positions.push(idx);
                } else {
                    ids_to_write.push(request);
                    result_positions.push(idx);
                }
            }

            if collect_ok && !resets.is_empty() {
                let checks_ok = check_for_same_base_class(
                    &state.model,
                    &resets,
                    &ids_to_write,
                    &result_positions,
                    &mut result,
                ) && check_values_for_all_new_instances(
                    &state.model,
                    &resets,
                    &ids_to_write,
                    &result_positions,
                    &mut result,
                ) && check_for_instances_extra_values(
                    &state.model,
                    &resets,
                    &ids_to_write,
                    &result_positions,
                    &mut result,
                );
                if !checks_ok {
                    note_invalid(&mut invalid_providers, &provider);
                }
            }

            if collect_ok && !is_invalid(&invalid_providers) {
                // instance keys are only writeable inside a reset of their
                // own class instance set
                let mut removed = Vec::new();
                for (key_id, key_def) in &keys {
                    let covered = resets.iter().any(|reset| {
                        reset.reset_id.device == key_id.device
                            && key_def.class_base_path.as_deref()
                                == Some(reset.definition.path.as_str())
                    });
                    if covered {
                        continue;
                    }
                    if let Some(i) = ids_to_write.iter().position(|r| r.id == *key_id) {
                        let position = result_positions[i];
                        result[position].status = StatusCode::InstanceKeyNotWriteable;
                        result[position].message =
                            "Parameter is not writeable because it is an instance key.".into();
                        debug!("Parameter [{position}] {key_id}: instance_key_not_writeable");
                        removed.push(i);
                    }
                }
                removed.sort_unstable_by(|a, b| b.cmp(a));
                for i in removed {
                    ids_to_write.remove(i);
                    result_positions.remove(i);
                }
            }
        }

        if is_invalid(&invalid_providers) {
            // protect the backend from a partially invalid set
            debug!(
                "Some invalid parameters for provider {}. Rejecting the whole set.",
                provider.display_name()
            );
            for (idx, item) in items.iter().enumerate() {
                if result[idx].is_determined() {
                    continue;
                }
                let Some(item) = item else { continue };
                if item.provided_by_ref(&provider) {
                    result[idx].status = StatusCode::OtherInvalidValueInSet;
                    result[idx].message =
                        "Other parameter values are invalid that might have to be consistent with this value."
                            .into();
                }
            }
            continue;
        }

        // tripwire; only a legitimate provider response overwrites it
        for &position in &result_positions {
            result[position].status = StatusCode::InternalError;
            result[position].message = "Request was not handled.".into();
        }
        portions.push(WritePortion {
            provider,
            ids_to_write,
            result_positions,
        });
    }

    (portions, result)
}

impl ResolvedItem {
    fn provided_by_ref(&self, provider: &ParameterProviderRef) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|p| Arc::ptr_eq(p, provider))
    }
}

/// The class whose instantiations parameter `definition` is.
fn class_for_instantiation(
    model: &DeviceModel,
    definition: &ParameterDefinition,
) -> Option<Arc<ClassDefinition>> {
    if definition.value_type != ValueType::Instantiations
        || definition.value_rank != ValueRank::Scalar
    {
        return None;
    }
    model
        .classes
        .iter()
        .find(|c| c.base_path == definition.path)
        .cloned()
}

fn instantiations_of(request: &ValueRequest) -> &[crate::model::value::ClassInstantiation] {
    match &request.value {
        Some(ParameterValue::Instantiations(list)) => list,
        _ => &[],
    }
}

/// Rule 1: every class named in a new instantiation derives from (or is) the
/// class whose instantiations parameter is being written.
fn check_for_same_base_class(
    model: &DeviceModel,
    resets: &[InstanceReset],
    ids_to_write: &[ValueRequest],
    result_positions: &[usize],
    result: &mut [SetParameterResponse],
) -> bool {
    for reset in resets {
        for (i, request) in ids_to_write.iter().enumerate() {
            if request.id != reset.reset_id {
                continue;
            }
            for instantiation in instantiations_of(request) {
                for class_name in &instantiation.classes {
                    if class_name == &reset.base_class.name {
                        continue;
                    }
                    let derived = model
                        .find_class_definition(class_name)
                        .is_some_and(|c| c.has_ancestor(&reset.base_class.name));
                    if !derived {
                        let position = result_positions[i];
                        result[position].status = StatusCode::InvalidValue;
                        result[position].message = format!(
                            "At least one new class instance has a different base class. First invalid instance found: {class_name}"
                        );
                        warn!(
                            "Rejected invalid reset for instantiations parameter {}: {}",
                            reset.definition.path, result[position].message
                        );
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// Rule 2: every writeable, non-inactive parameter of the instantiated
/// classes must carry a value for every new instance.
fn check_values_for_all_new_instances(
    model: &DeviceModel,
    resets: &[InstanceReset],
    ids_to_write: &[ValueRequest],
    result_positions: &[usize],
    result: &mut [SetParameterResponse],
) -> bool {
    for reset in resets {
        let mut necessary: HashMap<ParameterInstanceId, Vec<Arc<ParameterDefinition>>> =
            HashMap::new();
        let mut new_instances: Vec<ParameterInstanceId> = Vec::new();

        for request in ids_to_write {
            if request.id != reset.reset_id {
                continue;
            }
            // last reset wins in case of multiple reset requests
            new_instances.clear();
            for instantiation in instantiations_of(request) {
                let instance_id = ParameterInstanceId::new(
                    reset.reset_id.id,
                    instantiation.id,
                    reset.reset_id.device,
                );
                new_instances.push(instance_id);
                let needed = necessary.entry(instance_id).or_default();
                needed.clear();
                let mut class_names: HashSet<&str> =
                    instantiation.classes.iter().map(String::as_str).collect();
                class_names.insert(reset.base_class.name.as_str());
                for class_def in &model.classes {
                    if class_names.contains(class_def.name.as_str()) {
                        needed.extend(
                            class_def
                                .parameter_definitions
                                .iter()
                                .filter(|d| d.writeable && !d.overrideables.inactive)
                                .cloned(),
                        );
                    }
                }
            }
        }

        let mut satisfied: HashSet<ParameterInstanceId> = HashSet::new();
        for request in ids_to_write {
            for new_instance in &new_instances {
                let needed = &necessary[new_instance];
                if needed.iter().any(|d| {
                    ParameterInstanceId::new(d.id, new_instance.instance, new_instance.device)
                        == request.id
                }) {
                    satisfied.insert(request.id);
                }
            }
        }

        for new_instance in &new_instances {
            for needed in &necessary[new_instance] {
                let wanted = ParameterInstanceId::new(
                    needed.id,
                    new_instance.instance,
                    reset.reset_id.device,
                );
                if satisfied.contains(&wanted) {
                    continue;
                }
                if let Some(i) = ids_to_write.iter().position(|r| r.id == reset.reset_id) {
                    let position = result_positions[i];
                    result[position].status = StatusCode::MissingParameterForInstantiation;
                    result[position].message = format!(
                        "At least one parameter value is missing for a new class instance. First missing parameter found: {}",
                        needed.path
                    );
                    warn!(
                        "Rejected invalid reset for instantiations parameter {}: {}",
                        reset.definition.path, result[position].message
                    );
                }
                return false;
            }
        }
    }
    true
}

/// Rule 3: no values for parameters of classes that are not part of the new
/// instantiation (and not ancestors of a named class).
fn check_for_instances_extra_values(
    model: &DeviceModel,
    resets: &[InstanceReset],
    ids_to_write: &[ValueRequest],
    result_positions: &[usize],
    result: &mut [SetParameterResponse],
) -> bool {
    let mut check_result = true;
    for reset in resets {
        let mut unnecessary: HashSet<ParameterInstanceId> = HashSet::new();
        for request in ids_to_write {
            if request.id != reset.reset_id {
                continue;
            }
            // last reset wins
            unnecessary.clear();
            for class_def in &model.classes {
                if !class_def.has_ancestor(&reset.base_class.name) {
                    continue;
                }
                for instantiation in instantiations_of(request) {
                    let mut unused_class = true;
                    for class_name in &instantiation.classes {
                        if let Some(named) = model.find_class_definition(class_name) {
                            unused_class = unused_class
                                && named.name != class_def.name
                                && !named.has_ancestor(&class_def.name);
                        }
                    }
                    if unused_class {
                        for param_def in &class_def.parameter_definitions {
                            unnecessary.insert(ParameterInstanceId::new(
                                param_def.id,
                                instantiation.id,
                                reset.reset_id.device,
                            ));
                        }
                    }
                }
            }
        }
        for (i, request) in ids_to_write.iter().enumerate() {
            if unnecessary.contains(&request.id) {
                let position = result_positions[i];
                result[position].status = StatusCode::NotExistingForInstance;
                result[position].message =
                    "This parameter value does not exist for target class instance.".into();
                check_result = false;
            }
        }
    }
    if !check_result {
        error!("Rejected write with values for parameters outside the instantiated classes");
    }
    check_result
}
