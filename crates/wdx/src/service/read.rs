// SPDX-License-Identifier: MPL-2.0

//! Read path: resolve targets, answer fixed values, partition the rest into
//! per-provider portions, issue the calls concurrently and integrate the
//! partial results sequentially into one positional response vector.

use log::{debug, error, warn};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::model::definitions::{ParameterDefinition, ValueType};
use crate::model::resolver::prepare_class_instantiation;
use crate::model::definitions::ClassInstantiationInternal;
use crate::model::types::{ParameterInstanceId, ParameterInstancePath};
use crate::model::validate::check_parameter_value;
use crate::model::value::{ClassInstantiation, ParameterValue};
use crate::provider::{ParameterProvider, ParameterProviderRef};
use crate::responses::{ParameterResponse, ValueResponse};
use crate::service::{
    integrate_and_subscribe_next, ParameterService, PartialJob, ResolvedItem,
};
use crate::status::StatusCode;
use crate::sync::future::{Future, Promise};

/// Per-provider slice of a batched read.
pub(crate) struct ReadPortion {
    pub provider: ParameterProviderRef,
    pub ids_to_ask: Vec<ParameterInstanceId>,
    pub definitions_for_validation: Vec<Arc<ParameterDefinition>>,
    pub result_positions: Vec<usize>,
}

impl ParameterService {
    /// Batched read by numeric ids.
    pub fn get_parameters(
        self: &Arc<Self>,
        ids: Vec<ParameterInstanceId>,
    ) -> Future<Vec<ParameterResponse>> {
        let (items, result) = {
            let mut state = self.state.lock();
            let mut result = vec![ParameterResponse::default(); ids.len()];
            let items = Self::resolve_id_targets(&mut state, &ids, &mut result);
            (items, result)
        };
        self.get_parameters_internal(&items, result, false)
    }

    /// Batched read by paths.
    pub fn get_parameters_by_path(
        self: &Arc<Self>,
        paths: Vec<ParameterInstancePath>,
    ) -> Future<Vec<ParameterResponse>> {
        let (items, result) = {
            let mut state = self.state.lock();
            let mut result = vec![ParameterResponse::default(); paths.len()];
            let items = Self::resolve_path_targets(&mut state, &paths, &mut result);
            (items, result)
        };
        self.get_parameters_internal(&items, result, false)
    }

    /// Definition-only read by ids: no provider is contacted.
    pub fn get_parameter_definitions(
        self: &Arc<Self>,
        ids: Vec<ParameterInstanceId>,
    ) -> Future<Vec<ParameterResponse>> {
        let (items, result) = {
            let mut state = self.state.lock();
            let mut result = vec![ParameterResponse::default(); ids.len()];
            let items = Self::resolve_id_targets(&mut state, &ids, &mut result);
            (items, result)
        };
        self.get_parameters_internal(&items, result, true)
    }

    /// Definition-only read by paths.
    pub fn get_parameter_definitions_by_path(
        self: &Arc<Self>,
        paths: Vec<ParameterInstancePath>,
    ) -> Future<Vec<ParameterResponse>> {
        let (items, result) = {
            let mut state = self.state.lock();
            let mut result = vec![ParameterResponse::default(); paths.len()];
            let items = Self::resolve_path_targets(&mut state, &paths, &mut result);
            (items, result)
        };
        self.get_parameters_internal(&items, result, true)
    }

    pub(crate) fn get_parameters_internal(
        self: &Arc<Self>,
        items: &[Option<ResolvedItem>],
        mut result: Vec<ParameterResponse>,
        only_definitions: bool,
    ) -> Future<Vec<ParameterResponse>> {
        let portions = Self::prepare_get_parameters(items, &mut result, only_definitions);
        self.dispatch_read_portions(portions, result)
    }

    /// Fills identifying fields, answers what needs no provider, and
    /// partitions the rest per provider.
    pub(crate) fn prepare_get_parameters(
        items: &[Option<ResolvedItem>],
        responses: &mut [ParameterResponse],
        only_definitions: bool,
    ) -> Vec<ReadPortion> {
        debug_assert_eq!(items.len(), responses.len());
        debug!("READ: Preparing {} requested parameters", items.len());

        let mut portions: Vec<ReadPortion> = Vec::new();

        for (idx, (item, response)) in items.iter().zip(responses.iter_mut()).enumerate() {
            let Some(item) = item else {
                debug!("Instance unresolved for parameter [{idx}]");
                continue;
            };

            response.id = Some(item.id);
            response.path = Some(item.path.clone());

            if response.has_error() {
                debug!("Parameter [{idx}]: {}", response.status);
                continue;
            }

            response.definition = Some(Arc::clone(&item.definition));

            if only_definitions {
                response.status = StatusCode::Success;
                continue;
            }

            if item.definition.value_type == ValueType::Method {
                response.status = StatusCode::MethodsDoNotHaveValue;
                debug!("Parameter [{idx}] {}: {}", item.id, response.status);
                continue;
            }

            if let Some(fixed) = &item.fixed_value {
                response.status = StatusCode::Success;
                response.value = Some(fixed.clone());
                debug!("Parameter [{idx}] {}: fixed value", item.id);
                continue;
            }

            let Some(provider) = &item.provider else {
                response.status = if item.status_unavailable_if_not_provided {
                    StatusCode::StatusValueUnavailable
                } else {
                    StatusCode::ParameterNotProvided
                };
                response.message =
                    "No parameter provider is associated with this parameter.".into();
                debug!("Parameter [{idx}] {}: {}", item.id, response.status);
                continue;
            };

            let portion_idx = match portions
                .iter()
                .position(|p| Arc::ptr_eq(&p.provider, provider))
            {
                Some(existing) => existing,
                None => {
                    portions.push(ReadPortion {
                        provider: Arc::clone(provider),
                        ids_to_ask: Vec::new(),
                        definitions_for_validation: Vec::new(),
                        result_positions: Vec::new(),
                    });
                    portions.len() - 1
                }
            };
            let portion = &mut portions[portion_idx];
            portion.ids_to_ask.push(item.id);
            portion
                .definitions_for_validation
                .push(Arc::clone(&item.definition));
            portion.result_positions.push(idx);
            debug!("Parameter [{idx}] {} -> {}", item.id, provider.display_name());
        }
        portions
    }

    /// Issues the provider calls and chains the integration steps.
    pub(crate) fn dispatch_read_portions(
        self: &Arc<Self>,
        portions: Vec<ReadPortion>,
        mut result: Vec<ParameterResponse>,
    ) -> Future<Vec<ParameterResponse>> {
        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");

        let mut jobs: Vec<Option<PartialJob<Vec<ValueResponse>, Vec<ParameterResponse>>>> =
            Vec::with_capacity(portions.len());

        for portion in portions {
            // tripwire against non-returning providers: only a legitimate
            // provider response overwrites this
            for &position in &portion.result_positions {
                result[position].status = StatusCode::InternalError;
            }

            debug!(
                "Calling ParameterProvider {} with {} parameters",
                portion.provider.display_name(),
                portion.ids_to_ask.len()
            );
            let provider_future = portion.provider.get_parameter_values(portion.ids_to_ask.clone());

            let service = Arc::clone(self);
            let ReadPortion {
                ids_to_ask,
                definitions_for_validation,
                result_positions,
                ..
            } = portion;
            jobs.push(Some(PartialJob::new(
                provider_future,
                move |provider_result: Vec<ValueResponse>,
                      whole_result: &mut Vec<ParameterResponse>| {
                    service.integrate_read_portion(
                        &ids_to_ask,
                        &definitions_for_validation,
                        &result_positions,
                        provider_result,
                        whole_result,
                    );
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

    fn integrate_read_portion(
        &self,
        ids_to_ask: &[ParameterInstanceId],
        definitions: &[Arc<ParameterDefinition>],
        result_positions: &[usize],
        provider_result: Vec<ValueResponse>,
        whole_result: &mut Vec<ParameterResponse>,
    ) {
        for (idx, mut response) in provider_result.into_iter().enumerate() {
            let Some(&position) = result_positions.get(idx) else {
                warn!("ParameterProvider returned more responses than requested, ignoring excess");
                break;
            };
            let definition = &definitions[idx];
            let single_result = &mut whole_result[position];

            if response.is_success() {
                let validation = check_parameter_value(response.value.as_ref(), definition);
                if validation.is_error() {
                    error!(
                        "ParameterProvider returned invalid value for parameter {}: {validation}",
                        ids_to_ask[idx]
                    );
                    single_result.status = StatusCode::InternalError;
                } else {
                    self.process_parameter_response(&mut response);
                    single_result.value = response.value.take();
                    single_result.status = StatusCode::Success;
                }
            } else if response.status == StatusCode::StatusValueUnavailable
                && definition.user_setting
            {
                error!(
                    "ParameterProvider returned invalid status ({}) for user setting {}",
                    response.status, ids_to_ask[idx]
                );
                single_result.status = StatusCode::InternalError;
            } else if response.is_determined() {
                single_result.status = response.status;
                single_result.domain_specific_status_code = response.domain_specific_status_code;
                single_result.message = std::mem::take(&mut response.message);
            } else {
                // the provider did not touch this parameter
                single_result.status = StatusCode::ParameterNotProvided;
                single_result.message =
                    "Associated parameter provider did not handle this parameter.".into();
            }
            debug!(
                "Response [{idx}] from provider -> response [{position}] is {}",
                single_result.status
            );
        }
    }

    /// Re-resolves instantiations values against the live model before they
    /// leave the core.
    pub(crate) fn process_parameter_response(&self, response: &mut ValueResponse) {
        let Some(ParameterValue::Instantiations(instantiations)) = &response.value else {
            return;
        };
        let state = self.state.lock();
        let mut rebuilt: Vec<ClassInstantiation> = Vec::with_capacity(instantiations.len());
        for instantiation in instantiations {
            let mut internal = ClassInstantiationInternal {
                id: instantiation.id,
                classes: instantiation.classes.clone(),
                ..ClassInstantiationInternal::default()
            };
            if !prepare_class_instantiation(&mut internal, &state.model, false) {
                warn!(
                    "Provider reported instantiation {} with classes unknown to the model",
                    instantiation.id
                );
            }
            rebuilt.push(ClassInstantiation {
                id: internal.id,
                classes: internal.classes,
            });
        }
        response.value = Some(ParameterValue::Instantiations(rebuilt));
    }
}
