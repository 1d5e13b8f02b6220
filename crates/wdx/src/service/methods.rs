// SPDX-License-Identifier: MPL-2.0

//! Method invocation: named-argument marshalling, provider dispatch and
//! out-argument validation.

use log::{debug, error, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::definitions::{MethodArgumentDefinition, ValueType};
use crate::model::types::{ParameterInstanceId, ParameterInstancePath};
use crate::model::validate::check_argument_value;
use crate::model::value::ParameterValue;
use crate::provider::ParameterProvider;
use crate::responses::{MethodInvocationNamedResponse, MethodInvocationResponse};
use crate::service::{ParameterService, ResolvedItem};
use crate::status::StatusCode;
use crate::sync::future::{resolved_future, Future, Promise};

impl ParameterService {
    /// Invokes a method addressed by id.
    pub fn invoke_method(
        self: &Arc<Self>,
        method_id: ParameterInstanceId,
        in_args: BTreeMap<String, ParameterValue>,
    ) -> Future<MethodInvocationNamedResponse> {
        let resolved = {
            let mut state = self.state.lock();
            Self::resolve_id_target(&mut state, method_id)
        };
        match resolved {
            Ok(item) => self.invoke_method_internal(&item, &in_args),
            Err(status) => resolved_future(MethodInvocationNamedResponse::new(status)),
        }
    }

    /// Invokes a method addressed by path.
    pub fn invoke_method_by_path(
        self: &Arc<Self>,
        method_path: ParameterInstancePath,
        in_args: BTreeMap<String, ParameterValue>,
    ) -> Future<MethodInvocationNamedResponse> {
        let resolved = {
            let mut state = self.state.lock();
            Self::resolve_path_target(&mut state, &method_path)
        };
        match resolved {
            Ok(item) => {
                debug!("INVOKE: Preparing requested method {}", method_path.parameter_path);
                self.invoke_method_internal(&item, &in_args)
            }
            Err(status) => {
                debug!("INVOKE: Requested method {status}");
                resolved_future(MethodInvocationNamedResponse::new(status))
            }
        }
    }

    fn invoke_method_internal(
        self: &Arc<Self>,
        item: &ResolvedItem,
        in_args: &BTreeMap<String, ParameterValue>,
    ) -> Future<MethodInvocationNamedResponse> {
        if item.definition.value_type != ValueType::Method {
            debug!("Method {}: not_a_method", item.id);
            return resolved_future(MethodInvocationNamedResponse::new(StatusCode::NotAMethod));
        }
        let Some(provider) = item.provider.clone() else {
            debug!("Method {}: parameter_not_provided", item.id);
            return resolved_future(MethodInvocationNamedResponse::new(
                StatusCode::ParameterNotProvided,
            ));
        };
        let Some(signature) = item.definition.method.clone() else {
            error!("Method definition {} without signature", item.id);
            return resolved_future(MethodInvocationNamedResponse::new(
                StatusCode::InternalError,
            ));
        };

        let positional_args = match process_method_arguments(in_args, &signature.in_args) {
            Ok(args) => args,
            Err(status) => {
                debug!("Method {}: {status}", item.id);
                return resolved_future(MethodInvocationNamedResponse::with_message(
                    status,
                    "Method arguments are invalid according to their definition.",
                ));
            }
        };

        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");

        debug!("Calling {} with method {}", provider.display_name(), item.id);
        let provider_future = provider.invoke_method(item.id, positional_args);

        {
            let promise = Arc::clone(&promise);
            let method_path = item.definition.path.clone();
            provider_future.set_error_notifier(move |err| {
                error!("Exception in ParameterProvider invoke_method '{method_path}': {err}");
                let _ = promise.set_value(MethodInvocationNamedResponse::new(
                    StatusCode::InternalError,
                ));
            });
        }
        let out_signature = signature;
        provider_future.set_notifier(move |provider_response| {
            let response =
                process_method_response(provider_response, &out_signature.out_args);
            debug!("Provider method response -> core result: {}", response.status);
            let _ = promise.set_value(response);
        });

        future
    }
}

/// Maps named in-arguments onto the ordered definition list, filling
/// defaults and validating each value.
fn process_method_arguments(
    in_args: &BTreeMap<String, ParameterValue>,
    definitions: &[MethodArgumentDefinition],
) -> Result<Vec<ParameterValue>, StatusCode> {
    let mut positional = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let value = match in_args.get(&definition.name) {
            Some(value) => value.clone(),
            None => match &definition.default_value {
                Some(default) => default.clone(),
                None => return Err(StatusCode::MissingArgument),
            },
        };
        let status = check_argument_value(Some(&value), definition);
        if status.is_error() {
            warn!(
                "Rejected invalid value for InArg ({}): {status}",
                definition.name
            );
            return Err(status);
        }
        positional.push(value);
    }
    Ok(positional)
}

/// Copies the provider response, validating out-arguments against the
/// definition order and count.
fn process_method_response(
    response: MethodInvocationResponse,
    out_definitions: &[MethodArgumentDefinition],
) -> MethodInvocationNamedResponse {
    let mut result = MethodInvocationNamedResponse::new(response.status);
    result.domain_specific_status_code = response.domain_specific_status_code;
    result.message = response.message;

    if result.has_error() {
        return result;
    }
    if !result.is_determined() {
        result.status = StatusCode::ParameterNotProvided;
        result.message = "Associated parameter provider did not handle this method.".into();
        return result;
    }

    if response.out_args.len() != out_definitions.len() {
        error!(
            "ParameterProvider returned wrong number ({}) of OutArgs (expected {})",
            response.out_args.len(),
            out_definitions.len()
        );
        result.status = StatusCode::InternalError;
        return result;
    }

    for (definition, out_arg) in out_definitions.iter().zip(response.out_args) {
        let validation = check_argument_value(out_arg.as_ref(), definition);
        if validation.is_error() {
            error!(
                "ParameterProvider returned invalid value for OutArg {}: {validation}",
                definition.name
            );
            // one invalid out-arg defines the status, the remaining
            // out-args still become part of the response
            result.status = StatusCode::InternalError;
        } else if let Some(value) = out_arg {
            result.out_args.insert(definition.name.clone(), value);
        }
    }
    result
}
