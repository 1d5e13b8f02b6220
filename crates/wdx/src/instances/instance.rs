// SPDX-License-Identifier: MPL-2.0

//! A bound parameter instance.

use std::sync::Arc;

use crate::model::definitions::ParameterDefinition;
use crate::model::types::ParameterInstanceId;
use crate::model::value::ParameterValue;
use crate::provider::ParameterProviderRef;

/// One live parameter instance of a device.
#[derive(Clone)]
pub struct ParameterInstance {
    pub id: ParameterInstanceId,
    /// Shared definition, possibly an override-layered clone.
    pub definition: Arc<ParameterDefinition>,
    /// Shortcut value for read-only / inactive / builtin parameters; a set
    /// fixed value answers reads without a provider call.
    pub fixed_value: Option<ParameterValue>,
    /// Bound provider; writable only under the service's param mutex.
    pub provider: Option<ParameterProviderRef>,
    /// Report `status_value_unavailable` instead of `parameter_not_provided`
    /// while no provider is bound.
    pub status_unavailable_if_not_provided: bool,
}

impl ParameterInstance {
    pub fn new(id: ParameterInstanceId, definition: Arc<ParameterDefinition>) -> Self {
        ParameterInstance {
            id,
            definition,
            fixed_value: None,
            provider: None,
            status_unavailable_if_not_provided: false,
        }
    }

    /// True when `provider` is the instance's bound provider.
    pub fn provided_by(&self, provider: &ParameterProviderRef) -> bool {
        self.provider
            .as_ref()
            .is_some_and(|bound| Arc::ptr_eq(bound, provider))
    }
}

impl std::fmt::Debug for ParameterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterInstance")
            .field("id", &self.id)
            .field("path", &self.definition.path)
            .field("fixed", &self.fixed_value.is_some())
            .field("provided", &self.provider.is_some())
            .finish()
    }
}

/// A value declared for an instance by a WDD (or forced by the service).
#[derive(Debug, Clone, Default)]
pub struct ValueDeclaration {
    pub id: Option<ParameterInstanceId>,
    pub value: Option<ParameterValue>,
    pub status_unavailable_if_not_provided: bool,
}

impl ValueDeclaration {
    pub fn new(id: ParameterInstanceId, value: Option<ParameterValue>) -> Self {
        ValueDeclaration {
            id: Some(id),
            value,
            status_unavailable_if_not_provided: false,
        }
    }
}

/// Finds the declaration matching `id`, ignoring the device part.
pub fn find_value_declaration<'a>(
    values: &'a [ValueDeclaration],
    id: &ParameterInstanceId,
) -> Option<&'a ValueDeclaration> {
    values
        .iter()
        .find(|v| v.id.as_ref().is_some_and(|vid| vid.equals_ignoring_device(id)))
}
