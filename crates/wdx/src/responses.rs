// SPDX-License-Identifier: MPL-2.0

//! Response records for every request family.
//!
//! All batched calls answer positionally: response index N belongs to request
//! index N. Every record carries its own [`StatusCode`] plus an optional
//! human-readable message and a provider-defined domain-specific code.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::model::definitions::{EnumDefinition, ParameterDefinition};
use crate::model::types::{DeviceId, ParameterInstanceId, ParameterInstancePath};
use crate::model::value::ParameterValue;
use crate::status::StatusCode;

/// Opaque file-transfer handle (`"file"` + 8 base-36 characters).
pub type FileId = String;

/// Monitoring-list handle.
pub type MonitoringListId = u64;

macro_rules! impl_status_helpers {
    ($($ty:ty),+ $(,)?) => {
        $(impl $ty {
            /// True once any determination has been made.
            pub fn is_determined(&self) -> bool {
                self.status.is_determined()
            }

            /// True for the success family.
            pub fn is_success(&self) -> bool {
                self.status.is_success()
            }

            /// True for determined non-success statuses.
            pub fn has_error(&self) -> bool {
                self.status.is_error()
            }
        })+
    };
}

/// Plain status-only response.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            message: String::new(),
            domain_specific_status_code: None,
        }
    }

    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        Response {
            status,
            message: message.into(),
            domain_specific_status_code: None,
        }
    }
}

/// One item of a batched read (or definitions-only read).
#[derive(Debug, Clone, Default)]
pub struct ParameterResponse {
    pub id: Option<ParameterInstanceId>,
    pub path: Option<ParameterInstancePath>,
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    pub value: Option<ParameterValue>,
    pub definition: Option<Arc<ParameterDefinition>>,
}

impl ParameterResponse {
    pub fn new(status: StatusCode) -> Self {
        ParameterResponse {
            status,
            ..ParameterResponse::default()
        }
    }
}

/// One item of a provider's read answer, positionally aligned with the ids
/// the provider was asked for.
#[derive(Debug, Clone, Default)]
pub struct ValueResponse {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    pub value: Option<ParameterValue>,
}

impl ValueResponse {
    pub fn success(value: ParameterValue) -> Self {
        ValueResponse {
            status: StatusCode::Success,
            value: Some(value),
            ..ValueResponse::default()
        }
    }

    pub fn error(status: StatusCode) -> Self {
        ValueResponse {
            status,
            ..ValueResponse::default()
        }
    }
}

/// One item of a batched write answer.
#[derive(Debug, Clone, Default)]
pub struct SetParameterResponse {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    /// Providers may echo the effectively applied value.
    pub value: Option<ParameterValue>,
}

impl SetParameterResponse {
    pub fn new(status: StatusCode) -> Self {
        SetParameterResponse {
            status,
            ..SetParameterResponse::default()
        }
    }
}

/// Provider-side method result with positional out-arguments.
#[derive(Debug, Clone, Default)]
pub struct MethodInvocationResponse {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    pub out_args: Vec<Option<ParameterValue>>,
}

impl MethodInvocationResponse {
    pub fn new(status: StatusCode) -> Self {
        MethodInvocationResponse {
            status,
            ..MethodInvocationResponse::default()
        }
    }
}

/// Front-end-side method result with named out-arguments.
#[derive(Debug, Clone, Default)]
pub struct MethodInvocationNamedResponse {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    pub out_args: BTreeMap<String, ParameterValue>,
}

impl MethodInvocationNamedResponse {
    pub fn new(status: StatusCode) -> Self {
        MethodInvocationNamedResponse {
            status,
            ..MethodInvocationNamedResponse::default()
        }
    }

    pub fn with_message(status: StatusCode, message: impl Into<String>) -> Self {
        MethodInvocationNamedResponse {
            status,
            message: message.into(),
            ..MethodInvocationNamedResponse::default()
        }
    }
}

/// Device catalog entry.
#[derive(Debug, Clone, Default)]
pub struct DeviceResponse {
    pub status: StatusCode,
    pub message: String,
    pub id: Option<DeviceId>,
    pub order_number: String,
    pub firmware_version: String,
    pub has_beta_parameters: bool,
    pub has_deprecated_parameters: bool,
}

/// Devices of one or all collections.
#[derive(Debug, Clone, Default)]
pub struct DeviceCollectionResponse {
    pub status: StatusCode,
    pub devices: Vec<DeviceResponse>,
}

impl DeviceCollectionResponse {
    pub fn new(status: StatusCode) -> Self {
        DeviceCollectionResponse {
            status,
            devices: Vec::new(),
        }
    }
}

/// Feature info as exposed to front ends, recursively including included
/// features.
#[derive(Debug, Clone, Default)]
pub struct DeviceFeatureInformation {
    pub name: String,
    pub is_beta: bool,
    pub is_deprecated: bool,
    pub parameter_definitions: Vec<Arc<ParameterDefinition>>,
    pub includes: Vec<DeviceFeatureInformation>,
}

/// Features of one device.
#[derive(Debug, Clone, Default)]
pub struct FeatureListResponse {
    pub status: StatusCode,
    pub device_path: String,
    pub features: Vec<DeviceFeatureInformation>,
}

/// One feature definition of one device.
#[derive(Debug, Clone, Default)]
pub struct FeatureResponse {
    pub status: StatusCode,
    pub device_path: String,
    pub feature: Option<DeviceFeatureInformation>,
}

/// One enum definition.
#[derive(Debug, Clone, Default)]
pub struct EnumDefinitionResponse {
    pub status: StatusCode,
    pub definition: Option<Arc<EnumDefinition>>,
}

/// Filtered/paged catalog read result.
#[derive(Debug, Clone, Default)]
pub struct ParameterResponseListResponse {
    pub status: StatusCode,
    pub param_responses: Vec<ParameterResponse>,
    /// Total matching entries before paging. Not accurate until the paging
    /// window has reached the dynamic-instantiation tail.
    pub total_entries: usize,
}

impl ParameterResponseListResponse {
    pub fn new(status: StatusCode) -> Self {
        ParameterResponseListResponse {
            status,
            ..ParameterResponseListResponse::default()
        }
    }
}

/// Monitoring-list descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringListInfo {
    pub id: MonitoringListId,
    pub timeout_seconds: u16,
    pub parameter_count: usize,
}

/// Monitoring-list creation/lookup answer.
#[derive(Debug, Clone, Default)]
pub struct MonitoringListResponse {
    pub status: StatusCode,
    pub monitoring_list: Option<MonitoringListInfo>,
}

impl MonitoringListResponse {
    pub fn new(status: StatusCode) -> Self {
        MonitoringListResponse {
            status,
            monitoring_list: None,
        }
    }
}

/// Values read through a monitoring list.
#[derive(Debug, Clone, Default)]
pub struct MonitoringListValuesResponse {
    pub status: StatusCode,
    pub values: Vec<ParameterResponse>,
}

impl MonitoringListValuesResponse {
    pub fn new(status: StatusCode) -> Self {
        MonitoringListValuesResponse {
            status,
            values: Vec::new(),
        }
    }

    pub fn with_values(values: Vec<ParameterResponse>) -> Self {
        MonitoringListValuesResponse {
            status: StatusCode::Success,
            values,
        }
    }
}

/// All live monitoring lists.
#[derive(Debug, Clone, Default)]
pub struct MonitoringListsResponse {
    pub status: StatusCode,
    pub monitoring_lists: Vec<MonitoringListInfo>,
}

/// File read result.
#[derive(Debug, Clone, Default)]
pub struct FileReadResponse {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    pub data: Vec<u8>,
}

impl FileReadResponse {
    pub fn new(status: StatusCode) -> Self {
        FileReadResponse {
            status,
            ..FileReadResponse::default()
        }
    }
}

/// File metadata.
#[derive(Debug, Clone, Default)]
pub struct FileInfoResponse {
    pub status: StatusCode,
    pub message: String,
    pub domain_specific_status_code: Option<i32>,
    pub size: u64,
}

impl FileInfoResponse {
    pub fn new(status: StatusCode) -> Self {
        FileInfoResponse {
            status,
            ..FileInfoResponse::default()
        }
    }
}

/// Upload-id negotiation answer.
#[derive(Debug, Clone, Default)]
pub struct FileIdResponse {
    pub status: StatusCode,
    pub message: String,
    pub registered_file_id: FileId,
}

impl FileIdResponse {
    pub fn new(status: StatusCode) -> Self {
        FileIdResponse {
            status,
            ..FileIdResponse::default()
        }
    }

    pub fn with_id(file_id: FileId) -> Self {
        FileIdResponse {
            status: StatusCode::Success,
            message: String::new(),
            registered_file_id: file_id,
        }
    }
}

/// File-provider registration answer.
#[derive(Debug, Clone, Default)]
pub struct RegisterFileProviderResponse {
    pub status: StatusCode,
    pub file_id: FileId,
}

impl RegisterFileProviderResponse {
    pub fn new(status: StatusCode) -> Self {
        RegisterFileProviderResponse {
            status,
            file_id: FileId::new(),
        }
    }

    pub fn with_id(file_id: FileId) -> Self {
        RegisterFileProviderResponse {
            status: StatusCode::Success,
            file_id,
        }
    }
}

/// Model text from a model provider.
#[derive(Debug, Clone, Default)]
pub struct WdmResponse {
    pub status: StatusCode,
    pub wdm_content: String,
}

/// Description text from a device description provider; may carry
/// additional model text.
#[derive(Debug, Clone, Default)]
pub struct WddResponse {
    pub status: StatusCode,
    pub content: String,
    pub wdm_content: String,
}

impl_status_helpers!(
    Response,
    ParameterResponse,
    ValueResponse,
    SetParameterResponse,
    MethodInvocationResponse,
    MethodInvocationNamedResponse,
    DeviceResponse,
    DeviceCollectionResponse,
    FeatureListResponse,
    FeatureResponse,
    EnumDefinitionResponse,
    ParameterResponseListResponse,
    MonitoringListResponse,
    MonitoringListValuesResponse,
    MonitoringListsResponse,
    FileReadResponse,
    FileInfoResponse,
    FileIdResponse,
    RegisterFileProviderResponse,
    WdmResponse,
    WddResponse,
);
