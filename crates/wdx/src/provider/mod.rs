// SPDX-License-Identifier: MPL-2.0

//! Provider-facing contracts.
//!
//! Providers implement the behavior of parameters, deliver model/description
//! documents, or serve file transfers. The service identifies a provider by
//! its `Arc` pointer; registering the same provider twice is refused.

pub mod list;
pub mod serial_file;
pub mod serial_parameter;

pub use list::ProviderList;
pub use serial_file::SerialFileProvider;
pub use serial_parameter::SerialParameterProvider;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::types::{
    DeviceCollectionId, DeviceId, ParameterId, ParameterInstanceId,
};
use crate::model::value::ParameterValue;
use crate::responses::{
    FileId, FileIdResponse, FileInfoResponse, FileReadResponse, MethodInvocationResponse,
    Response, SetParameterResponse, ValueResponse, WddResponse, WdmResponse,
};
use crate::status::StatusCode;
use crate::sync::future::Future;

/// Selects the devices a provider (or selector) is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Any device.
    Any,
    /// Every device of one collection.
    Collection(DeviceCollectionId),
    /// One specific device.
    Device(DeviceId),
}

impl DeviceSelector {
    /// True when the selector covers `device`.
    pub fn matches(&self, device: DeviceId) -> bool {
        match self {
            DeviceSelector::Any => true,
            DeviceSelector::Collection(collection) => *collection == device.collection,
            DeviceSelector::Device(selected) => *selected == device,
        }
    }
}

/// Selects parameters by definition id, feature name or class name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSelectorKind {
    Definition(ParameterId),
    Feature(String),
    Class(String),
}

/// One parameter selector of a provider registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSelector {
    pub devices: DeviceSelector,
    pub kind: ParameterSelectorKind,
}

impl ParameterSelector {
    pub fn new(devices: DeviceSelector, kind: ParameterSelectorKind) -> Self {
        ParameterSelector { devices, kind }
    }
}

/// Answer of [`ParameterProvider::get_provided_parameters`].
#[derive(Debug, Clone, Default)]
pub struct SelectorResponse {
    pub status: StatusCode,
    pub selected_parameters: Vec<ParameterSelector>,
}

impl SelectorResponse {
    pub fn with_selectors(selected_parameters: Vec<ParameterSelector>) -> Self {
        SelectorResponse {
            status: StatusCode::Success,
            selected_parameters,
        }
    }

    pub fn has_error(&self) -> bool {
        self.status.is_error()
    }
}

/// Answer of [`DeviceDescriptionProvider::get_provided_devices`].
#[derive(Debug, Clone, Default)]
pub struct ProvidedDevicesResponse {
    pub status: StatusCode,
    pub selected_devices: Vec<DeviceSelector>,
}

impl ProvidedDevicesResponse {
    pub fn has_error(&self) -> bool {
        self.status.is_error()
    }
}

/// Answer of [`DeviceExtensionProvider::get_device_extensions`].
#[derive(Debug, Clone)]
pub struct DeviceExtensionResponse {
    pub status: StatusCode,
    pub selected_devices: DeviceSelector,
    pub extension_features: Vec<String>,
}

impl Default for DeviceExtensionResponse {
    fn default() -> Self {
        DeviceExtensionResponse {
            status: StatusCode::NoErrorYet,
            selected_devices: DeviceSelector::Any,
            extension_features: Vec::new(),
        }
    }
}

impl DeviceExtensionResponse {
    pub fn has_error(&self) -> bool {
        self.status.is_error()
    }
}

/// A single value write request, positionally aligned with its response.
#[derive(Debug, Clone)]
pub struct ValueRequest {
    pub id: ParameterInstanceId,
    pub value: Option<ParameterValue>,
}

impl ValueRequest {
    pub fn new(id: ParameterInstanceId, value: Option<ParameterValue>) -> Self {
        ValueRequest { id, value }
    }
}

/// Call mode chosen at provider registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderCallMode {
    /// The provider tolerates concurrent calls.
    #[default]
    Concurrent,
    /// The provider must see at most one outstanding call; the service wraps
    /// it in a serializing façade.
    Serialized,
}

/// Implements the behavior of a set of parameters.
pub trait ParameterProvider: Send + Sync {
    /// Human-readable name for log lines.
    fn display_name(&self) -> String;

    /// The selectors describing what this provider serves. Called once at
    /// registration; errors bring the provider to `provider_not_operational`.
    fn get_provided_parameters(&self) -> SelectorResponse;

    /// Reads values; the response vector is positionally aligned with `ids`.
    fn get_parameter_values(&self, ids: Vec<ParameterInstanceId>) -> Future<Vec<ValueResponse>>;

    /// Writes values; `defer_wda_connection_changes` asks the provider to
    /// stage changes that would affect the control channel.
    fn set_parameter_values_connection_aware(
        &self,
        requests: Vec<ValueRequest>,
        defer_wda_connection_changes: bool,
    ) -> Future<Vec<SetParameterResponse>>;

    /// Invokes a method with positional in-arguments.
    fn invoke_method(
        &self,
        method_id: ParameterInstanceId,
        in_args: Vec<ParameterValue>,
    ) -> Future<MethodInvocationResponse>;

    /// Negotiates a fresh upload id for the given context parameter.
    fn create_parameter_upload_id(&self, context: ParameterId) -> Future<FileIdResponse>;

    /// Releases an upload id (explicitly or on lapse).
    fn remove_parameter_upload_id(&self, id: FileId, context: ParameterId) -> Future<Response>;
}

/// Shared handle to a parameter provider.
pub type ParameterProviderRef = Arc<dyn ParameterProvider>;

/// Serves exactly one file.
pub trait FileProvider: Send + Sync {
    /// Reads `length` bytes starting at `offset`.
    fn read(&self, offset: u64, length: usize) -> Future<FileReadResponse>;
    /// Writes `data` starting at `offset`.
    fn write(&self, offset: u64, data: Vec<u8>) -> Future<Response>;
    /// Reports file metadata.
    fn get_file_info(&self) -> Future<FileInfoResponse>;
    /// Prepares the file for writing up to `capacity` bytes.
    fn create(&self, capacity: u64) -> Future<Response>;
}

/// Shared handle to a file provider.
pub type FileProviderRef = Arc<dyn FileProvider>;

/// Delivers WDM model text.
pub trait ModelProvider: Send + Sync {
    fn get_model_information(&self) -> Future<WdmResponse>;
}

/// Shared handle to a model provider.
pub type ModelProviderRef = Arc<dyn ModelProvider>;

/// Delivers per-device WDD text.
pub trait DeviceDescriptionProvider: Send + Sync {
    /// The devices this provider can describe.
    fn get_provided_devices(&self) -> ProvidedDevicesResponse;
    /// Description for one device, selected by order number and firmware
    /// version. The answer may also carry model text.
    fn get_device_information(
        &self,
        order_number: String,
        firmware_version: String,
    ) -> Future<WddResponse>;
}

/// Shared handle to a device description provider.
pub type DeviceDescriptionProviderRef = Arc<dyn DeviceDescriptionProvider>;

/// Contributes extension features to matching devices.
pub trait DeviceExtensionProvider: Send + Sync {
    fn get_device_extensions(&self) -> DeviceExtensionResponse;
}

/// Shared handle to a device extension provider.
pub type DeviceExtensionProviderRef = Arc<dyn DeviceExtensionProvider>;

/// Feature-level permissions of one user.
#[derive(Debug, Clone, Default)]
pub struct UserPermissions {
    pub read_permissions: BTreeSet<String>,
    pub write_permissions: BTreeSet<String>,
}

/// Kind of permission looked up through [`Permissions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionType {
    Read,
    Write,
}

/// Abstract permission lookup consumed by the service. Enforcement happens
/// in the front ends.
pub trait Permissions: Send + Sync {
    fn get_user_permissions(&self, user_name: &str) -> UserPermissions;
    fn get_permission_name(&self, feature: &str, permission_type: PermissionType) -> String;
}

/// Permission lookup that grants nothing; useful default and test double.
pub struct NoPermissions;

impl Permissions for NoPermissions {
    fn get_user_permissions(&self, _user_name: &str) -> UserPermissions {
        UserPermissions::default()
    }

    fn get_permission_name(&self, feature: &str, permission_type: PermissionType) -> String {
        match permission_type {
            PermissionType::Read => format!("{feature}.read"),
            PermissionType::Write => format!("{feature}.write"),
        }
    }
}
