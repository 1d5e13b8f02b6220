// SPDX-License-Identifier: MPL-2.0

//! The parameter service: device/provider registries and the request
//! dispatcher.
//!
//! Locking discipline: one mutex (`state`) covers the model, the device
//! collections and the monitoring lists; the file-provider set and the
//! upload-id table have their own locks. Mutexes are held only for in-memory
//! resolution and bookkeeping - every provider call is issued with no core
//! lock held, so providers may re-enter the service without deadlocking.
//! Provider futures deliver on provider-chosen threads; per batch, partial
//! results are integrated strictly in portion order by chaining notifiers,
//! and the final response is published exactly once.

mod catalog;
mod files;
mod integrate;
mod methods;
mod monitoring;
mod read;
mod reaper;
mod registration;
mod runs;
mod write;

pub use catalog::ParameterFilter;
pub use files::{RegisterFileProviderRequest, ReregisterFileProviderRequest};
pub use monitoring::MonitoringListCollection;
pub use reaper::LapseReaper;
pub use runs::{MethodRunInfo, ReadyHandler, RunObjectManager, MAX_METHOD_RUNS};
pub use write::ValuePathRequest;

pub(crate) use integrate::{integrate_and_subscribe_next, PartialJob};

use parking_lot::Mutex;
use std::sync::Arc;

use dashmap::DashMap;
use log::warn;

use crate::instances::device::Device;
use crate::model::device_model::DeviceModel;
use crate::model::types::{
    device_collections, parse_device_path, DeviceCollectionId, DeviceId, ParameterId,
    ParameterInstanceId, ParameterInstancePath,
};
use crate::model::value::ParameterValue;
use crate::model::definitions::ParameterDefinition;
use crate::provider::{
    DeviceExtensionResponse, DeviceSelector, ParameterProviderRef, ParameterSelector,
    Permissions, ProviderList,
};
use crate::responses::{FileId, ParameterResponse};
use crate::status::StatusCode;

/// Upload-id cap; exceeding yields `upload_id_max_exceeded`.
pub const MAX_UPLOAD_IDS: usize = 100;

/// Registration data of a parameter provider.
#[derive(Clone, Default)]
pub(crate) struct ProviderData {
    pub selectors: Vec<ParameterSelector>,
    /// The original provider when the registered handle is a serializing
    /// wrapper; unregistration accepts either handle.
    pub wrapped: Option<ParameterProviderRef>,
}

/// Registered file provider.
#[derive(Clone)]
pub(crate) struct FileProviderEntry {
    pub id: FileId,
    pub context: ParameterId,
    /// Dispatch target (the serializing wrapper when requested).
    pub provider: crate::provider::FileProviderRef,
    /// Original provider behind a wrapper.
    pub wrapped: Option<crate::provider::FileProviderRef>,
}

/// Live upload-id session.
#[derive(Clone)]
pub(crate) struct UploadIdData {
    pub context: ParameterId,
    pub timeout_seconds: u16,
    pub last_access: std::time::Instant,
    pub creator: ParameterProviderRef,
}

/// Everything guarded by the param mutex.
pub(crate) struct ServiceState {
    pub model: DeviceModel,
    /// Indexed by collection id: root (1 slot), kbus, rlb.
    pub collections: Vec<Vec<Option<Device>>>,
    pub monitoring: MonitoringListCollection,
}

impl ServiceState {
    fn new() -> Self {
        ServiceState {
            model: DeviceModel::new(),
            collections: vec![
                vec![None],
                (0..u8::MAX).map(|_| None).collect(),
                (0..u8::MAX).map(|_| None).collect(),
            ],
            monitoring: MonitoringListCollection::new(),
        }
    }

    pub fn collection(
        &self,
        collection_id: DeviceCollectionId,
    ) -> Result<&Vec<Option<Device>>, StatusCode> {
        if collection_id > device_collections::HIGHEST {
            return Err(StatusCode::InvalidDeviceCollection);
        }
        Ok(&self.collections[collection_id as usize])
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device, StatusCode> {
        let collection = self.collection(id.collection)?;
        let slot = collection
            .get(id.slot as usize)
            .ok_or(StatusCode::InvalidDeviceSlot)?;
        slot.as_ref().ok_or(StatusCode::UnknownDevice)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device, StatusCode> {
        if id.collection > device_collections::HIGHEST {
            return Err(StatusCode::InvalidDeviceCollection);
        }
        let collection = &mut self.collections[id.collection as usize];
        let slot = collection
            .get_mut(id.slot as usize)
            .ok_or(StatusCode::InvalidDeviceSlot)?;
        slot.as_mut().ok_or(StatusCode::UnknownDevice)
    }

    pub fn device_mut_by_path(&mut self, device_path: &str) -> Result<&mut Device, StatusCode> {
        let id = parse_device_path(device_path)?;
        self.device_mut(id)
    }

    pub fn device_by_path(&self, device_path: &str) -> Result<&Device, StatusCode> {
        let id = parse_device_path(device_path)?;
        self.device(id)
    }

    /// Iterates all registered devices.
    pub fn for_each_device(&self, mut f: impl FnMut(&Device)) {
        for collection in &self.collections {
            for device in collection.iter().flatten() {
                f(device);
            }
        }
    }

    /// Device ids of all registered devices.
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids = Vec::new();
        self.for_each_device(|d| ids.push(d.id));
        ids
    }
}

/// One resolved request target, copied out of the instance graph so provider
/// dispatch can run without the state lock.
#[derive(Clone)]
pub(crate) struct ResolvedItem {
    pub id: ParameterInstanceId,
    pub path: ParameterInstancePath,
    pub definition: Arc<ParameterDefinition>,
    pub fixed_value: Option<ParameterValue>,
    pub provider: Option<ParameterProviderRef>,
    pub status_unavailable_if_not_provided: bool,
}

/// The service core.
pub struct ParameterService {
    pub(crate) state: Mutex<ServiceState>,
    pub(crate) providers: ProviderList<dyn crate::provider::ParameterProvider, ProviderData>,
    pub(crate) model_providers: ProviderList<dyn crate::provider::ModelProvider, ()>,
    pub(crate) description_providers:
        ProviderList<dyn crate::provider::DeviceDescriptionProvider, Vec<DeviceSelector>>,
    pub(crate) extension_providers:
        ProviderList<dyn crate::provider::DeviceExtensionProvider, DeviceExtensionResponse>,
    pub(crate) file_providers: Mutex<Vec<FileProviderEntry>>,
    pub(crate) upload_ids: DashMap<FileId, UploadIdData>,
    pub(crate) permissions: Box<dyn Permissions>,
}

impl ParameterService {
    pub fn new(permissions: Box<dyn Permissions>) -> Arc<Self> {
        Arc::new(ParameterService {
            state: Mutex::new(ServiceState::new()),
            providers: ProviderList::new(),
            model_providers: ProviderList::new(),
            description_providers: ProviderList::new(),
            extension_providers: ProviderList::new(),
            file_providers: Mutex::new(Vec::new()),
            upload_ids: DashMap::new(),
            permissions,
        })
    }

    /// Periodic housekeeping: evict lapsed upload ids and monitoring lists.
    pub fn trigger_lapse_checks(&self) {
        self.expire_lapsed_upload_ids_except("");
        self.state.lock().monitoring.cleanup_monitoring_lists();
    }

    // -- target resolution -------------------------------------------------

    /// Resolves one numeric target; on error the response carries the status
    /// and mirrors the id.
    pub(crate) fn resolve_id_target(
        state: &mut ServiceState,
        id: ParameterInstanceId,
    ) -> Result<ResolvedItem, StatusCode> {
        let device = match state.device_mut(id.device) {
            Ok(device) => device,
            Err(status) => return Err(status),
        };
        let Some(instance) = device.parameter_instances.get_instance(&id) else {
            return Err(StatusCode::UnknownParameterId);
        };
        Ok(ResolvedItem {
            id: instance.id,
            path: ParameterInstancePath::new(
                instance.id.device.to_string(),
                crate::instances::collection::ParameterInstanceCollection::build_parameter_instance_path(instance),
            ),
            definition: Arc::clone(&instance.definition),
            fixed_value: instance.fixed_value.clone(),
            provider: instance.provider.clone(),
            status_unavailable_if_not_provided: instance.status_unavailable_if_not_provided,
        })
    }

    /// Resolves one textual target.
    pub(crate) fn resolve_path_target(
        state: &mut ServiceState,
        path: &ParameterInstancePath,
    ) -> Result<ResolvedItem, StatusCode> {
        let device = match state.device_mut_by_path(&path.device_path) {
            Ok(device) => device,
            Err(status) => return Err(status),
        };
        let Some(instance) = device
            .parameter_instances
            .get_instance_by_path(&path.parameter_path)
        else {
            return Err(StatusCode::UnknownParameterPath);
        };
        Ok(ResolvedItem {
            id: instance.id,
            path: ParameterInstancePath::new(
                instance.id.device.to_string(),
                crate::instances::collection::ParameterInstanceCollection::build_parameter_instance_path(instance),
            ),
            definition: Arc::clone(&instance.definition),
            fixed_value: instance.fixed_value.clone(),
            provider: instance.provider.clone(),
            status_unavailable_if_not_provided: instance.status_unavailable_if_not_provided,
        })
    }

    /// Resolves a batch of numeric targets into items and pre-filled
    /// responses (errors determined, ids mirrored).
    pub(crate) fn resolve_id_targets(
        state: &mut ServiceState,
        ids: &[ParameterInstanceId],
        responses: &mut [ParameterResponse],
    ) -> Vec<Option<ResolvedItem>> {
        debug_assert_eq!(ids.len(), responses.len());
        ids.iter()
            .zip(responses.iter_mut())
            .map(|(id, response)| match Self::resolve_id_target(state, *id) {
                Ok(item) => Some(item),
                Err(status) => {
                    response.status = status;
                    response.id = Some(*id);
                    None
                }
            })
            .collect()
    }

    /// Resolves a batch of textual targets.
    pub(crate) fn resolve_path_targets(
        state: &mut ServiceState,
        paths: &[ParameterInstancePath],
        responses: &mut [ParameterResponse],
    ) -> Vec<Option<ResolvedItem>> {
        debug_assert_eq!(paths.len(), responses.len());
        paths
            .iter()
            .zip(responses.iter_mut())
            .map(|(path, response)| match Self::resolve_path_target(state, path) {
                Ok(item) => Some(item),
                Err(status) => {
                    response.status = status;
                    response.path = Some(path.clone());
                    None
                }
            })
            .collect()
    }

    // -- permissions -------------------------------------------------------

    /// Expands a user's feature grants through resolved feature includes.
    pub fn get_full_user_permissions(&self, user_name: &str) -> crate::provider::UserPermissions {
        let mut permissions = self.permissions.get_user_permissions(user_name);
        let state = self.state.lock();
        for set in [
            &mut permissions.read_permissions,
            &mut permissions.write_permissions,
        ] {
            let original: Vec<String> = set.iter().cloned().collect();
            for feature_name in original {
                if let Some(feature) = state.model.find_feature_definition(&feature_name) {
                    for included in &feature.resolved_includes {
                        set.insert(included.clone());
                    }
                }
            }
        }
        permissions
    }

    pub fn get_permission_name(
        &self,
        feature: &str,
        permission_type: crate::provider::PermissionType,
    ) -> String {
        self.permissions.get_permission_name(feature, permission_type)
    }

    // -- helpers shared by the dispatch paths ------------------------------

    /// Providers backing each path (IPC bridge helper).
    pub fn get_parameter_providers(
        &self,
        paths: Vec<ParameterInstancePath>,
    ) -> Vec<Option<ParameterProviderRef>> {
        let mut state = self.state.lock();
        paths
            .iter()
            .map(|path| {
                Self::resolve_path_target(&mut state, path)
                    .ok()
                    .and_then(|item| item.provider)
            })
            .collect()
    }

    pub(crate) fn log_unmatched_unprovide(found_any: bool) {
        if !found_any {
            warn!("Found no parameter instance to unprovide");
        }
    }
}

// Registration of devices and providers lives in `registration.rs`; the
// dispatch paths live in `read.rs` / `write.rs` / `methods.rs`; sessions in
// `monitoring.rs` / `files.rs` / `runs.rs`; catalog reads in `catalog.rs`.

pub use registration::RegisterDeviceRequest;
