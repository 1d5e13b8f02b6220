// SPDX-License-Identifier: MPL-2.0

//! File-transfer sessions: file-provider registry, opaque file ids, upload
//! ids with heartbeat-based reaping.

use log::{error, info, warn};
use parking_lot::Mutex as PlMutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::definitions::ValueType;
use crate::model::types::{ParameterId, ParameterInstancePath};
use crate::provider::{
    FileProvider, FileProviderRef, ParameterProvider, ProviderCallMode, SerialFileProvider,
};
use crate::responses::{
    FileId, FileIdResponse, FileInfoResponse, FileReadResponse, RegisterFileProviderResponse,
    Response,
};
use crate::service::{
    integrate_and_subscribe_next, FileProviderEntry, ParameterService, PartialJob, UploadIdData,
    MAX_UPLOAD_IDS,
};
use crate::status::StatusCode;
use crate::sync::future::{map_future, resolved_future, Future, Promise};

/// Registration request for one file provider.
pub struct RegisterFileProviderRequest {
    pub provider: FileProviderRef,
    pub context: ParameterId,
}

/// Re-registration request carrying an already assigned id.
pub struct ReregisterFileProviderRequest {
    pub provider: FileProviderRef,
    pub id: FileId,
    pub context: ParameterId,
}

/// `"file"` + 8 base-36 chars. 36^8 possibilities give a collision
/// probability of ~0.1% for 100000 simultaneously used file ids.
pub(crate) fn generate_file_id() -> FileId {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut id = String::with_capacity(12);
    id.push_str("file");
    for _ in 0..8 {
        id.push(ALPHABET[fastrand::usize(..ALPHABET.len())] as char);
    }
    id
}

impl ParameterService {
    /// Registers file providers, assigning fresh ids.
    pub fn register_file_providers(
        self: &Arc<Self>,
        requests: Vec<RegisterFileProviderRequest>,
        mode: ProviderCallMode,
    ) -> Future<Vec<RegisterFileProviderResponse>> {
        let mut result = Vec::with_capacity(requests.len());
        let mut entries = self.file_providers.lock();
        for request in requests {
            let id = generate_file_id();
            result.push(self.register_file_provider_locked(
                &mut entries,
                request.provider,
                id,
                request.context,
                mode,
            ));
        }
        resolved_future(result)
    }

    /// Registers file providers under ids assigned earlier (IPC reconnect).
    pub fn reregister_file_providers(
        self: &Arc<Self>,
        requests: Vec<ReregisterFileProviderRequest>,
        mode: ProviderCallMode,
    ) -> Future<Vec<RegisterFileProviderResponse>> {
        let mut result = Vec::with_capacity(requests.len());
        let mut entries = self.file_providers.lock();
        for request in requests {
            result.push(self.register_file_provider_locked(
                &mut entries,
                request.provider,
                request.id,
                request.context,
                mode,
            ));
        }
        resolved_future(result)
    }

    fn register_file_provider_locked(
        &self,
        entries: &mut Vec<FileProviderEntry>,
        provider: FileProviderRef,
        file_id: FileId,
        context: ParameterId,
        mode: ProviderCallMode,
    ) -> RegisterFileProviderResponse {
        if entries.iter().any(|e| e.id == file_id) {
            warn!("Attempting to register file provider for existing file id {file_id}");
            return RegisterFileProviderResponse::new(StatusCode::ProviderNotOperational);
        }
        if self.state.lock().model.find_definition(context).is_none() {
            warn!("Attempting to register file provider with unknown context ({context})");
            return RegisterFileProviderResponse::new(StatusCode::ProviderNotOperational);
        }

        let entry = match mode {
            ProviderCallMode::Serialized => FileProviderEntry {
                id: file_id.clone(),
                context,
                provider: Arc::new(SerialFileProvider::new(Arc::clone(&provider))),
                wrapped: Some(provider),
            },
            ProviderCallMode::Concurrent => FileProviderEntry {
                id: file_id.clone(),
                context,
                provider,
                wrapped: None,
            },
        };
        entries.push(entry);
        RegisterFileProviderResponse::with_id(file_id)
    }

    /// Unregisters by either the registered or the wrapped handle.
    pub fn unregister_file_providers(&self, providers: Vec<FileProviderRef>) {
        let mut entries = self.file_providers.lock();
        for provider in providers {
            let before = entries.len();
            entries.retain(|e| {
                !(Arc::ptr_eq(&e.provider, &provider)
                    || e.wrapped.as_ref().is_some_and(|w| Arc::ptr_eq(w, &provider)))
            });
            if entries.len() == before {
                warn!("Could not unregister file provider, was not found");
            }
        }
    }

    fn file_provider(&self, id: &str) -> Option<FileProviderRef> {
        self.file_providers
            .lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| Arc::clone(&e.provider))
    }

    /// True when the id belongs to a registered file provider.
    pub fn has_file_id(&self, id: &str) -> bool {
        self.file_providers.lock().iter().any(|e| e.id == id)
    }

    /// Owning feature name and class-qualified parameter path of a file id.
    pub fn get_file_context(&self, id: &str) -> (String, String) {
        const UNKNOWN: &str = "<unknown>";
        let context = self
            .file_providers
            .lock()
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.context);
        let Some(context) = context else {
            return (UNKNOWN.into(), UNKNOWN.into());
        };
        let state = self.state.lock();
        let Some(definition) = state.model.find_definition(context) else {
            return (UNKNOWN.into(), UNKNOWN.into());
        };
        let feature = definition
            .feature_name
            .clone()
            .unwrap_or_else(|| UNKNOWN.into());
        let path = match &definition.class_base_path {
            Some(base) => format!("{base}/*/{}", definition.path),
            None => definition.path.clone(),
        };
        (feature, path)
    }

    // -- file operations ---------------------------------------------------

    pub fn file_read(self: &Arc<Self>, id: FileId, offset: u64, length: usize) -> Future<FileReadResponse> {
        self.expire_lapsed_upload_ids_except(&id);
        match self.file_provider(&id) {
            Some(provider) => provider.read(offset, length),
            None => resolved_future(FileReadResponse::new(StatusCode::UnknownFileId)),
        }
    }

    pub fn file_write(self: &Arc<Self>, id: FileId, offset: u64, data: Vec<u8>) -> Future<Response> {
        self.expire_lapsed_upload_ids_except(&id);
        match self.file_provider(&id) {
            Some(provider) => provider.write(offset, data),
            None => resolved_future(Response::new(StatusCode::UnknownFileId)),
        }
    }

    pub fn file_create(self: &Arc<Self>, id: FileId, capacity: u64) -> Future<Response> {
        self.expire_lapsed_upload_ids_except(&id);
        match self.file_provider(&id) {
            Some(provider) => provider.create(capacity),
            None => resolved_future(Response::new(StatusCode::UnknownFileId)),
        }
    }

    pub fn file_get_info(self: &Arc<Self>, id: FileId) -> Future<FileInfoResponse> {
        self.expire_lapsed_upload_ids_except(&id);
        match self.file_provider(&id) {
            Some(provider) => provider.get_file_info(),
            None => resolved_future(FileInfoResponse::new(StatusCode::UnknownFileId)),
        }
    }

    // -- upload ids --------------------------------------------------------

    /// Negotiates an upload id with the provider behind a `file_id`-typed
    /// parameter; the id lapses when no operation touches it within the
    /// timeout window.
    pub fn create_parameter_upload_id(
        self: &Arc<Self>,
        context: ParameterInstancePath,
        timeout_seconds: u16,
    ) -> Future<FileIdResponse> {
        self.expire_lapsed_upload_ids_except("");
        if self.upload_ids.len() >= MAX_UPLOAD_IDS {
            return resolved_future(FileIdResponse::new(StatusCode::UploadIdMaxExceeded));
        }

        let resolved = {
            let mut state = self.state.lock();
            Self::resolve_path_target(&mut state, &context)
        };
        let item = match resolved {
            Ok(item) => item,
            Err(status) => return resolved_future(FileIdResponse::new(status)),
        };
        let Some(provider) = item.provider.clone() else {
            return resolved_future(FileIdResponse::new(StatusCode::ParameterNotProvided));
        };
        if item.definition.value_type != ValueType::FileId {
            return resolved_future(FileIdResponse::new(StatusCode::NotAFileId));
        }

        let context_id = item.definition.id;
        let service = Arc::clone(self);
        map_future(
            provider.create_parameter_upload_id(context_id),
            move |response: FileIdResponse| {
                if response.is_success() {
                    service.upload_ids.insert(
                        response.registered_file_id.clone(),
                        UploadIdData {
                            context: context_id,
                            timeout_seconds,
                            last_access: Instant::now(),
                            creator: provider,
                        },
                    );
                    response
                } else {
                    warn!(
                        "ParameterProvider responded to create_parameter_upload_id with {}",
                        response.status
                    );
                    FileIdResponse::new(StatusCode::ParameterNotProvided)
                }
            },
        )
    }

    /// Releases an upload id explicitly: removes the session and asks its
    /// creator to drop the id.
    pub fn remove_parameter_upload_id(self: &Arc<Self>, id: FileId) -> Future<Response> {
        let Some((id, data)) = self.upload_ids.remove(&id) else {
            return resolved_future(Response::new(StatusCode::UnknownFileId));
        };
        data.creator.remove_parameter_upload_id(id, data.context)
    }

    /// Sweeps the upload-id table: refreshes the heartbeat of
    /// `id_with_heartbeat` and evicts every other id whose inactivity
    /// exceeded its timeout, asking its creator to release it.
    pub(crate) fn expire_lapsed_upload_ids_except(&self, id_with_heartbeat: &str) {
        let now = Instant::now();
        let mut lapsed: Vec<(FileId, UploadIdData)> = Vec::new();

        self.upload_ids.retain(|id, data| {
            if !id_with_heartbeat.is_empty() && id.as_str() == id_with_heartbeat {
                data.last_access = now;
                return true;
            }
            let elapsed = now.saturating_duration_since(data.last_access);
            if elapsed > Duration::from_secs(u64::from(data.timeout_seconds)) {
                warn!("Upload id {id} has lapsed, attempting to clean up");
                lapsed.push((id.clone(), data.clone()));
                false
            } else {
                true
            }
        });

        for (id, data) in lapsed {
            let removal = data.creator.remove_parameter_upload_id(id, data.context);
            removal.set_error_notifier(|_err| {
                error!("ParameterProvider encountered an error during remove_parameter_upload_id");
            });
            removal.set_notifier(|response: Response| {
                if response.is_success() {
                    info!("ParameterProvider responded to remove_parameter_upload_id with success");
                } else {
                    warn!(
                        "ParameterProvider responded to remove_parameter_upload_id with {}",
                        response.status
                    );
                }
            });
        }
    }

    /// Drains all upload ids by asking their creators to release them;
    /// resolves once every provider acknowledged.
    pub fn cleanup(self: &Arc<Self>) -> Future<()> {
        let drained: Vec<(FileId, UploadIdData)> = {
            let mut collected = Vec::new();
            self.upload_ids.retain(|id, data| {
                collected.push((id.clone(), data.clone()));
                false
            });
            collected
        };

        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");

        let mut jobs: Vec<Option<PartialJob<Response, ()>>> = Vec::with_capacity(drained.len());
        for (id, data) in drained {
            let removal = data.creator.remove_parameter_upload_id(id, data.context);
            jobs.push(Some(PartialJob::new(removal, |response: Response, _whole| {
                if response.is_success() {
                    info!("ParameterProvider responded to remove_parameter_upload_id with success");
                } else {
                    warn!(
                        "ParameterProvider responded to remove_parameter_upload_id with {}",
                        response.status
                    );
                }
            })));
        }

        integrate_and_subscribe_next(
            Arc::new(PlMutex::new(jobs)),
            Arc::new(PlMutex::new(Some(()))),
            promise,
            0,
        );
        future
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_file_id_shape() {
        for _ in 0..1000 {
            let id = generate_file_id();
            assert_eq!(id.len(), 12);
            assert!(id.starts_with("file"));
            assert!(id[4..]
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_file_ids_do_not_collide_quickly() {
        // 36^8 id space; at this sample size a collision is practically
        // impossible and would indicate a broken generator
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_file_id()));
        }
    }
}
