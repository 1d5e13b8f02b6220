// SPDX-License-Identifier: MPL-2.0

//! Shared test doubles: scriptable parameter/description/file providers and
//! a small device model.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use wdx::model::{ParameterId, ParameterInstanceId, ParameterValue};
use wdx::provider::{
    DeviceDescriptionProvider, DeviceSelector, FileProvider, ParameterProvider,
    ParameterSelector, ParameterSelectorKind, ProvidedDevicesResponse, SelectorResponse,
    ValueRequest,
};
use wdx::responses::{
    FileId, FileIdResponse, FileInfoResponse, FileReadResponse, MethodInvocationResponse,
    Response, SetParameterResponse, ValueResponse, WddResponse,
};
use wdx::sync::{resolved_future, Future, Promise};
use wdx::StatusCode;

/// Scriptable parameter provider answering from a value table.
pub struct MockProvider {
    name: String,
    selectors: Vec<ParameterSelector>,
    pub values: Mutex<HashMap<ParameterId, ParameterValue>>,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub invoke_calls: AtomicUsize,
    pub last_set_requests: Mutex<Vec<ValueRequest>>,
    pub last_defer_flag: Mutex<Option<bool>>,
    pub removed_upload_ids: Mutex<Vec<FileId>>,
    upload_counter: AtomicUsize,
    /// When set, invoke_method returns this future instead of an immediate
    /// success.
    pub pending_invocation: Mutex<Option<Future<MethodInvocationResponse>>>,
}

impl MockProvider {
    pub fn new(name: &str, selectors: Vec<ParameterSelector>) -> Arc<Self> {
        Arc::new(MockProvider {
            name: name.to_string(),
            selectors,
            values: Mutex::new(HashMap::new()),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
            invoke_calls: AtomicUsize::new(0),
            last_set_requests: Mutex::new(Vec::new()),
            last_defer_flag: Mutex::new(None),
            removed_upload_ids: Mutex::new(Vec::new()),
            upload_counter: AtomicUsize::new(0),
            pending_invocation: Mutex::new(None),
        })
    }

    pub fn for_definitions(name: &str, ids: &[ParameterId]) -> Arc<Self> {
        let selectors = ids
            .iter()
            .map(|id| {
                ParameterSelector::new(DeviceSelector::Any, ParameterSelectorKind::Definition(*id))
            })
            .collect();
        MockProvider::new(name, selectors)
    }

    pub fn for_class(name: &str, class: &str) -> Arc<Self> {
        MockProvider::new(
            name,
            vec![ParameterSelector::new(
                DeviceSelector::Any,
                ParameterSelectorKind::Class(class.to_string()),
            )],
        )
    }

    pub fn set_answer(&self, id: ParameterId, value: ParameterValue) {
        self.values.lock().insert(id, value);
    }
}

impl ParameterProvider for MockProvider {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn get_provided_parameters(&self) -> SelectorResponse {
        SelectorResponse::with_selectors(self.selectors.clone())
    }

    fn get_parameter_values(&self, ids: Vec<ParameterInstanceId>) -> Future<Vec<ValueResponse>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let values = self.values.lock();
        let responses = ids
            .iter()
            .map(|id| match values.get(&id.id) {
                Some(value) => ValueResponse::success(value.clone()),
                None => ValueResponse::error(StatusCode::StatusValueUnavailable),
            })
            .collect();
        resolved_future(responses)
    }

    fn set_parameter_values_connection_aware(
        &self,
        requests: Vec<ValueRequest>,
        defer_wda_connection_changes: bool,
    ) -> Future<Vec<SetParameterResponse>> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_defer_flag.lock() = Some(defer_wda_connection_changes);
        let responses = requests
            .iter()
            .map(|_| SetParameterResponse::new(StatusCode::Success))
            .collect();
        *self.last_set_requests.lock() = requests;
        resolved_future(responses)
    }

    fn invoke_method(
        &self,
        _method_id: ParameterInstanceId,
        in_args: Vec<ParameterValue>,
    ) -> Future<MethodInvocationResponse> {
        self.invoke_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(pending) = self.pending_invocation.lock().take() {
            return pending;
        }
        let mut response = MethodInvocationResponse::new(StatusCode::Success);
        // echo the first in-argument back as the out-argument
        response.out_args = in_args.into_iter().take(1).map(Some).collect();
        resolved_future(response)
    }

    fn create_parameter_upload_id(&self, _context: ParameterId) -> Future<FileIdResponse> {
        let number = self.upload_counter.fetch_add(1, Ordering::SeqCst);
        resolved_future(FileIdResponse::with_id(format!("file{number:08}")))
    }

    fn remove_parameter_upload_id(&self, id: FileId, _context: ParameterId) -> Future<Response> {
        self.removed_upload_ids.lock().push(id);
        resolved_future(Response::new(StatusCode::Success))
    }
}

/// Description provider answering every device with one fixed WDD.
pub struct MockDescriptionProvider {
    wdd: String,
}

impl MockDescriptionProvider {
    pub fn new(wdd: &str) -> Arc<Self> {
        Arc::new(MockDescriptionProvider {
            wdd: wdd.to_string(),
        })
    }
}

impl DeviceDescriptionProvider for MockDescriptionProvider {
    fn get_provided_devices(&self) -> ProvidedDevicesResponse {
        ProvidedDevicesResponse {
            status: StatusCode::Success,
            selected_devices: vec![DeviceSelector::Any],
        }
    }

    fn get_device_information(
        &self,
        _order_number: String,
        _firmware_version: String,
    ) -> Future<WddResponse> {
        resolved_future(WddResponse {
            status: StatusCode::Success,
            content: self.wdd.clone(),
            wdm_content: String::new(),
        })
    }
}

/// In-memory file backed by a byte vector.
pub struct MemoryFile {
    pub contents: Mutex<Vec<u8>>,
    pub read_calls: AtomicUsize,
}

impl MemoryFile {
    pub fn new(initial: &[u8]) -> Arc<Self> {
        Arc::new(MemoryFile {
            contents: Mutex::new(initial.to_vec()),
            read_calls: AtomicUsize::new(0),
        })
    }
}

impl FileProvider for MemoryFile {
    fn read(&self, offset: u64, length: usize) -> Future<FileReadResponse> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let contents = self.contents.lock();
        let start = offset as usize;
        if start > contents.len() {
            return resolved_future(FileReadResponse::new(StatusCode::FileSizeExceeded));
        }
        let end = (start + length).min(contents.len());
        let mut response = FileReadResponse::new(StatusCode::Success);
        response.data = contents[start..end].to_vec();
        resolved_future(response)
    }

    fn write(&self, offset: u64, data: Vec<u8>) -> Future<Response> {
        let mut contents = self.contents.lock();
        let start = offset as usize;
        if contents.len() < start + data.len() {
            contents.resize(start + data.len(), 0);
        }
        contents[start..start + data.len()].copy_from_slice(&data);
        resolved_future(Response::new(StatusCode::Success))
    }

    fn get_file_info(&self) -> Future<FileInfoResponse> {
        let mut response = FileInfoResponse::new(StatusCode::Success);
        response.size = self.contents.lock().len() as u64;
        resolved_future(response)
    }

    fn create(&self, _capacity: u64) -> Future<Response> {
        resolved_future(Response::new(StatusCode::Success))
    }
}

/// Promise kept around to answer a provider call later from the test body.
pub fn pending_invocation() -> (Arc<Promise<MethodInvocationResponse>>, Future<MethodInvocationResponse>) {
    let promise = Arc::new(Promise::new());
    let future = promise.take_future().expect("future");
    (promise, future)
}
