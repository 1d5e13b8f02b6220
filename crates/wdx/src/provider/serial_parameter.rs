// SPDX-License-Identifier: MPL-2.0

//! Serializing façade over a [`ParameterProvider`].
//!
//! Every call allocates a fresh [`ProviderJob`] carrying the arguments and a
//! fresh promise; the job is enqueued on the wrapper's queue and the
//! promise's future returned. The wrapped provider therefore observes at
//! most one outstanding call.

use std::sync::Arc;

use crate::model::types::{ParameterId, ParameterInstanceId};
use crate::model::value::ParameterValue;
use crate::provider::{
    ParameterProvider, ParameterProviderRef, SelectorResponse, ValueRequest,
};
use crate::responses::{
    FileId, FileIdResponse, MethodInvocationResponse, Response, SetParameterResponse,
    ValueResponse,
};
use crate::sync::future::{Future, Promise};
use crate::sync::job_queue::JobQueue;
use crate::sync::provider_job::ProviderJob;

pub struct SerialParameterProvider {
    wrapped: ParameterProviderRef,
    queue: JobQueue,
}

impl SerialParameterProvider {
    pub fn new(wrapped: ParameterProviderRef) -> Self {
        SerialParameterProvider {
            wrapped,
            queue: JobQueue::new(),
        }
    }

    fn enqueue<R: Send + 'static>(
        &self,
        call: impl FnOnce() -> Future<R> + Send + 'static,
    ) -> Future<R> {
        let promise = Arc::new(Promise::new());
        let future = promise.take_future().expect("fresh promise");
        self.queue.enqueue_job(ProviderJob::new(promise, call));
        future
    }
}

impl ParameterProvider for SerialParameterProvider {
    fn display_name(&self) -> String {
        self.wrapped.display_name()
    }

    fn get_provided_parameters(&self) -> SelectorResponse {
        self.wrapped.get_provided_parameters()
    }

    fn get_parameter_values(&self, ids: Vec<ParameterInstanceId>) -> Future<Vec<ValueResponse>> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.get_parameter_values(ids))
    }

    fn set_parameter_values_connection_aware(
        &self,
        requests: Vec<ValueRequest>,
        defer_wda_connection_changes: bool,
    ) -> Future<Vec<SetParameterResponse>> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || {
            provider.set_parameter_values_connection_aware(requests, defer_wda_connection_changes)
        })
    }

    fn invoke_method(
        &self,
        method_id: ParameterInstanceId,
        in_args: Vec<ParameterValue>,
    ) -> Future<MethodInvocationResponse> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.invoke_method(method_id, in_args))
    }

    fn create_parameter_upload_id(&self, context: ParameterId) -> Future<FileIdResponse> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.create_parameter_upload_id(context))
    }

    fn remove_parameter_upload_id(&self, id: FileId, context: ParameterId) -> Future<Response> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.remove_parameter_upload_id(id, context))
    }
}
