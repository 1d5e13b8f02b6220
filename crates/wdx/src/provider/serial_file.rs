// SPDX-License-Identifier: MPL-2.0

//! Serializing façade over a [`FileProvider`], mirroring
//! [`crate::provider::SerialParameterProvider`].

use std::sync::Arc;

use crate::provider::{FileProvider, FileProviderRef};
use crate::responses::{FileInfoResponse, FileReadResponse, Response};
use crate::sync::future::{Future, Promise};
use crate::sync::job_queue::JobQueue;
use crate::sync::provider_job::ProviderJob;

pub struct SerialFileProvider {
    wrapped: FileProviderRef,
    queue: JobQueue,
}

impl SerialFileProvider {
    pub fn new(wrapped: FileProviderRef) -> Self {
        SerialFileProvider {
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

impl FileProvider for SerialFileProvider {
    fn read(&self, offset: u64, length: usize) -> Future<FileReadResponse> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.read(offset, length))
    }

    fn write(&self, offset: u64, data: Vec<u8>) -> Future<Response> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.write(offset, data))
    }

    fn get_file_info(&self) -> Future<FileInfoResponse> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.get_file_info())
    }

    fn create(&self, capacity: u64) -> Future<Response> {
        let provider = Arc::clone(&self.wrapped);
        self.enqueue(move || provider.create(capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use crate::sync::future::resolved_future;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingFile {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        pending: Mutex<Vec<Promise<Response>>>,
        contents: Mutex<Vec<u8>>,
    }

    impl RecordingFile {
        fn new() -> Arc<Self> {
            Arc::new(RecordingFile {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                pending: Mutex::new(Vec::new()),
                contents: Mutex::new(Vec::new()),
            })
        }

        fn answer_one(&self) {
            let promise = self.pending.lock().remove(0);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            promise.set_value(Response::new(StatusCode::Success)).expect("answer");
        }
    }

    impl FileProvider for RecordingFile {
        fn read(&self, offset: u64, length: usize) -> Future<FileReadResponse> {
            let contents = self.contents.lock();
            let start = offset as usize;
            let end = (start + length).min(contents.len());
            let mut response = FileReadResponse::new(StatusCode::Success);
            response.data = contents.get(start..end).unwrap_or(&[]).to_vec();
            resolved_future(response)
        }

        fn write(&self, _offset: u64, data: Vec<u8>) -> Future<Response> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.contents.lock().extend_from_slice(&data);
            let promise = Promise::new();
            let future = promise.take_future().expect("future");
            self.pending.lock().push(promise);
            future
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

    #[test]
    fn test_writes_are_serialized() {
        let file = RecordingFile::new();
        let serial = SerialFileProvider::new(file.clone());

        let futures: Vec<_> = (0..3).map(|i| serial.write(i, vec![i as u8])).collect();
        assert_eq!(file.in_flight.load(Ordering::SeqCst), 1);
        for _ in 0..3 {
            file.answer_one();
        }
        for future in futures {
            assert_eq!(future.get().expect("response").status, StatusCode::Success);
        }
        assert_eq!(file.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_passes_through_queue() {
        let file = RecordingFile::new();
        file.contents.lock().extend_from_slice(b"abcdef");
        let serial = SerialFileProvider::new(file);
        let response = serial.read(2, 3).get().expect("read");
        assert_eq!(response.data, b"cde");
    }
}
