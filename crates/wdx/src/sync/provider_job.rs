// SPDX-License-Identifier: MPL-2.0

//! Adapter that turns a future-returning provider call into a [`Job`].
//!
//! The stored call is invoked by [`Job::start`]; its future is wired to an
//! owned promise so the caller observes the result through the promise's
//! future regardless of which thread the provider answers on. Cancelling
//! dismisses the pending future, detaches its notifiers, and rejects the
//! promise when it is still unfulfilled.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Error;
use crate::sync::future::{Future, Promise};
use crate::sync::job_queue::{CompletionHandler, Job};

type ProviderCall<R> = Box<dyn FnOnce() -> Future<R> + Send>;

/// Bridges one provider call into the serializing job queue.
pub struct ProviderJob<R: Send + 'static> {
    call: Mutex<Option<ProviderCall<R>>>,
    promise: Arc<Promise<R>>,
    pending: Mutex<Option<Future<R>>>,
}

impl<R: Send + 'static> ProviderJob<R> {
    /// Creates a job around `call`; results are published through `promise`.
    pub fn new(
        promise: Arc<Promise<R>>,
        call: impl FnOnce() -> Future<R> + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(ProviderJob {
            call: Mutex::new(Some(Box::new(call))),
            promise,
            pending: Mutex::new(None),
        })
    }
}

impl<R: Send + 'static> Job for ProviderJob<R> {
    fn start(&self, on_complete: CompletionHandler) {
        let Some(call) = self.call.lock().take() else {
            on_complete();
            return;
        };
        let future = call();

        // on_complete fires from exactly one of the two notifiers
        let shared_complete = Arc::new(Mutex::new(Some(on_complete)));
        let complete_on_value = Arc::clone(&shared_complete);
        let complete_on_error = shared_complete;

        let value_promise = Arc::clone(&self.promise);
        future.set_notifier(move |result| {
            let _ = value_promise.set_value(result);
            if let Some(on_complete) = complete_on_value.lock().take() {
                on_complete();
            }
        });
        let error_promise = Arc::clone(&self.promise);
        future.set_error_notifier(move |err| {
            let _ = error_promise.set_error(err);
            if let Some(on_complete) = complete_on_error.lock().take() {
                on_complete();
            }
        });
        *self.pending.lock() = Some(future);
    }

    fn cancel(&self) {
        {
            let pending = self.pending.lock();
            if let Some(future) = pending.as_ref() {
                if future.ready() {
                    return;
                }
                future.clear_notifiers();
                future.dismiss();
            }
        }
        if !self.promise.is_satisfied() {
            let _ = self.promise.set_error(Error::SerialWrapperCleanedUp);
        }
    }
}

impl<R: Send + 'static> Drop for ProviderJob<R> {
    fn drop(&mut self) {
        self.cancel();
    }
}
