// SPDX-License-Identifier: MPL-2.0

//! Sequential integration of per-provider portions.
//!
//! Portion i+1's notifier is installed only after portion i's integration
//! completed. A future can take a notifier after its value arrived, so the
//! chain never misses a result; it merely serializes the integration steps
//! onto one logical timeline and keeps the final `set_value` a single-writer
//! event. The jobs vector is cleared from inside the last completion to
//! break the notifier/job reference cycle.

use log::error;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::sync::future::{Future, Promise};

/// One provider call plus the closure that folds its result into the shared
/// whole.
pub(crate) struct PartialJob<T, R> {
    pub future: Future<T>,
    pub integrate: Box<dyn FnOnce(T, &mut R) + Send>,
}

impl<T, R> PartialJob<T, R> {
    pub fn new(future: Future<T>, integrate: impl FnOnce(T, &mut R) + Send + 'static) -> Self {
        PartialJob {
            future,
            integrate: Box::new(integrate),
        }
    }
}

/// Integrates `jobs[idx]` and subscribes `jobs[idx + 1]` from inside its
/// completion; past the end, publishes the whole result exactly once.
pub(crate) fn integrate_and_subscribe_next<T, R>(
    jobs: Arc<Mutex<Vec<Option<PartialJob<T, R>>>>>,
    whole_result: Arc<Mutex<Option<R>>>,
    promise: Arc<Promise<R>>,
    idx: usize,
) where
    T: Send + 'static,
    R: Send + 'static,
{
    let job = {
        let mut guard = jobs.lock();
        if idx < guard.len() {
            guard[idx].take()
        } else {
            None
        }
    };

    let Some(job) = job else {
        // all portions integrated; publish and release the job references
        if let Some(result) = whole_result.lock().take() {
            let _ = promise.set_value(result);
        }
        jobs.lock().clear();
        return;
    };

    let PartialJob { future, integrate } = job;

    {
        let jobs = Arc::clone(&jobs);
        let whole_result = Arc::clone(&whole_result);
        let promise = Arc::clone(&promise);
        future.set_error_notifier(move |err| {
            // a failing provider only loses its own portion; the tripwire
            // statuses set before dispatch stay in place
            error!("ParameterProvider error: {err}");
            integrate_and_subscribe_next(jobs, whole_result, promise, idx + 1);
        });
    }
    future.set_notifier(move |partial_result| {
        if let Some(whole) = whole_result.lock().as_mut() {
            integrate(partial_result, whole);
        }
        integrate_and_subscribe_next(jobs, whole_result, promise, idx + 1);
    });
}
