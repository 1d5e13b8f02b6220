// SPDX-License-Identifier: MPL-2.0

//! Concurrency plumbing: the cancellable future/promise rendezvous, the
//! ordered single-consumer job queue, and the adapter that bridges a
//! future-returning provider call into the queue.

pub mod future;
pub mod job_queue;
pub mod provider_job;

pub use future::{
    map_future, resolved_error, resolved_future, wait_for_any, Future, FutureStatus, Promise,
};
pub use job_queue::{CompletionHandler, Job, JobQueue};
pub use provider_job::ProviderJob;
