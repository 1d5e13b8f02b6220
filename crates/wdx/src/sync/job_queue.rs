// SPDX-License-Identifier: MPL-2.0

//! Ordered single-consumer job queue.
//!
//! At most one job is active at a time. Enqueuing into an empty queue starts
//! the job on the calling thread; otherwise the job is started from the
//! predecessor's completion callback, on whatever thread delivers it.
//!
//! Teardown discipline: dropping the queue sets an exit marker, then takes the
//! teardown lock and cancels every remaining job (including a running one). A
//! completion callback racing with the drop either finishes before teardown or
//! observes the marker and exits. The teardown lock is distinct from the lock
//! guarding the queue payload.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback handed to [`Job::start`]; must be invoked exactly once when the
/// job finished (successfully or not).
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// An asynchronous task managed by the queue.
pub trait Job: Send + Sync {
    /// Begins the work. `on_complete` must be called once the job is done.
    fn start(&self, on_complete: CompletionHandler);
    /// Abandons the work. Must be safe to call at any time, repeatedly.
    fn cancel(&self);
}

struct QueueInner {
    jobs: Mutex<VecDeque<Arc<dyn Job>>>,
    exit_marker: AtomicBool,
    exit_mutex: Mutex<()>,
}

impl QueueInner {
    /// Runs `task` unless the owning queue is (being) destroyed.
    fn if_not_destroyed(&self, task: impl FnOnce(&Self)) {
        // fast check before taking the lock, so completions never wait for a
        // concurrent destructor to finish
        if self.exit_marker.load(Ordering::Acquire) {
            return;
        }
        let _guard = self.exit_mutex.lock();
        if self.exit_marker.load(Ordering::Acquire) {
            return;
        }
        task(self);
    }
}

fn start_jobs(inner: Arc<QueueInner>) {
    let mut next_job: Option<Arc<dyn Job>> = None;
    inner.if_not_destroyed(|q| {
        next_job = q.jobs.lock().front().cloned();
    });
    let Some(job) = next_job else {
        return;
    };

    let queue = Arc::clone(&inner);
    let current = Arc::as_ptr(&job).cast::<()>() as usize;
    job.start(Box::new(move || {
        let mut next_available = false;
        queue.if_not_destroyed(|q| {
            // remove the job that just finished
            let mut jobs = q.jobs.lock();
            if jobs
                .front()
                .is_some_and(|j| Arc::as_ptr(j).cast::<()>() as usize == current)
            {
                jobs.pop_front();
            }
            next_available = !jobs.is_empty();
        });
        if next_available {
            start_jobs(queue);
        }
    }));
}

/// A queue for serial execution of asynchronous tasks.
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    /// New, empty queue.
    pub fn new() -> Self {
        JobQueue {
            inner: Arc::new(QueueInner {
                jobs: Mutex::new(VecDeque::new()),
                exit_marker: AtomicBool::new(false),
                exit_mutex: Mutex::new(()),
            }),
        }
    }

    /// Adds a job. It starts immediately when the queue was empty, otherwise
    /// after all its predecessors completed. Jobs still pending when the
    /// queue is dropped are cancelled instead of started.
    pub fn enqueue_job(&self, job: Arc<dyn Job>) {
        let needs_start = {
            let mut jobs = self.inner.jobs.lock();
            let was_empty = jobs.is_empty();
            jobs.push_back(job);
            was_empty
        };
        if needs_start {
            start_jobs(Arc::clone(&self.inner));
        }
    }

    /// Cancels all pending jobs and a potentially running one.
    pub fn cancel_jobs(&self) {
        let mut jobs = self.inner.jobs.lock();
        while let Some(job) = jobs.pop_front() {
            job.cancel();
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        JobQueue::new()
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.inner.exit_marker.store(true, Ordering::Release);
        let _guard = self.inner.exit_mutex.lock();
        self.cancel_jobs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Job that completes when told to, recording start/cancel counts.
    struct TestJob {
        started: AtomicUsize,
        cancelled: AtomicUsize,
        completion: Mutex<Option<CompletionHandler>>,
        complete_inline: bool,
    }

    impl TestJob {
        fn new(complete_inline: bool) -> Arc<Self> {
            Arc::new(TestJob {
                started: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
                completion: Mutex::new(None),
                complete_inline,
            })
        }

        fn finish(&self) {
            if let Some(on_complete) = self.completion.lock().take() {
                on_complete();
            }
        }
    }

    impl Job for TestJob {
        fn start(&self, on_complete: CompletionHandler) {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.complete_inline {
                on_complete();
            } else {
                *self.completion.lock() = Some(on_complete);
            }
        }

        fn cancel(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_create_and_destroy() {
        let queue = JobQueue::new();
        drop(queue);
    }

    #[test]
    fn test_enqueue_starts_first_job_inline() {
        let queue = JobQueue::new();
        let job = TestJob::new(false);
        queue.enqueue_job(job.clone());
        assert_eq!(job.started.load(Ordering::SeqCst), 1);
        job.finish();
    }

    #[test]
    fn test_second_job_waits_for_first() {
        let queue = JobQueue::new();
        let first = TestJob::new(false);
        let second = TestJob::new(false);
        queue.enqueue_job(first.clone());
        queue.enqueue_job(second.clone());
        assert_eq!(first.started.load(Ordering::SeqCst), 1);
        assert_eq!(second.started.load(Ordering::SeqCst), 0);

        first.finish();
        assert_eq!(second.started.load(Ordering::SeqCst), 1);
        second.finish();
    }

    #[test]
    fn test_inline_jobs_run_in_order() {
        let queue = JobQueue::new();
        for _ in 0..5 {
            let job = TestJob::new(true);
            queue.enqueue_job(job.clone());
            assert_eq!(job.started.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_drop_cancels_pending_jobs() {
        let queue = JobQueue::new();
        let running = TestJob::new(false);
        let pending = TestJob::new(false);
        queue.enqueue_job(running.clone());
        queue.enqueue_job(pending.clone());
        drop(queue);
        assert_eq!(running.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(pending.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(pending.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_completion_after_drop_is_ignored() {
        let queue = JobQueue::new();
        let running = TestJob::new(false);
        let pending = TestJob::new(false);
        queue.enqueue_job(running.clone());
        queue.enqueue_job(pending.clone());
        drop(queue);
        // the provider answers late; the queued successor must not start
        running.finish();
        assert_eq!(pending.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enqueue_from_multiple_threads() {
        let queue = Arc::new(JobQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                struct CountJob(Arc<AtomicUsize>);
                impl Job for CountJob {
                    fn start(&self, on_complete: CompletionHandler) {
                        self.0.fetch_add(1, Ordering::SeqCst);
                        on_complete();
                    }
                    fn cancel(&self) {}
                }
                for _ in 0..25 {
                    queue.enqueue_job(Arc::new(CountJob(Arc::clone(&counter))));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("join");
        }
        // all inline jobs completed before their enqueue call returned
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), 8 * 25);
    }
}
