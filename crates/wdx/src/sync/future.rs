// SPDX-License-Identifier: MPL-2.0

//! Cancellable future/promise with push notification.
//!
//! A single-writer ([`Promise`]) / single-reader ([`Future`]) rendezvous
//! carrying either a value or an [`Error`]. On top of the blocking `get`/
//! `wait*` family, a consumer may install *notifiers* that are invoked in the
//! producing thread the moment the result arrives, and may *dismiss* the
//! rendezvous to tell the producer that the result is no longer required.
//!
//! Dismissal is advisory: a producer that already started working may still
//! deliver. Fulfilling the promise clears the dismiss notifier before waking
//! waiters, so no closure cycle between promise and consumer survives
//! completion.
//!
//! If a notifier is installed after the result already arrived it fires
//! immediately on the installing thread and consumes the result; a later
//! `get` fails with [`Error::AlreadyRetrieved`].

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Callback invoked with the promised value.
pub type Notifier<T> = Box<dyn FnOnce(T) + Send>;
/// Callback invoked with the promise's error.
pub type ErrorNotifier = Box<dyn FnOnce(Error) + Send>;
/// Callback invoked on the first dismissal.
pub type DismissNotifier = Box<dyn FnOnce() + Send>;

/// Result of a deadline-bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    /// The result arrived before the deadline.
    Ready,
    /// The deadline passed without a result.
    Timeout,
}

struct Inner<T> {
    ready: bool,
    execute: bool,
    future_taken: bool,
    value: Option<T>,
    error: Option<Error>,
    notifier: Option<Notifier<T>>,
    error_notifier: Option<ErrorNotifier>,
    dismiss_notifier: Option<DismissNotifier>,
    any_signal: Option<Arc<AnySignal>>,
}

impl<T> Default for Inner<T> {
    fn default() -> Self {
        Inner {
            ready: false,
            execute: true,
            future_taken: false,
            value: None,
            error: None,
            notifier: None,
            error_notifier: None,
            dismiss_notifier: None,
            any_signal: None,
        }
    }
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    cv: Condvar,
}

impl<T> Shared<T> {
    fn new() -> Arc<Self> {
        Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            cv: Condvar::new(),
        })
    }
}

/// Wake-up channel shared by all futures polled by one [`wait_for_any`] call.
struct AnySignal {
    epoch: Mutex<u64>,
    cv: Condvar,
}

impl AnySignal {
    fn new() -> Arc<Self> {
        Arc::new(AnySignal {
            epoch: Mutex::new(0),
            cv: Condvar::new(),
        })
    }

    fn notify(&self) {
        let mut epoch = self.epoch.lock();
        *epoch += 1;
        self.cv.notify_all();
    }

    fn current(&self) -> u64 {
        *self.epoch.lock()
    }

    /// Blocks until the epoch moves past `seen` or `deadline` passes.
    fn wait_past(&self, seen: u64, deadline: Option<Instant>) -> Option<u64> {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            match deadline {
                Some(d) => {
                    if self.cv.wait_until(&mut epoch, d).timed_out() {
                        return None;
                    }
                }
                None => self.cv.wait(&mut epoch),
            }
        }
        Some(*epoch)
    }
}

/// Consumer side of the rendezvous.
pub struct Future<T> {
    state: Arc<Shared<T>>,
}

impl<T: Send + 'static> Future<T> {
    /// True if the result (value or error) is available.
    pub fn ready(&self) -> bool {
        self.state.inner.lock().ready
    }

    /// True if [`Future::dismiss`] was called.
    pub fn dismissed(&self) -> bool {
        !self.state.inner.lock().execute
    }

    /// True if a value is stored and has not been consumed by a notifier.
    pub fn has_value(&self) -> bool {
        let inner = self.state.inner.lock();
        inner.ready && inner.value.is_some()
    }

    /// True if an error is stored and has not been consumed by a notifier.
    pub fn has_error(&self) -> bool {
        let inner = self.state.inner.lock();
        inner.ready && inner.error.is_some()
    }

    /// Blocks until the result is available and returns it, consuming the
    /// future. Fails with [`Error::AlreadyRetrieved`] if a notifier already
    /// consumed the result.
    pub fn get(self) -> Result<T> {
        let mut inner = self.state.inner.lock();
        if inner.ready && inner.value.is_none() && inner.error.is_none() {
            return Err(Error::AlreadyRetrieved);
        }
        while !inner.ready {
            self.state.cv.wait(&mut inner);
        }
        if let Some(err) = inner.error.take() {
            return Err(err);
        }
        inner.value.take().ok_or(Error::AlreadyRetrieved)
    }

    /// Blocks until the result is available.
    pub fn wait(&self) {
        let mut inner = self.state.inner.lock();
        while !inner.ready {
            self.state.cv.wait(&mut inner);
        }
    }

    /// Waits for the result up to `timeout`. The future stays valid on
    /// timeout.
    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.wait_deadline(Instant::now() + timeout)
    }

    /// Waits for the result until `deadline`. The future stays valid on
    /// timeout.
    pub fn wait_deadline(&self, deadline: Instant) -> FutureStatus {
        let mut inner = self.state.inner.lock();
        while !inner.ready {
            if self.state.cv.wait_until(&mut inner, deadline).timed_out() {
                return if inner.ready {
                    FutureStatus::Ready
                } else {
                    FutureStatus::Timeout
                };
            }
        }
        FutureStatus::Ready
    }

    /// Marks the result as no longer required. Idempotent; the producer's
    /// dismiss notifier fires at most once, and never after fulfillment.
    pub fn dismiss(&self) {
        let to_fire = {
            let mut inner = self.state.inner.lock();
            if !inner.execute {
                return;
            }
            inner.execute = false;
            inner.dismiss_notifier.take()
        };
        if let Some(notifier) = to_fire {
            notifier();
        }
    }

    /// Installs the value notifier. If the value is already present the
    /// notifier fires immediately on this thread and consumes it.
    pub fn set_notifier(&self, notifier: impl FnOnce(T) + Send + 'static) {
        let fire = {
            let mut inner = self.state.inner.lock();
            if inner.ready && inner.value.is_some() {
                let value = inner.value.take();
                value.map(|v| (Box::new(notifier) as Notifier<T>, v))
            } else {
                inner.notifier = Some(Box::new(notifier));
                None
            }
        };
        if let Some((notifier, value)) = fire {
            notifier(value);
        }
    }

    /// Installs the error notifier. If an error is already present the
    /// notifier fires immediately on this thread and consumes it.
    pub fn set_error_notifier(&self, notifier: impl FnOnce(Error) + Send + 'static) {
        let fire = {
            let mut inner = self.state.inner.lock();
            if inner.ready && inner.error.is_some() {
                let err = inner.error.take();
                err.map(|e| (Box::new(notifier) as ErrorNotifier, e))
            } else {
                inner.error_notifier = Some(Box::new(notifier));
                None
            }
        };
        if let Some((notifier, err)) = fire {
            notifier(err);
        }
    }

    /// Drops both notifiers without firing them. Used by the serializing
    /// wrappers when a pending call is cancelled.
    pub(crate) fn clear_notifiers(&self) {
        let mut inner = self.state.inner.lock();
        inner.notifier = None;
        inner.error_notifier = None;
    }

    fn attach_signal(&self, signal: Arc<AnySignal>) {
        let mut inner = self.state.inner.lock();
        debug_assert!(
            inner.notifier.is_none() && inner.error_notifier.is_none(),
            "wait_for_any over a future with notifiers installed is unsupported"
        );
        inner.any_signal = Some(signal);
    }

    fn detach_signal(&self) {
        self.state.inner.lock().any_signal = None;
    }
}

/// Producer side of the rendezvous.
pub struct Promise<T> {
    state: Arc<Shared<T>>,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates an unfulfilled promise.
    pub fn new() -> Self {
        Promise {
            state: Shared::new(),
        }
    }

    /// Creates a promise with the dismiss notifier already installed.
    pub fn with_dismiss_notifier(notifier: impl FnOnce() + Send + 'static) -> Self {
        let promise = Promise::new();
        promise.state.inner.lock().dismiss_notifier = Some(Box::new(notifier));
        promise
    }

    /// Hands out the connected future. Only one future exists per promise;
    /// each later call fails with [`Error::AlreadyRetrieved`].
    pub fn take_future(&self) -> Result<Future<T>> {
        let mut inner = self.state.inner.lock();
        if inner.future_taken {
            return Err(Error::AlreadyRetrieved);
        }
        inner.future_taken = true;
        drop(inner);
        Ok(Future {
            state: Arc::clone(&self.state),
        })
    }

    /// True while the consumer has not dismissed the rendezvous.
    pub fn execute(&self) -> bool {
        self.state.inner.lock().execute
    }

    /// True once a value or error was published.
    pub fn is_satisfied(&self) -> bool {
        self.state.inner.lock().ready
    }

    /// Publishes the value. Fails with [`Error::PromiseAlreadySatisfied`] on
    /// a second fulfillment. A value notifier installed on the future is
    /// invoked on this thread.
    pub fn set_value(&self, value: T) -> Result<()> {
        let fire = {
            let mut inner = self.state.inner.lock();
            if inner.ready {
                return Err(Error::PromiseAlreadySatisfied);
            }
            inner.ready = true;
            inner.dismiss_notifier = None;
            let fire = match inner.notifier.take() {
                Some(notifier) => Some((notifier, value)),
                None => {
                    inner.value = Some(value);
                    None
                }
            };
            self.state.cv.notify_all();
            let signal = inner.any_signal.clone();
            drop(inner);
            if let Some(signal) = signal {
                signal.notify();
            }
            fire
        };
        if let Some((notifier, value)) = fire {
            notifier(value);
        }
        Ok(())
    }

    /// Publishes an error. Same fulfillment rules as [`Promise::set_value`].
    pub fn set_error(&self, error: Error) -> Result<()> {
        let fire = {
            let mut inner = self.state.inner.lock();
            if inner.ready {
                return Err(Error::PromiseAlreadySatisfied);
            }
            inner.ready = true;
            inner.dismiss_notifier = None;
            let fire = match inner.error_notifier.take() {
                Some(notifier) => Some((notifier, error)),
                None => {
                    inner.error = Some(error);
                    None
                }
            };
            self.state.cv.notify_all();
            let signal = inner.any_signal.clone();
            drop(inner);
            if let Some(signal) = signal {
                signal.notify();
            }
            fire
        };
        if let Some((notifier, error)) = fire {
            notifier(error);
        }
        Ok(())
    }

    /// Installs the dismiss notifier, replacing a previous one. If the
    /// rendezvous is already dismissed the notifier fires immediately.
    pub fn set_dismiss_notifier(&self, notifier: impl FnOnce() + Send + 'static) {
        let fire = {
            let mut inner = self.state.inner.lock();
            if inner.ready {
                return;
            }
            if inner.execute {
                inner.dismiss_notifier = Some(Box::new(notifier));
                None
            } else {
                Some(notifier)
            }
        };
        if let Some(notifier) = fire {
            notifier();
        }
    }
}

impl<T: Send + 'static> Default for Promise<T> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        let fire = {
            let mut inner = self.state.inner.lock();
            if inner.ready || !inner.execute {
                None
            } else {
                inner.ready = true;
                inner.dismiss_notifier = None;
                let fire = match inner.error_notifier.take() {
                    Some(notifier) => Some((notifier, Error::BrokenPromise)),
                    None => {
                        inner.error = Some(Error::BrokenPromise);
                        None
                    }
                };
                self.state.cv.notify_all();
                let signal = inner.any_signal.clone();
                drop(inner);
                if let Some(signal) = signal {
                    signal.notify();
                }
                fire
            }
        };
        if let Some((notifier, error)) = fire {
            notifier(error);
        }
    }
}

/// Returns an already fulfilled future.
pub fn resolved_future<T: Send + 'static>(value: T) -> Future<T> {
    let promise = Promise::new();
    let future = promise.take_future().expect("fresh promise");
    let _ = promise.set_value(value);
    future
}

/// Returns an already failed future.
pub fn resolved_error<T: Send + 'static>(error: Error) -> Future<T> {
    let promise = Promise::new();
    let future = promise.take_future().expect("fresh promise");
    let _ = promise.set_error(error);
    future
}

/// Forwards `future` through `transform` into a new future. Errors pass
/// through unchanged.
pub fn map_future<T, U, F>(future: Future<T>, transform: F) -> Future<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
{
    let promise = Arc::new(Promise::new());
    let mapped = promise.take_future().expect("fresh promise");
    let err_promise = Arc::clone(&promise);
    future.set_error_notifier(move |err| {
        let _ = err_promise.set_error(err);
    });
    future.set_notifier(move |value| {
        let _ = promise.set_value(transform(value));
    });
    mapped
}

/// Waits until any of `futures` is ready, returning its index, or `None` when
/// `timeout` passes first (`None` timeout waits forever).
///
/// Contract: the polled futures must not have notifiers installed; a notifier
/// would consume the result this call is waiting for.
pub fn wait_for_any<T: Send + 'static>(
    futures: &[Future<T>],
    timeout: Option<Duration>,
) -> Option<usize> {
    if futures.is_empty() {
        return None;
    }
    let deadline = timeout.map(|t| Instant::now() + t);
    let signal = AnySignal::new();
    for future in futures {
        future.attach_signal(Arc::clone(&signal));
    }

    let mut seen = signal.current();
    let found = loop {
        if let Some(idx) = futures.iter().position(Future::ready) {
            break Some(idx);
        }
        match signal.wait_past(seen, deadline) {
            Some(epoch) => seen = epoch,
            None => break None,
        }
    };

    for future in futures {
        future.detach_signal();
    }
    found
}
