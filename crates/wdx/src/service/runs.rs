// SPDX-License-Identifier: MPL-2.0

//! Method-run objects.
//!
//! Invoking a method through the public boundary creates a run object whose
//! id is the base-36 encoding of a process-global monotonic counter seeded
//! from process start. A run created from a pending future starts its
//! timeout window when the future resolves; a periodic sweep evicts expired
//! runs. Lookup requires the method path to match the run id.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::error;

use crate::model::types::ParameterInstancePath;
use crate::responses::MethodInvocationNamedResponse;
use crate::status::StatusCode;
use crate::sync::future::Future;

/// Cap on concurrently tracked runs.
pub const MAX_METHOD_RUNS: usize = 1000;

/// Seconds between 1970-01-01 and 2020-01-01; run ids restart relative to
/// the latter to stay short.
const RUN_ID_EPOCH_OFFSET: u64 = 1_577_836_800;

fn next_run_counter() -> u64 {
    static COUNTER: OnceLock<AtomicU64> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().saturating_sub(RUN_ID_EPOCH_OFFSET))
            .unwrap_or(0);
        AtomicU64::new(seed)
    });
    counter.fetch_add(1, Ordering::Relaxed)
}

fn base36_encode(mut number: u64) -> String {
    let mut encoded = Vec::new();
    loop {
        let remainder = (number % 36) as u8;
        let digit = if remainder < 10 {
            b'0' + remainder
        } else {
            b'a' + (remainder - 10)
        };
        encoded.push(digit);
        number /= 36;
        if number == 0 {
            break;
        }
    }
    encoded.reverse();
    String::from_utf8(encoded).expect("base36 digits are ascii")
}

fn generate_run_id() -> String {
    base36_encode(next_run_counter())
}

struct MethodRunObject {
    method: ParameterInstancePath,
    timeout_span: u16,
    /// Absolute eviction deadline; `None` while the invocation is pending.
    deadline: Option<Instant>,
    response: Option<MethodInvocationNamedResponse>,
}

/// Snapshot of one run as handed to callers.
#[derive(Debug, Clone)]
pub struct MethodRunInfo {
    pub id: String,
    pub method: ParameterInstancePath,
    pub timeout_span: u16,
    /// Seconds until eviction; equals `timeout_span` while pending.
    pub timeout_left: u64,
    pub response: Option<MethodInvocationNamedResponse>,
}

/// Callback fired when an asynchronous run resolves.
pub type ReadyHandler = Box<dyn Fn(String) + Send + Sync>;

/// Manager for the run objects of the public method boundary.
pub struct RunObjectManager {
    runs: Arc<Mutex<HashMap<String, Arc<Mutex<MethodRunObject>>>>>,
}

impl RunObjectManager {
    pub fn new() -> Self {
        RunObjectManager {
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Tracks a run whose response is already resolved; the timeout window
    /// starts immediately.
    pub fn add_run(
        &self,
        method_instance_path: &ParameterInstancePath,
        timeout_span: u16,
        response: MethodInvocationNamedResponse,
    ) -> String {
        let run_id = generate_run_id();
        let run = MethodRunObject {
            method: method_instance_path.clone(),
            timeout_span,
            deadline: Some(Instant::now() + Duration::from_secs(u64::from(timeout_span))),
            response: Some(response),
        };
        self.runs
            .lock()
            .insert(run_id.clone(), Arc::new(Mutex::new(run)));
        run_id
    }

    /// Tracks a run backed by a pending invocation. The timeout window opens
    /// when the future resolves; `handler` is then called with the run id.
    pub fn add_run_pending(
        &self,
        method_instance_path: &ParameterInstancePath,
        timeout_span: u16,
        invoke_future: Future<MethodInvocationNamedResponse>,
        handler: ReadyHandler,
    ) -> String {
        let run_id = generate_run_id();
        let run = Arc::new(Mutex::new(MethodRunObject {
            method: method_instance_path.clone(),
            timeout_span,
            deadline: None,
            response: None,
        }));
        self.runs.lock().insert(run_id.clone(), Arc::clone(&run));

        let handler = Arc::new(handler);
        {
            let run = Arc::clone(&run);
            let run_id = run_id.clone();
            let handler = Arc::clone(&handler);
            invoke_future.set_error_notifier(move |err| {
                error!("Method invocation for run object failed: {err}");
                let mut guard = run.lock();
                guard.deadline = Some(
                    Instant::now() + Duration::from_secs(u64::from(guard.timeout_span)),
                );
                guard.response = Some(MethodInvocationNamedResponse::with_message(
                    StatusCode::InternalError,
                    err.to_string(),
                ));
                drop(guard);
                handler(run_id.clone());
            });
        }
        {
            let run_id_for_value = run_id.clone();
            invoke_future.set_notifier(move |response| {
                let mut guard = run.lock();
                guard.deadline = Some(
                    Instant::now() + Duration::from_secs(u64::from(guard.timeout_span)),
                );
                guard.response = Some(response);
                drop(guard);
                handler(run_id_for_value.clone());
            });
        }
        run_id
    }

    /// Looks up a run; the method path must match.
    pub fn get_run(
        &self,
        method_instance_path: &ParameterInstancePath,
        run_id: &str,
    ) -> Result<MethodRunInfo, StatusCode> {
        let runs = self.runs.lock();
        let run = runs.get(run_id).ok_or(StatusCode::RunNotFound)?;
        let guard = run.lock();
        if guard.method != *method_instance_path {
            return Err(StatusCode::RunNotFound);
        }
        Ok(Self::snapshot(run_id, &guard))
    }

    /// All runs of one method.
    pub fn get_runs(&self, method_instance_path: &ParameterInstancePath) -> Vec<MethodRunInfo> {
        let runs = self.runs.lock();
        let mut result = Vec::new();
        for (run_id, run) in runs.iter() {
            let guard = run.lock();
            if guard.method == *method_instance_path {
                result.push(Self::snapshot(run_id, &guard));
            }
        }
        result
    }

    /// Removes a run; the method path must match.
    pub fn remove_run(
        &self,
        method_instance_path: &ParameterInstancePath,
        run_id: &str,
    ) -> Result<(), StatusCode> {
        let mut runs = self.runs.lock();
        let matches = runs
            .get(run_id)
            .is_some_and(|run| run.lock().method == *method_instance_path);
        if !matches {
            return Err(StatusCode::RunNotFound);
        }
        runs.remove(run_id);
        Ok(())
    }

    /// Evicts every run whose deadline has passed.
    pub fn clean_runs(&self) {
        let now = Instant::now();
        self.runs
            .lock()
            .retain(|_, run| run.lock().deadline.map_or(true, |deadline| deadline > now));
    }

    pub fn max_runs_reached(&self) -> bool {
        self.runs.lock().len() >= MAX_METHOD_RUNS
    }

    fn snapshot(run_id: &str, run: &MethodRunObject) -> MethodRunInfo {
        let timeout_left = match run.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .as_secs(),
            None => u64::from(run.timeout_span),
        };
        MethodRunInfo {
            id: run_id.to_string(),
            method: run.method.clone(),
            timeout_span: run.timeout_span,
            timeout_left,
            response: run.response.clone(),
        }
    }
}

impl Default for RunObjectManager {
    fn default() -> Self {
        RunObjectManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::future::Promise;
    use std::sync::atomic::AtomicUsize;

    fn method_path() -> ParameterInstancePath {
        ParameterInstancePath::new("0-0", "Device/Restart")
    }

    #[test]
    fn test_base36_encoding() {
        assert_eq!(base36_encode(0), "0");
        assert_eq!(base36_encode(35), "z");
        assert_eq!(base36_encode(36), "10");
        assert_eq!(base36_encode(36 * 36 + 1), "101");
    }

    #[test]
    fn test_run_ids_are_monotonic() {
        let first = generate_run_id();
        let second = generate_run_id();
        assert_ne!(first, second);
    }

    #[test]
    fn test_add_by_response_and_lookup() {
        let manager = RunObjectManager::new();
        let run_id = manager.add_run(
            &method_path(),
            900,
            MethodInvocationNamedResponse::new(StatusCode::Success),
        );
        let run = manager.get_run(&method_path(), &run_id).expect("run");
        assert!(run.response.is_some());
        assert!(run.timeout_left <= 900);
    }

    #[test]
    fn test_lookup_requires_matching_path() {
        let manager = RunObjectManager::new();
        let run_id = manager.add_run(
            &method_path(),
            900,
            MethodInvocationNamedResponse::new(StatusCode::Success),
        );
        let other = ParameterInstancePath::new("0-0", "Device/Reboot");
        assert_eq!(
            manager.get_run(&other, &run_id).map(|_| ()),
            Err(StatusCode::RunNotFound)
        );
    }

    #[test]
    fn test_pending_run_resolves_via_handler() {
        let manager = RunObjectManager::new();
        let promise = Promise::new();
        let future = promise.take_future().expect("future");
        let handled = Arc::new(AtomicUsize::new(0));
        let handled_in_callback = Arc::clone(&handled);

        let run_id = manager.add_run_pending(
            &method_path(),
            900,
            future,
            Box::new(move |_id| {
                handled_in_callback.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let run = manager.get_run(&method_path(), &run_id).expect("run");
        assert!(run.response.is_none());
        assert_eq!(run.timeout_left, 900);

        promise
            .set_value(MethodInvocationNamedResponse::new(StatusCode::Success))
            .expect("resolve");
        assert_eq!(handled.load(Ordering::SeqCst), 1);

        let run = manager.get_run(&method_path(), &run_id).expect("run");
        assert!(run.response.is_some());
    }

    #[test]
    fn test_remove_and_not_found() {
        let manager = RunObjectManager::new();
        let run_id = manager.add_run(
            &method_path(),
            900,
            MethodInvocationNamedResponse::new(StatusCode::Success),
        );
        manager.remove_run(&method_path(), &run_id).expect("remove");
        assert_eq!(
            manager.get_run(&method_path(), &run_id).map(|_| ()),
            Err(StatusCode::RunNotFound)
        );
        assert_eq!(
            manager.remove_run(&method_path(), &run_id),
            Err(StatusCode::RunNotFound)
        );
    }

    #[test]
    fn test_cleanup_evicts_expired_runs() {
        let manager = RunObjectManager::new();
        let run_id = manager.add_run(
            &method_path(),
            0,
            MethodInvocationNamedResponse::new(StatusCode::Success),
        );
        manager.clean_runs();
        assert_eq!(
            manager.get_run(&method_path(), &run_id).map(|_| ()),
            Err(StatusCode::RunNotFound)
        );
    }

    #[test]
    fn test_pending_runs_survive_cleanup() {
        let manager = RunObjectManager::new();
        let promise: Promise<MethodInvocationNamedResponse> = Promise::new();
        let future = promise.take_future().expect("future");
        let run_id =
            manager.add_run_pending(&method_path(), 0, future, Box::new(|_id| {}));
        manager.clean_runs();
        assert!(manager.get_run(&method_path(), &run_id).is_ok());
    }

    #[test]
    fn test_max_runs_cap() {
        let manager = RunObjectManager::new();
        for _ in 0..MAX_METHOD_RUNS {
            manager.add_run(
                &method_path(),
                900,
                MethodInvocationNamedResponse::new(StatusCode::Success),
            );
        }
        assert!(manager.max_runs_reached());
    }
}
