// SPDX-License-Identifier: MPL-2.0

//! Background lapse reaper.
//!
//! Owns a thread that periodically triggers the service's lapse checks and
//! the run-object sweep. Shutdown is signalled through a channel; dropping
//! the reaper joins the thread.

use crossbeam::channel::{bounded, Sender};
use log::debug;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::service::{ParameterService, RunObjectManager};

pub struct LapseReaper {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl LapseReaper {
    /// Spawns the reaper thread, ticking every `interval`.
    pub fn spawn(
        service: Arc<ParameterService>,
        runs: Arc<RunObjectManager>,
        interval: Duration,
    ) -> Self {
        let (stop, stop_receiver) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("wdx-lapse-reaper".into())
            .spawn(move || loop {
                match stop_receiver.recv_timeout(interval) {
                    Ok(()) | Err(crossbeam::channel::RecvTimeoutError::Disconnected) => {
                        debug!("Lapse reaper stopping");
                        return;
                    }
                    Err(crossbeam::channel::RecvTimeoutError::Timeout) => {
                        service.trigger_lapse_checks();
                        runs.clean_runs();
                    }
                }
            })
            .expect("spawning the lapse reaper thread");
        LapseReaper {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for LapseReaper {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
