// SPDX-License-Identifier: MPL-2.0

//! # WDX - Device Parameter & Method Service Core
//!
//! WDX exposes the devices attached to a controller (the head station plus
//! the kbus and rlb bus families) as a hierarchical, typed parameter and
//! method tree, and routes read/write/invoke/monitor/file-transfer requests
//! from clients to pluggable backend *providers*.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Front ends (not here)                       |
//! |            REST / IPC translate wire requests to batches           |
//! +--------------------------------------------------------------------+
//! |                         ParameterService                           |
//! |  target resolution | per-provider portions | sequential integrate  |
//! |  monitoring lists  | file sessions         | method runs           |
//! +--------------------------------------------------------------------+
//! |        Model & instances            |   Concurrency plumbing       |
//! |  WDM/WDD loaders, override rules,   |  future/promise + dismiss,   |
//! |  path tree, dynamic materialization |  job queue, serial wrappers  |
//! +--------------------------------------------------------------------+
//! |                     Providers (plugged in)                         |
//! |   parameter | model | description | extension | file providers     |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ParameterService`] | The dispatcher core; entry point for front ends |
//! | [`sync::Future`] / [`sync::Promise`] | Cancellable rendezvous with push notification |
//! | [`model::DeviceModel`] | The loaded WDM catalog |
//! | [`instances::Device`] | One registered device with its instance graph |
//! | [`provider::ParameterProvider`] | Backend contract for parameter behavior |
//!
//! ## Threading
//!
//! Parallel threads with single-threaded cooperative notifiers: provider
//! futures deliver on provider-chosen threads, the dispatcher chains
//! notifiers so state-mutating steps for one batch happen on exactly one
//! thread at a time, and no provider call is ever made with a core lock
//! held.

pub mod error;
pub mod instances;
pub mod loader;
pub mod model;
pub mod provider;
pub mod responses;
pub mod service;
pub mod status;
pub mod sync;

pub use error::{Error, Result};
pub use service::{
    LapseReaper, MethodRunInfo, ParameterFilter, ParameterService, RegisterDeviceRequest,
    RunObjectManager, MAX_METHOD_RUNS,
};
pub use status::StatusCode;
