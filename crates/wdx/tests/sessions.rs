// SPDX-License-Identifier: MPL-2.0

//! Stateful boundary resources: file transfer, upload ids, monitoring lists
//! and method runs.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{pending_invocation, MemoryFile, MockDescriptionProvider, MockProvider};
use wdx::model::{DeviceId, ParameterInstanceId, ParameterInstancePath, ParameterValue};
use wdx::provider::{NoPermissions, ProviderCallMode};
use wdx::responses::MethodInvocationResponse;
use wdx::service::RegisterFileProviderRequest;
use wdx::{ParameterService, RegisterDeviceRequest, RunObjectManager, StatusCode};

const WDM: &str = r#"
{
    "Name": "Station",
    "WDMMVersion": "1.0.0",
    "Features": [
        {
            "ID": "Backup",
            "Parameters": [
                { "ID": 300, "Path": "Backup/Image", "Type": "FileId" },
                { "ID": 301, "Path": "Backup/Slot", "Type": "Uint32" },
                {
                    "ID": 310,
                    "Path": "Backup/Run",
                    "Type": "Method",
                    "InArgs": [],
                    "OutArgs": []
                }
            ]
        }
    ]
}
"#;

const WDD: &str = r#"
{
    "ModelReference": "Station",
    "WDMMVersion": "1.0.0",
    "Features": [ "Backup" ]
}
"#;

fn station() -> Arc<ParameterService> {
    let service = ParameterService::new(Box::new(NoPermissions));
    service.load_model_text(WDM);
    service
        .register_device_description_providers(vec![MockDescriptionProvider::new(WDD)])
        .get()
        .expect("description provider registers");
    service
        .register_devices(vec![RegisterDeviceRequest {
            device_id: DeviceId::head_station(),
            order_number: "0123-0001".into(),
            firmware_version: "04.05.06".into(),
        }])
        .get()
        .expect("device registers");
    service
}

fn backup_provider() -> Arc<MockProvider> {
    MockProvider::for_definitions("backup-provider", &[300, 301, 310])
}

// ---------------------------------------------------------------------------
// File providers
// ---------------------------------------------------------------------------

#[test]
fn test_file_provider_round_trip() {
    let service = station();
    let file = MemoryFile::new(b"backup-image");
    let responses = service
        .register_file_providers(
            vec![RegisterFileProviderRequest {
                provider: Arc::clone(&file) as _,
                context: 300,
            }],
            ProviderCallMode::Concurrent,
        )
        .get()
        .expect("registration completes");
    assert_eq!(responses[0].status, StatusCode::Success);
    let file_id = responses[0].file_id.clone();
    assert_eq!(file_id.len(), 12);
    assert!(file_id.starts_with("file"));

    let read = service
        .file_read(file_id.clone(), 7, 5)
        .get()
        .expect("read completes");
    assert_eq!(read.status, StatusCode::Success);
    assert_eq!(read.data, b"image");

    service
        .file_write(file_id.clone(), 0, b"BACKUP".to_vec())
        .get()
        .expect("write completes");
    let info = service
        .file_get_info(file_id.clone())
        .get()
        .expect("info completes");
    assert_eq!(info.size, 12);

    // unregistering by the original handle drops the id
    service.unregister_file_providers(vec![file]);
    let gone = service
        .file_read(file_id, 0, 1)
        .get()
        .expect("read completes");
    assert_eq!(gone.status, StatusCode::UnknownFileId);
}

#[test]
fn test_unknown_file_id() {
    let service = station();
    let response = service
        .file_read("file00000000".to_string(), 0, 4)
        .get()
        .expect("read completes");
    assert_eq!(response.status, StatusCode::UnknownFileId);
}

#[test]
fn test_register_with_unknown_context_is_refused() {
    let service = station();
    let responses = service
        .register_file_providers(
            vec![RegisterFileProviderRequest {
                provider: MemoryFile::new(b""),
                context: 9999,
            }],
            ProviderCallMode::Concurrent,
        )
        .get()
        .expect("registration completes");
    assert_eq!(responses[0].status, StatusCode::ProviderNotOperational);
}

#[test]
fn test_reregistration_of_live_id_is_refused() {
    let service = station();
    let first = service
        .register_file_providers(
            vec![RegisterFileProviderRequest {
                provider: MemoryFile::new(b""),
                context: 300,
            }],
            ProviderCallMode::Concurrent,
        )
        .get()
        .expect("registration completes");
    let file_id = first[0].file_id.clone();

    let second = service
        .reregister_file_providers(
            vec![wdx::service::ReregisterFileProviderRequest {
                provider: MemoryFile::new(b""),
                id: file_id,
                context: 300,
            }],
            ProviderCallMode::Concurrent,
        )
        .get()
        .expect("re-registration completes");
    assert_eq!(second[0].status, StatusCode::ProviderNotOperational);
}

#[test]
fn test_serialized_file_provider_round_trip() {
    let service = station();
    let file = MemoryFile::new(b"0123456789");
    let responses = service
        .register_file_providers(
            vec![RegisterFileProviderRequest {
                provider: file,
                context: 300,
            }],
            ProviderCallMode::Serialized,
        )
        .get()
        .expect("registration completes");
    let file_id = responses[0].file_id.clone();
    let read = service
        .file_read(file_id, 2, 3)
        .get()
        .expect("read completes");
    assert_eq!(read.data, b"234");
}

// ---------------------------------------------------------------------------
// Upload ids
// ---------------------------------------------------------------------------

#[test]
fn test_upload_id_negotiation_and_lapse() {
    let service = station();
    let provider = backup_provider();
    service
        .register_parameter_providers(vec![provider.clone()], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    let response = service
        .create_parameter_upload_id(
            ParameterInstancePath::new("0-0", "Backup/Image"),
            1,
        )
        .get()
        .expect("negotiation completes");
    assert_eq!(response.status, StatusCode::Success);
    let upload_id = response.registered_file_id.clone();

    // no heartbeat for longer than the timeout window
    thread::sleep(Duration::from_millis(1300));

    let read = service
        .file_read(upload_id.clone(), 0, 4)
        .get()
        .expect("read completes");
    assert_eq!(read.status, StatusCode::UnknownFileId);
    assert!(provider.removed_upload_ids.lock().contains(&upload_id));
}

#[test]
fn test_upload_id_on_non_file_parameter() {
    let service = station();
    let provider = backup_provider();
    service
        .register_parameter_providers(vec![provider], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    let response = service
        .create_parameter_upload_id(
            ParameterInstancePath::new("0-0", "Backup/Slot"),
            10,
        )
        .get()
        .expect("negotiation completes");
    assert_eq!(response.status, StatusCode::NotAFileId);
}

#[test]
fn test_upload_id_explicit_removal() {
    let service = station();
    let provider = backup_provider();
    service
        .register_parameter_providers(vec![provider.clone()], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    let response = service
        .create_parameter_upload_id(ParameterInstancePath::new("0-0", "Backup/Image"), 600)
        .get()
        .expect("negotiation completes");
    let upload_id = response.registered_file_id.clone();

    let removed = service
        .remove_parameter_upload_id(upload_id.clone())
        .get()
        .expect("removal completes");
    assert_eq!(removed.status, StatusCode::Success);
    assert!(provider.removed_upload_ids.lock().contains(&upload_id));

    let again = service
        .remove_parameter_upload_id(upload_id)
        .get()
        .expect("removal completes");
    assert_eq!(again.status, StatusCode::UnknownFileId);
}

#[test]
fn test_upload_id_cap() {
    let service = station();
    let provider = backup_provider();
    service
        .register_parameter_providers(vec![provider], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    for _ in 0..100 {
        let response = service
            .create_parameter_upload_id(
                ParameterInstancePath::new("0-0", "Backup/Image"),
                600,
            )
            .get()
            .expect("negotiation completes");
        assert_eq!(response.status, StatusCode::Success);
    }
    let overflow = service
        .create_parameter_upload_id(ParameterInstancePath::new("0-0", "Backup/Image"), 600)
        .get()
        .expect("negotiation completes");
    assert_eq!(overflow.status, StatusCode::UploadIdMaxExceeded);
}

#[test]
fn test_cleanup_drains_upload_ids() {
    let service = station();
    let provider = backup_provider();
    service
        .register_parameter_providers(vec![provider.clone()], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    for _ in 0..3 {
        service
            .create_parameter_upload_id(ParameterInstancePath::new("0-0", "Backup/Image"), 600)
            .get()
            .expect("negotiation completes");
    }
    service.cleanup().get().expect("cleanup resolves");
    assert_eq!(provider.removed_upload_ids.lock().len(), 3);

    // the table is empty again
    let response = service
        .create_parameter_upload_id(ParameterInstancePath::new("0-0", "Backup/Image"), 600)
        .get()
        .expect("negotiation completes");
    assert_eq!(response.status, StatusCode::Success);
}

#[test]
fn test_unregistering_provider_evicts_its_upload_ids() {
    let service = station();
    let provider = backup_provider();
    service
        .register_parameter_providers(vec![provider.clone()], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");
    service
        .create_parameter_upload_id(ParameterInstancePath::new("0-0", "Backup/Image"), 600)
        .get()
        .expect("negotiation completes");

    service.unregister_parameter_providers(vec![provider]);
    service.cleanup().get().expect("cleanup resolves");
    // nothing left to drain: the eviction already removed the session
}

// ---------------------------------------------------------------------------
// Monitoring lists
// ---------------------------------------------------------------------------

#[test]
fn test_monitoring_list_round_trip() {
    let service = station();
    let provider = backup_provider();
    provider.set_answer(301, ParameterValue::Uint32(4));
    service
        .register_parameter_providers(vec![provider], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    let created = service
        .create_monitoring_list_with_paths(
            vec![ParameterInstancePath::new("0-0", "Backup/Slot")],
            60,
        )
        .get()
        .expect("creation completes");
    assert_eq!(created.status, StatusCode::Success);
    let info = created.monitoring_list.expect("info");
    assert_eq!(info.parameter_count, 1);

    let values = service
        .get_values_for_monitoring_list(info.id)
        .get()
        .expect("values complete");
    assert_eq!(values.status, StatusCode::Success);
    assert_eq!(values.values[0].status, StatusCode::Success);
    assert_eq!(values.values[0].value, Some(ParameterValue::Uint32(4)));

    let deleted = service
        .delete_monitoring_list(info.id)
        .get()
        .expect("deletion completes");
    assert_eq!(deleted.status, StatusCode::Success);

    let gone = service
        .get_values_for_monitoring_list(info.id)
        .get()
        .expect("lookup completes");
    assert_eq!(gone.status, StatusCode::UnknownMonitoringList);
}

#[test]
fn test_monitoring_list_zero_timeout_rejected() {
    let service = station();
    let created = service
        .create_monitoring_list(vec![ParameterInstanceId::new(301, 0, DeviceId::head_station())], 0)
        .get()
        .expect("creation completes");
    assert_eq!(created.status, StatusCode::InvalidTimeout);
}

#[test]
fn test_monitoring_list_lapses() {
    let service = station();
    let created = service
        .create_monitoring_list_with_paths(
            vec![ParameterInstancePath::new("0-0", "Backup/Slot")],
            1,
        )
        .get()
        .expect("creation completes");
    let info = created.monitoring_list.expect("info");

    thread::sleep(Duration::from_millis(1300));
    service.trigger_lapse_checks();

    let gone = service
        .get_monitoring_list(info.id)
        .get()
        .expect("lookup completes");
    assert_eq!(gone.status, StatusCode::UnknownMonitoringList);
}

// ---------------------------------------------------------------------------
// Method runs
// ---------------------------------------------------------------------------

#[test]
fn test_method_run_lifecycle() {
    let service = station();
    let provider = backup_provider();
    let (invocation_promise, invocation_future) = pending_invocation();
    *provider.pending_invocation.lock() = Some(invocation_future);
    service
        .register_parameter_providers(vec![provider], ProviderCallMode::Concurrent)
        .get()
        .expect("provider registers");

    let runs = RunObjectManager::new();
    let method_path = ParameterInstancePath::new("0-0", "Backup/Run");

    let invoke_future = service.invoke_method_by_path(method_path.clone(), BTreeMap::new());
    let run_id = runs.add_run_pending(&method_path, 1, invoke_future, Box::new(|_id| {}));

    // pending: full window reported, no response yet
    let run = runs.get_run(&method_path, &run_id).expect("run");
    assert!(run.response.is_none());
    assert_eq!(run.timeout_left, 1);

    invocation_promise
        .set_value(MethodInvocationResponse::new(StatusCode::Success))
        .expect("provider answers");

    let run = runs.get_run(&method_path, &run_id).expect("run");
    let response = run.response.expect("resolved response");
    assert_eq!(response.status, StatusCode::Success);

    // after the timeout span passes without another GET the sweep evicts it
    thread::sleep(Duration::from_millis(1300));
    runs.clean_runs();
    assert_eq!(
        runs.get_run(&method_path, &run_id).map(|_| ()),
        Err(StatusCode::RunNotFound)
    );
}
