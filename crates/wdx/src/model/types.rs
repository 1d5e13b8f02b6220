// SPDX-License-Identifier: MPL-2.0

//! Core identifier types: devices, device collections, parameter instances.

use crate::status::StatusCode;

/// Numeric id of a parameter definition, unique within the model.
pub type ParameterId = u32;

/// Instance number of a class instance. `0` means scalar (not a class
/// instance).
pub type InstanceId = u16;

/// Reserved instance id of the dynamic placeholder; concrete dynamic
/// instances are materialized from it on demand.
pub const DYNAMIC_PLACEHOLDER_INSTANCE_ID: InstanceId = u16::MAX;

/// Slot of a device inside its collection.
pub type SlotIndex = u16;

/// Numeric id of a device collection.
pub type DeviceCollectionId = u8;

/// The hard-wired device collections of a controller.
pub mod device_collections {
    use super::DeviceCollectionId;

    /// Head station collection (single slot).
    pub const ROOT: DeviceCollectionId = 0;
    /// Local bus.
    pub const KBUS: DeviceCollectionId = 1;
    /// Remote bus.
    pub const RLB: DeviceCollectionId = 2;
    /// Highest valid collection id.
    pub const HIGHEST: DeviceCollectionId = RLB;
}

/// Reserved parameter id carrying the device order number as a fixed value.
pub const ORDER_NUMBER_PARAMETER_ID: ParameterId = 1;
/// Reserved parameter id carrying the firmware version as a fixed value.
pub const FIRMWARE_VERSION_PARAMETER_ID: ParameterId = 6;

/// Identifies a device as `(collection, slot)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    pub collection: DeviceCollectionId,
    pub slot: SlotIndex,
}

impl DeviceId {
    pub const fn new(collection: DeviceCollectionId, slot: SlotIndex) -> Self {
        DeviceId { collection, slot }
    }

    /// The head station.
    pub const fn head_station() -> Self {
        DeviceId::new(device_collections::ROOT, 0)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.collection, self.slot)
    }
}

/// Parses a textual device path: `"<collection>-<slot>"` where the collection
/// is the numeric id or a reserved name (`root`, `kbus`, `rlb`,
/// case-insensitive). The empty string addresses the head station.
pub fn parse_device_path(device_path: &str) -> Result<DeviceId, StatusCode> {
    if device_path.is_empty() {
        return Ok(DeviceId::head_station());
    }
    let (collection_text, slot_text) = device_path
        .split_once(['-', '/'])
        .ok_or(StatusCode::UnknownDevice)?;

    // a path that does not name a known collection does not name a device
    let collection =
        parse_collection_name(collection_text).map_err(|_| StatusCode::UnknownDevice)?;
    let slot: SlotIndex = slot_text
        .parse()
        .map_err(|_| StatusCode::UnknownDevice)?;
    Ok(DeviceId::new(collection, slot))
}

/// Resolves a collection name or numeric id. The empty string means `root`.
pub fn parse_collection_name(name: &str) -> Result<DeviceCollectionId, StatusCode> {
    if name.is_empty() {
        return Ok(device_collections::ROOT);
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        let id: DeviceCollectionId = name
            .parse()
            .map_err(|_| StatusCode::InvalidDeviceCollection)?;
        if id > device_collections::HIGHEST {
            return Err(StatusCode::InvalidDeviceCollection);
        }
        return Ok(id);
    }
    match name.to_ascii_lowercase().as_str() {
        "root" => Ok(device_collections::ROOT),
        "kbus" => Ok(device_collections::KBUS),
        "rlb" => Ok(device_collections::RLB),
        _ => Err(StatusCode::UnknownDeviceCollection),
    }
}

/// Identifies one parameter instance: `(parameter_id, instance_id, device)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterInstanceId {
    pub id: ParameterId,
    pub instance: InstanceId,
    pub device: DeviceId,
}

impl ParameterInstanceId {
    pub const fn new(id: ParameterId, instance: InstanceId, device: DeviceId) -> Self {
        ParameterInstanceId {
            id,
            instance,
            device,
        }
    }

    /// Scalar instance on the head station.
    pub const fn scalar(id: ParameterId) -> Self {
        ParameterInstanceId::new(id, 0, DeviceId::head_station())
    }

    /// Equality that ignores the device part; used when matching WDD value
    /// declarations (which are device-relative) against live instances.
    pub fn equals_ignoring_device(&self, other: &ParameterInstanceId) -> bool {
        self.id == other.id && self.instance == other.instance
    }
}

impl std::fmt::Display for ParameterInstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.id, self.instance, self.device)
    }
}

/// Addresses one parameter instance by text:
/// device path plus parameter path (`class_base_path/instance_id/parameter_path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ParameterInstancePath {
    pub device_path: String,
    pub parameter_path: String,
}

impl ParameterInstancePath {
    pub fn new(device_path: impl Into<String>, parameter_path: impl Into<String>) -> Self {
        ParameterInstancePath {
            device_path: device_path.into(),
            parameter_path: parameter_path.into(),
        }
    }
}

impl std::fmt::Display for ParameterInstancePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.device_path.is_empty() {
            f.write_str(&self.parameter_path)
        } else {
            write!(f, "{}-{}", self.device_path, self.parameter_path)
        }
    }
}
