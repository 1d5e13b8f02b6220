// SPDX-License-Identifier: MPL-2.0

//! Per-item status codes.
//!
//! Batched requests report problems per index; these codes are the shared
//! vocabulary between the dispatcher, the providers and the front ends.
//! `NoErrorYet` is the "undetermined" marker: a response that still carries it
//! after integration was not handled by anyone.

/// Status of a single request item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Initial state; the item has not been determined yet.
    NoErrorYet,
    /// The operation succeeded.
    Success,
    /// The write succeeded but will be committed after the response has been
    /// delivered (control-channel change was deferred).
    WdaConnectionChangesDeferred,
    /// The item was deliberately skipped (inactive parameter).
    Ignored,

    // ========================================================================
    // Routing
    // ========================================================================
    UnknownDeviceCollection,
    InvalidDeviceCollection,
    InvalidDeviceSlot,
    UnknownDevice,
    DeviceAlreadyExists,
    UnknownParameterId,
    UnknownParameterPath,
    UnknownFeatureName,
    FeatureNotAvailable,
    UnknownEnumName,

    // ========================================================================
    // Shape
    // ========================================================================
    NotAMethod,
    MethodsDoNotHaveValue,
    NotAFileId,

    // ========================================================================
    // Binding
    // ========================================================================
    ParameterNotProvided,
    StatusValueUnavailable,
    ProviderNotOperational,

    // ========================================================================
    // Validation
    // ========================================================================
    ParameterNotWriteable,
    InvalidType,
    InvalidValue,
    ValueOutOfRange,
    PatternMismatch,
    ValueNotInAllowedSet,
    MissingArgument,
    OtherInvalidValueInSet,

    // ========================================================================
    // Instantiation consistency
    // ========================================================================
    MissingParameterForInstantiation,
    NotExistingForInstance,
    InstanceKeyNotWriteable,

    // ========================================================================
    // Sessions
    // ========================================================================
    UnknownFileId,
    UploadIdMaxExceeded,
    FileNotAccessible,
    FileSizeExceeded,
    UnknownMonitoringList,
    InvalidTimeout,
    RunNotFound,

    // ========================================================================
    // Integration
    // ========================================================================
    UnsupportedVersion,
    InternalError,
}

impl StatusCode {
    /// True once any determination has been made for the item.
    pub fn is_determined(self) -> bool {
        self != StatusCode::NoErrorYet
    }

    /// True for the success family (including deferred commits).
    pub fn is_success(self) -> bool {
        matches!(
            self,
            StatusCode::Success | StatusCode::WdaConnectionChangesDeferred
        )
    }

    /// True for determined, non-success, non-ignored statuses.
    pub fn is_error(self) -> bool {
        self.is_determined() && !self.is_success() && self != StatusCode::Ignored
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::NoErrorYet
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StatusCode::NoErrorYet => "no_error_yet",
            StatusCode::Success => "success",
            StatusCode::WdaConnectionChangesDeferred => "wda_connection_changes_deferred",
            StatusCode::Ignored => "ignored",
            StatusCode::UnknownDeviceCollection => "unknown_device_collection",
            StatusCode::InvalidDeviceCollection => "invalid_device_collection",
            StatusCode::InvalidDeviceSlot => "invalid_device_slot",
            StatusCode::UnknownDevice => "unknown_device",
            StatusCode::DeviceAlreadyExists => "device_already_exists",
            StatusCode::UnknownParameterId => "unknown_parameter_id",
            StatusCode::UnknownParameterPath => "unknown_parameter_path",
            StatusCode::UnknownFeatureName => "unknown_feature_name",
            StatusCode::FeatureNotAvailable => "feature_not_available",
            StatusCode::UnknownEnumName => "unknown_enum_name",
            StatusCode::NotAMethod => "not_a_method",
            StatusCode::MethodsDoNotHaveValue => "methods_do_not_have_value",
            StatusCode::NotAFileId => "not_a_file_id",
            StatusCode::ParameterNotProvided => "parameter_not_provided",
            StatusCode::StatusValueUnavailable => "status_value_unavailable",
            StatusCode::ProviderNotOperational => "provider_not_operational",
            StatusCode::ParameterNotWriteable => "parameter_not_writeable",
            StatusCode::InvalidType => "invalid_type",
            StatusCode::InvalidValue => "invalid_value",
            StatusCode::ValueOutOfRange => "value_out_of_range",
            StatusCode::PatternMismatch => "pattern_mismatch",
            StatusCode::ValueNotInAllowedSet => "value_not_in_allowed_set",
            StatusCode::MissingArgument => "missing_argument",
            StatusCode::OtherInvalidValueInSet => "other_invalid_value_in_set",
            StatusCode::MissingParameterForInstantiation => "missing_parameter_for_instantiation",
            StatusCode::NotExistingForInstance => "not_existing_for_instance",
            StatusCode::InstanceKeyNotWriteable => "instance_key_not_writeable",
            StatusCode::UnknownFileId => "unknown_file_id",
            StatusCode::UploadIdMaxExceeded => "upload_id_max_exceeded",
            StatusCode::FileNotAccessible => "file_not_accessible",
            StatusCode::FileSizeExceeded => "file_size_exceeded",
            StatusCode::UnknownMonitoringList => "unknown_monitoring_list",
            StatusCode::InvalidTimeout => "invalid_timeout",
            StatusCode::RunNotFound => "run_not_found",
            StatusCode::UnsupportedVersion => "unsupported_version",
            StatusCode::InternalError => "internal_error",
        };
        f.write_str(text)
    }
}
