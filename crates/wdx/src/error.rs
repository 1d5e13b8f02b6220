// SPDX-License-Identifier: MPL-2.0

//! Crate-wide error type.
//!
//! Per-item problems in batched requests travel as [`crate::status::StatusCode`]
//! inside the response items; `Error` is reserved for whole-operation failures
//! (future/promise misuse, unparsable documents, broken collaborators).

use crate::status::StatusCode;

/// Errors surfaced by WDX operations.
#[derive(Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Future / promise protocol errors
    // ========================================================================
    /// The future's result was already retrieved (by `get` or a notifier).
    AlreadyRetrieved,
    /// The promise was dropped without a value, an error, or a dismissal.
    BrokenPromise,
    /// `set_value`/`set_error` was called on an already satisfied promise.
    PromiseAlreadySatisfied,
    /// A serializing wrapper was torn down before the wrapped provider
    /// delivered its response.
    SerialWrapperCleanedUp,

    // ========================================================================
    // Document / model errors
    // ========================================================================
    /// A WDM document could not be parsed.
    ModelFormat(String),
    /// A WDD document could not be parsed.
    DescriptionFormat(String),
    /// A WDMM version string was malformed or incompatible.
    UnsupportedVersion(String),

    // ========================================================================
    // Operational errors
    // ========================================================================
    /// A parameter operation failed with the given status.
    Parameter(StatusCode, String),
    /// A provider misbehaved (panicked, returned garbage, went away).
    Provider(String),
}

impl Error {
    /// Status code equivalent used when an `Error` has to be folded into a
    /// per-item response.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Parameter(status, _) => *status,
            Error::UnsupportedVersion(_) => StatusCode::UnsupportedVersion,
            _ => StatusCode::InternalError,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AlreadyRetrieved => write!(f, "future result already retrieved"),
            Error::BrokenPromise => write!(f, "promise dropped without result"),
            Error::PromiseAlreadySatisfied => write!(f, "promise already satisfied"),
            Error::SerialWrapperCleanedUp => write!(
                f,
                "serial wrapper has been cleaned up before the response has been received"
            ),
            Error::ModelFormat(msg) => write!(f, "invalid device model: {msg}"),
            Error::DescriptionFormat(msg) => write!(f, "invalid device description: {msg}"),
            Error::UnsupportedVersion(msg) => write!(f, "unsupported WDMM version: {msg}"),
            Error::Parameter(status, msg) if msg.is_empty() => {
                write!(f, "parameter operation failed: {status}")
            }
            Error::Parameter(status, msg) => {
                write!(f, "parameter operation failed: {status}: {msg}")
            }
            Error::Provider(msg) => write!(f, "provider failure: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_status() {
        let err = Error::Parameter(StatusCode::UnknownDevice, "no slot 5".into());
        let text = format!("{err}");
        assert!(text.contains("unknown_device"));
        assert!(text.contains("no slot 5"));
    }

    #[test]
    fn test_status_folding() {
        assert_eq!(
            Error::BrokenPromise.status(),
            StatusCode::InternalError
        );
        assert_eq!(
            Error::Parameter(StatusCode::UnknownFileId, String::new()).status(),
            StatusCode::UnknownFileId
        );
    }
}
