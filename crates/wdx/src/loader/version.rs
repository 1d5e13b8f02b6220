// SPDX-License-Identifier: MPL-2.0

//! WDMM version parsing and compatibility.
//!
//! `major.minor.patch`, every component a decimal number fitting `u16`.
//! A document is accepted when its major equals the supported major and its
//! minor is the same or lower; the patch level does not gate acceptance.

use crate::error::{Error, Result};

/// The WDMM revision this service implements.
pub const SUPPORTED_WDMM_VERSION: WdmmVersion = WdmmVersion {
    major: 1,
    minor: 3,
    patch: 0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WdmmVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl WdmmVersion {
    /// Strict parse: exactly three non-empty numeric components, each within
    /// `u16` range.
    pub fn parse(text: &str) -> Result<WdmmVersion> {
        let mut components = [0u16; 3];
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::UnsupportedVersion(format!(
                "'{text}' is not of the form major.minor.patch"
            )));
        }
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::UnsupportedVersion(format!(
                    "'{text}' contains a non-numeric component"
                )));
            }
            *slot = part.parse().map_err(|_| {
                Error::UnsupportedVersion(format!("'{text}' contains an out-of-range component"))
            })?;
        }
        Ok(WdmmVersion {
            major: components[0],
            minor: components[1],
            patch: components[2],
        })
    }

    /// Accepts same major and same-or-lower minor.
    pub fn is_supported(&self) -> bool {
        self.major == SUPPORTED_WDMM_VERSION.major && self.minor <= SUPPORTED_WDMM_VERSION.minor
    }

    /// Parses and gates in one step.
    pub fn parse_supported(text: &str) -> Result<WdmmVersion> {
        let version = WdmmVersion::parse(text)?;
        if !version.is_supported() {
            return Err(Error::UnsupportedVersion(format!(
                "'{text}' is newer than supported {}.{}.x",
                SUPPORTED_WDMM_VERSION.major, SUPPORTED_WDMM_VERSION.minor
            )));
        }
        Ok(version)
    }
}

impl std::fmt::Display for WdmmVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_same_and_lower_minor() {
        assert!(WdmmVersion::parse_supported("1.0.0").is_ok());
        assert!(WdmmVersion::parse_supported("1.1.0").is_ok());
        assert!(WdmmVersion::parse_supported("1.1.999").is_ok());
        assert!(WdmmVersion::parse_supported("1.3.0").is_ok());
    }

    #[test]
    fn test_rejects_higher_minor_and_major() {
        assert!(WdmmVersion::parse_supported("1.4.0").is_err());
        assert!(WdmmVersion::parse_supported("2.0.0").is_err());
    }

    #[test]
    fn test_rejects_malformed_components() {
        assert!(WdmmVersion::parse("1..0").is_err());
        assert!(WdmmVersion::parse("1.1.a").is_err());
        assert!(WdmmVersion::parse("1.1").is_err());
        assert!(WdmmVersion::parse("1.1.65536").is_err());
        assert!(WdmmVersion::parse("").is_err());
    }

    #[test]
    fn test_boundary_patch_value() {
        assert!(WdmmVersion::parse("1.1.65535").is_ok());
    }
}
