// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Validated container identifier.
/// Must be non-empty, alphanumeric with dots/hyphens/underscores, max 128 chars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Create a new ContainerId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "container_id",
                value: id,
                reason: "Container ID cannot be empty".to_string(),
            });
        }

        if id.len() > 128 {
            return Err(ValidationError::InvalidFieldValue {
                field: "container_id",
                value: id.clone(),
                reason: format!("Container ID too long: {} chars (max 128)", id.len()),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "container_id",
                value: id,
                reason: "Container ID must contain only alphanumeric characters, dots, hyphens, and underscores".to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Validated CPU architecture string (`x86_64`, `aarch64`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Architecture(String);

impl Architecture {
    /// Create a new Architecture with validation.
    pub fn new(arch: impl Into<String>) -> Result<Self, ValidationError> {
        let arch = arch.into();

        if arch.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "architecture",
                value: arch,
                reason: "Architecture cannot be empty".to_string(),
            });
        }

        if !arch
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "architecture",
                value: arch,
                reason: "Architecture must be an identifier such as x86_64 or aarch64"
                    .to_string(),
            });
        }

        Ok(Self(arch))
    }

    /// The default migration source architecture.
    pub fn x86_64() -> Self {
        Self("x86_64".to_string())
    }

    /// The default migration target architecture.
    pub fn aarch64() -> Self {
        Self("aarch64".to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Architecture {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Architecture {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Architecture> for String {
    fn from(arch: Architecture) -> Self {
        arch.0
    }
}

/// A migration target, addressed either over the device bridge or a remote shell.
///
/// `adb:<serial>` (or `adb:default` / bare `adb:` for the only connected
/// device) selects the bridge transport; anything else is treated as a
/// `user@host` remote-shell address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetHost {
    /// A device reachable over the bridge transport.
    Device { serial: Option<String> },
    /// A host reachable over the remote shell (`user@host` form).
    Remote { address: String },
}

impl TargetHost {
    const DEVICE_PREFIX: &'static str = "adb:";

    /// Parse a target host address with validation.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = raw.as_ref();

        if raw.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "target_host",
                value: raw.to_string(),
                reason: "Target host cannot be empty".to_string(),
            });
        }

        if let Some(serial) = raw.strip_prefix(Self::DEVICE_PREFIX) {
            let serial = match serial {
                "" | "default" => None,
                s => Some(s.to_string()),
            };
            return Ok(Self::Device { serial });
        }

        Ok(Self::Remote {
            address: raw.to_string(),
        })
    }

    /// True when the target is addressed over the device bridge.
    pub fn is_device(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}

impl fmt::Display for TargetHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device { serial: Some(s) } => write!(f, "adb:{}", s),
            Self::Device { serial: None } => write!(f, "adb:default"),
            Self::Remote { address } => write!(f, "{}", address),
        }
    }
}

impl FromStr for TargetHost {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TargetHost {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TargetHost> for String {
    fn from(host: TargetHost) -> Self {
        host.to_string()
    }
}
