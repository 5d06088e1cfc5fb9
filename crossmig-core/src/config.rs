// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML settings parser with strict schema validation.
//!
//! Validates tool settings at startup. Any invalid field results in a
//! ValidationError that prevents the orchestrator from being built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MigrateError, ValidationError};
use crate::types::{Architecture, ContainerId, TargetHost};

/// Bounds for short local inspection/connectivity timeouts.
const MIN_PROBE_SECS: u64 = 5;
const MAX_PROBE_SECS: u64 = 15;
/// Bounds for transfer- and restore-scale timeouts.
const MIN_LONG_SECS: u64 = 30;
const MAX_LONG_SECS: u64 = 120;

/// Raw settings as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default)]
    checkpoint_dir: Option<String>,
    #[serde(default)]
    checkpoint_binary: Option<String>,
    #[serde(default = "default_remote_work_dir")]
    remote_work_dir: String,
    #[serde(default)]
    timeouts: RawTimeouts,
}

fn default_work_dir() -> String {
    "/var/tmp/crossmig".to_string()
}

fn default_remote_work_dir() -> String {
    "/data/local/tmp/migration".to_string()
}

/// Raw per-operation timeouts, in seconds.
#[derive(Debug, Deserialize)]
struct RawTimeouts {
    #[serde(default = "default_probe_secs")]
    probe_secs: u64,
    #[serde(default = "default_shell_secs")]
    shell_secs: u64,
    #[serde(default = "default_transfer_secs")]
    transfer_secs: u64,
    #[serde(default = "default_checkpoint_secs")]
    checkpoint_secs: u64,
    #[serde(default = "default_restore_secs")]
    restore_secs: u64,
}

fn default_probe_secs() -> u64 {
    10
}

fn default_shell_secs() -> u64 {
    30
}

fn default_transfer_secs() -> u64 {
    120
}

fn default_checkpoint_secs() -> u64 {
    120
}

fn default_restore_secs() -> u64 {
    120
}

impl Default for RawTimeouts {
    fn default() -> Self {
        Self {
            probe_secs: default_probe_secs(),
            shell_secs: default_shell_secs(),
            transfer_secs: default_transfer_secs(),
            checkpoint_secs: default_checkpoint_secs(),
            restore_secs: default_restore_secs(),
        }
    }
}

/// Validated per-operation timeouts.
///
/// Short timeouts cover local inspection and connectivity probes; long
/// timeouts cover transfer- and restore-scale operations. A timeout is a
/// failure and is never retried.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    probe_secs: u64,
    shell_secs: u64,
    transfer_secs: u64,
    checkpoint_secs: u64,
    restore_secs: u64,
}

impl Timeouts {
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn shell(&self) -> Duration {
        Duration::from_secs(self.shell_secs)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer_secs)
    }

    pub fn checkpoint(&self) -> Duration {
        Duration::from_secs(self.checkpoint_secs)
    }

    pub fn restore(&self) -> Duration {
        Duration::from_secs(self.restore_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe_secs: default_probe_secs(),
            shell_secs: default_shell_secs(),
            transfer_secs: default_transfer_secs(),
            checkpoint_secs: default_checkpoint_secs(),
            restore_secs: default_restore_secs(),
        }
    }
}

/// Validated tool settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Working directory for packages and unpacked checkpoints.
    pub work_dir: PathBuf,
    /// Base directory for raw checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Explicit checkpoint binary path; discovered when absent.
    pub checkpoint_binary: Option<PathBuf>,
    /// Working directory on migration targets.
    pub remote_work_dir: String,
    pub timeouts: Timeouts,
}

impl Default for Settings {
    fn default() -> Self {
        let work_dir = PathBuf::from(default_work_dir());
        let checkpoint_dir = work_dir.join("checkpoints");
        Self {
            work_dir,
            checkpoint_dir,
            checkpoint_binary: None,
            remote_work_dir: default_remote_work_dir(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Settings loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate settings from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Settings, MigrateError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| MigrateError::Io {
            context: "reading settings file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate settings from a YAML string.
    pub fn load_string(content: &str) -> Result<Settings, MigrateError> {
        let raw: RawSettings =
            serde_yaml::from_str(content).map_err(|e| MigrateError::Metadata {
                context: "parsing settings",
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Settings, MigrateError> {
        if raw.work_dir.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "work_dir",
                value: raw.work_dir,
                reason: "Working directory cannot be empty".to_string(),
            }
            .into());
        }

        if raw.remote_work_dir.is_empty() || !raw.remote_work_dir.starts_with('/') {
            return Err(ValidationError::InvalidFieldValue {
                field: "remote_work_dir",
                value: raw.remote_work_dir,
                reason: "Remote working directory must be an absolute path".to_string(),
            }
            .into());
        }

        let timeouts = Self::validate_timeouts(raw.timeouts)?;

        let work_dir = PathBuf::from(&raw.work_dir);
        let checkpoint_dir = raw
            .checkpoint_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join("checkpoints"));

        Ok(Settings {
            work_dir,
            checkpoint_dir,
            checkpoint_binary: raw.checkpoint_binary.map(PathBuf::from),
            remote_work_dir: raw.remote_work_dir,
            timeouts,
        })
    }

    fn validate_timeouts(raw: RawTimeouts) -> Result<Timeouts, MigrateError> {
        if !(MIN_PROBE_SECS..=MAX_PROBE_SECS).contains(&raw.probe_secs) {
            return Err(ValidationError::InvalidFieldValue {
                field: "probe_secs",
                value: raw.probe_secs.to_string(),
                reason: format!(
                    "Must be between {} and {} seconds",
                    MIN_PROBE_SECS, MAX_PROBE_SECS
                ),
            }
            .into());
        }

        let long = [
            ("transfer_secs", raw.transfer_secs),
            ("checkpoint_secs", raw.checkpoint_secs),
            ("restore_secs", raw.restore_secs),
        ];
        for (field, value) in long {
            if !(MIN_LONG_SECS..=MAX_LONG_SECS).contains(&value) {
                return Err(ValidationError::InvalidFieldValue {
                    field,
                    value: value.to_string(),
                    reason: format!(
                        "Must be between {} and {} seconds",
                        MIN_LONG_SECS, MAX_LONG_SECS
                    ),
                }
                .into());
            }
        }

        if raw.shell_secs == 0 || raw.shell_secs > MAX_LONG_SECS {
            return Err(ValidationError::InvalidFieldValue {
                field: "shell_secs",
                value: raw.shell_secs.to_string(),
                reason: format!("Must be between 1 and {} seconds", MAX_LONG_SECS),
            }
            .into());
        }

        Ok(Timeouts {
            probe_secs: raw.probe_secs,
            shell_secs: raw.shell_secs,
            transfer_secs: raw.transfer_secs,
            checkpoint_secs: raw.checkpoint_secs,
            restore_secs: raw.restore_secs,
        })
    }
}

/// Immutable configuration for one migration attempt.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub container_id: ContainerId,
    pub source_host: String,
    pub target_host: TargetHost,
    pub source_arch: Architecture,
    pub target_arch: Architecture,
    pub preserve_networking: bool,
    pub preserve_volumes: bool,
    pub rollback_on_failure: bool,
}

impl MigrationConfig {
    /// Create a migration configuration with validated defaults.
    pub fn new(container_id: ContainerId, target_host: TargetHost) -> Self {
        Self {
            container_id,
            source_host: "localhost".to_string(),
            target_host,
            source_arch: Architecture::x86_64(),
            target_arch: Architecture::aarch64(),
            preserve_networking: true,
            preserve_volumes: true,
            rollback_on_failure: true,
        }
    }
}
