//! Container runtime inspection port.
//!
//! Wraps `docker inspect` output into a typed view of the bits the migration
//! pipeline cares about. The runtime itself is a black-box collaborator; only
//! inspection and version queries are consumed here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MigrateError, NotFoundError};
use crate::runner::CommandRunner;
use crate::types::ContainerId;

/// Raw `docker inspect` document (one array element), before projection.
#[derive(Debug, Deserialize)]
struct RawInspect {
    #[serde(rename = "State", default)]
    state: RawState,
    #[serde(rename = "Config", default)]
    config: RawConfig,
    #[serde(rename = "HostConfig", default)]
    host_config: RawHostConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawState {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Pid", default)]
    pid: i64,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(rename = "ExposedPorts", default)]
    exposed_ports: Option<HashMap<String, serde_json::Value>>,
    #[serde(rename = "Architecture", default)]
    architecture: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawHostConfig {
    #[serde(rename = "Privileged", default)]
    privileged: bool,
    #[serde(rename = "NetworkMode", default)]
    network_mode: String,
    #[serde(rename = "Binds", default)]
    binds: Option<Vec<String>>,
    #[serde(rename = "Devices", default)]
    devices: Option<Vec<serde_json::Value>>,
    #[serde(rename = "CapAdd", default)]
    cap_add: Option<Vec<String>>,
}

/// Projected view of a container's migration-relevant configuration.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub running: bool,
    pub status: String,
    pub pid: Option<u32>,
    pub privileged: bool,
    pub host_networking: bool,
    pub binds: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub device_count: usize,
    pub added_capabilities: Vec<String>,
    pub image_architecture: String,
}

/// Inspection/control interface over the container runtime.
#[derive(Clone)]
pub struct ContainerRuntime {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl ContainerRuntime {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Inspect a container. A nonexistent container is a NotFoundError.
    pub fn inspect(&self, id: &ContainerId) -> Result<ContainerInfo, MigrateError> {
        let output =
            self.runner
                .run_with_timeout("docker", &["inspect", id.as_str()], self.timeout)?;

        if !output.success() {
            tracing::debug!(container_id = %id, detail = %output.detail(), "Container inspect failed");
            return Err(NotFoundError::Container(id.clone()).into());
        }

        let docs: Vec<RawInspect> =
            serde_json::from_str(&output.stdout).map_err(|e| MigrateError::Metadata {
                context: "parsing container inspect output",
                message: e.to_string(),
            })?;

        let raw = docs
            .into_iter()
            .next()
            .ok_or_else(|| MigrateError::NotFound(NotFoundError::Container(id.clone())))?;

        Ok(ContainerInfo {
            running: raw.state.status == "running",
            status: raw.state.status,
            pid: u32::try_from(raw.state.pid).ok().filter(|p| *p > 0),
            privileged: raw.host_config.privileged,
            host_networking: raw.host_config.network_mode == "host",
            binds: raw.host_config.binds.unwrap_or_default(),
            exposed_ports: raw
                .config
                .exposed_ports
                .map(|ports| ports.into_keys().collect())
                .unwrap_or_default(),
            device_count: raw.host_config.devices.map(|d| d.len()).unwrap_or(0),
            added_capabilities: raw.host_config.cap_add.unwrap_or_default(),
            image_architecture: raw
                .config
                .architecture
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Runtime version string, "unknown" when the query fails.
    pub fn version(&self) -> String {
        match self
            .runner
            .run_with_timeout("docker", &["--version"], self.timeout)
        {
            Ok(output) if output.success() => output.stdout.trim().to_string(),
            _ => "unknown".to_string(),
        }
    }
}
