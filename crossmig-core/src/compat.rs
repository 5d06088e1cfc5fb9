//! Static pre-flight compatibility assessment.
//!
//! Judges whether a container's configuration is expected to survive
//! cross-architecture checkpoint/restore. Fails closed when the container
//! cannot be inspected. Cross-ISA binary concerns are deliberately deferred
//! to restore time; `architecture_compatible` only reports what inspection
//! can see.

use serde::Serialize;

use crate::error::{MigrateError, NotFoundError};
use crate::runtime::ContainerRuntime;
use crate::types::{Architecture, ContainerId};

/// Outcome of a compatibility assessment.
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityCheck {
    pub is_compatible: bool,
    pub architecture_compatible: bool,
    pub kernel_compatible: bool,
    pub runtime_compatible: bool,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

impl CompatibilityCheck {
    fn failed_closed(issues: Vec<String>) -> Self {
        Self {
            is_compatible: false,
            architecture_compatible: false,
            kernel_compatible: false,
            runtime_compatible: false,
            issues,
            recommendations: Vec::new(),
        }
    }
}

/// Pre-flight checker over the container runtime's inspection interface.
pub struct CompatibilityChecker {
    runtime: ContainerRuntime,
}

impl CompatibilityChecker {
    pub fn new(runtime: ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Assess a container for migration to `target_arch`.
    pub fn check(&self, id: &ContainerId, target_arch: &Architecture) -> CompatibilityCheck {
        tracing::debug!(container_id = %id, target_arch = %target_arch, "Checking compatibility");

        let info = match self.runtime.inspect(id) {
            Ok(info) => info,
            Err(MigrateError::NotFound(NotFoundError::Container(_))) => {
                return CompatibilityCheck::failed_closed(vec![format!(
                    "Container {} not found",
                    id
                )]);
            }
            Err(e) => {
                return CompatibilityCheck::failed_closed(vec![format!(
                    "Compatibility check failed: {}",
                    e
                )]);
            }
        };

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        // Image architecture has already been pulled through the runtime;
        // whether the binaries actually run on the target ISA is decided by
        // the restore itself.
        let architecture_compatible = true;

        let kernel_compatible = if info.privileged {
            issues.push("Privileged containers may not migrate properly".to_string());
            recommendations.push("Consider running without privileged mode".to_string());
            false
        } else {
            true
        };

        let mut runtime_compatible = true;
        if info.host_networking {
            runtime_compatible = false;
            issues.push("Host networking mode not compatible with migration".to_string());
            recommendations.push("Use bridge or custom network mode".to_string());
        }
        if !info.binds.is_empty() {
            runtime_compatible = false;
            issues.push("Host bind mounts may not exist on target".to_string());
            recommendations
                .push("Ensure bind mount paths exist on target or use volumes".to_string());
        }
        if info.device_count > 0 {
            runtime_compatible = false;
            issues.push("Device mounts may not be available on target".to_string());
            recommendations
                .push("Remove device dependencies or ensure target compatibility".to_string());
        }

        // Advisory only; does not flip any flag.
        if !info.added_capabilities.is_empty() {
            issues.push("Additional capabilities may not be available on target".to_string());
            recommendations.push("Verify capability support on target kernel".to_string());
        }

        CompatibilityCheck {
            is_compatible: architecture_compatible && kernel_compatible && runtime_compatible,
            architecture_compatible,
            kernel_compatible,
            runtime_compatible,
            issues,
            recommendations,
        }
    }
}
