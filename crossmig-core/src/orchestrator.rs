// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Migration orchestrator.
//!
//! Drives checkpoint → package → transfer → restore → validate as a forward
//! state machine, with best-effort rollback to the retained source checkpoint
//! on failure. Attempts are tracked per container identity; concurrent calls
//! for the same identity must be serialized by the caller.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::checkpoint::{
    CheckpointConfig, CheckpointEngine, CheckpointOptions, CheckpointPackage, CheckpointPackager,
};
use crate::compat::{CompatibilityCheck, CompatibilityChecker};
use crate::config::{MigrationConfig, Settings};
use crate::error::{IntegrityError, MigrateError, TransferError};
use crate::registry::MigrationRegistry;
use crate::runner::{CommandRunner, SystemRunner};
use crate::runtime::ContainerRuntime;
use crate::state::{MigrationResult, MigrationStatus};
use crate::transfer::{PackageTransfer, TransferConfig};
use crate::transport::Transport;
use crate::types::{Architecture, ContainerId, TargetHost};

/// Checkpoint binary location on bridge-addressed devices.
const DEVICE_CHECKPOINT_BINARY: &str = "/data/local/tmp/criu";
/// Library path the device binary is linked against.
const DEVICE_LIBRARY_PATH: &str = "/data/local/tmp/lib";

/// Outcome of prerequisite validation: the complete remediation list.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub errors: Vec<String>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Orchestrates cross-architecture container migration.
pub struct MigrationOrchestrator {
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    runtime: ContainerRuntime,
    engine: CheckpointEngine,
    packager: CheckpointPackager,
    transfer: PackageTransfer,
    compat: CompatibilityChecker,
    registry: MigrationRegistry,
}

impl MigrationOrchestrator {
    /// Build an orchestrator with an injected command runner.
    pub fn new(settings: Settings, runner: Arc<dyn CommandRunner>) -> Result<Self, MigrateError> {
        std::fs::create_dir_all(&settings.work_dir).map_err(|e| MigrateError::Io {
            context: "creating work directory",
            source: e,
        })?;
        std::fs::create_dir_all(&settings.checkpoint_dir).map_err(|e| MigrateError::Io {
            context: "creating checkpoint directory",
            source: e,
        })?;

        let runtime = ContainerRuntime::new(runner.clone(), settings.timeouts.probe());
        let engine = CheckpointEngine::new(
            runner.clone(),
            runtime.clone(),
            settings.checkpoint_dir.clone(),
            settings.checkpoint_binary.clone(),
            settings.timeouts,
        );
        let packager = CheckpointPackager::new(settings.work_dir.clone());
        let transfer = PackageTransfer::new(runner.clone(), settings.timeouts);
        let compat = CompatibilityChecker::new(runtime.clone());

        Ok(Self {
            settings,
            runner,
            runtime,
            engine,
            packager,
            transfer,
            compat,
            registry: MigrationRegistry::new(),
        })
    }

    /// Build an orchestrator over the real system runner.
    pub fn with_system_runner(settings: Settings) -> Result<Self, MigrateError> {
        Self::new(settings, Arc::new(SystemRunner::new()))
    }

    /// Validate prerequisites for a migration.
    ///
    /// All three checks run independently; every failure is collected so the
    /// caller receives the complete remediation list.
    pub fn validate_migration_prerequisites(&self, config: &MigrationConfig) -> PreflightReport {
        let mut errors = Vec::new();

        match self.runtime.inspect(&config.container_id) {
            Ok(info) if !info.running => {
                errors.push(format!(
                    "Container {} is not running",
                    config.container_id
                ));
            }
            Ok(_) => {}
            Err(_) => {
                errors.push(format!(
                    "Container {} not found on source",
                    config.container_id
                ));
            }
        }

        if let Err(e) = self.engine.configure_environment() {
            errors.push(format!("Checkpoint environment not ready: {}", e));
        }

        if self.transport_for(&config.target_host).probe().is_err() {
            errors.push(format!(
                "Cannot connect to target host: {}",
                config.target_host
            ));
        }

        PreflightReport { errors }
    }

    /// Compatibility assessment, exposed directly for dry-run use.
    pub fn check_container_compatibility(
        &self,
        id: &ContainerId,
        target_arch: &Architecture,
    ) -> CompatibilityCheck {
        self.compat.check(id, target_arch)
    }

    /// Migrate a container to the configured target host.
    pub fn migrate_container(&self, config: &MigrationConfig) -> MigrationResult {
        let started = Instant::now();
        let mut result = MigrationResult::new(config.container_id.clone());

        if let Err(e) = self.registry.begin(&config.container_id) {
            result.error_message = Some(e.to_string());
            let _ = result.transition_to(MigrationStatus::Failed);
            return result;
        }

        tracing::info!(
            container_id = %config.container_id,
            target = %config.target_host,
            source_arch = %config.source_arch,
            target_arch = %config.target_arch,
            "Starting migration"
        );

        let _ = result.transition_to(MigrationStatus::InProgress);
        self.registry.update(&result);

        // Prerequisite failure must leave zero side effects behind.
        let preflight = self.validate_migration_prerequisites(config);
        if !preflight.is_ok() {
            return self.fail(
                result,
                format!(
                    "Prerequisites validation failed: {}",
                    preflight.errors.join("; ")
                ),
            );
        }

        let compat = self
            .compat
            .check(&config.container_id, &config.target_arch);
        if !compat.is_compatible {
            return self.fail(
                result,
                format!("Container not compatible: {}", compat.issues.join("; ")),
            );
        }
        // Advisory compatibility issues ride along as warnings.
        result.warnings.extend(compat.issues);

        if self.cancelled(config, &mut result) {
            return result;
        }

        let _ = result.transition_to(MigrationStatus::Checkpointing);
        self.registry.update(&result);

        let checkpoint_config = CheckpointConfig {
            container_id: config.container_id.clone(),
            checkpoint_dir: self.settings.checkpoint_dir.clone(),
            work_dir: self.settings.work_dir.clone(),
            options: CheckpointOptions {
                leave_running: false,
                tcp_established: config.preserve_networking,
                shell_job: true,
                ext_unix_sk: true,
                // Lock state only matters when volume data moves with the
                // container.
                file_locks: config.preserve_volumes,
            },
        };

        let checkpoint = self.engine.create_checkpoint(&checkpoint_config);
        result.warnings.extend(checkpoint.warnings.clone());
        if !checkpoint.success {
            // Nothing exists yet to roll back.
            return self.fail(
                result,
                format!(
                    "Checkpoint creation failed: {}",
                    checkpoint.error_message.unwrap_or_default()
                ),
            );
        }
        result.source_checkpoint_path = checkpoint.checkpoint_path.clone();
        self.registry.update(&result);

        if self.cancelled(config, &mut result) {
            return result;
        }

        let _ = result.transition_to(MigrationStatus::Transferring);
        self.registry.update(&result);

        let checkpoint_path = match result.source_checkpoint_path.clone() {
            Some(path) => path,
            None => {
                return self.fail(result, "Checkpoint path missing after dump".to_string());
            }
        };

        let package = match self.transfer_stage(config, &checkpoint_path) {
            Ok(package) => package,
            Err(e) => {
                return self.fail_with_rollback(
                    config,
                    result,
                    format!("Checkpoint transfer failed: {}", e),
                );
            }
        };

        if self.cancelled(config, &mut result) {
            return result;
        }

        let _ = result.transition_to(MigrationStatus::Restoring);
        self.registry.update(&result);

        match self.restore_on_target(config, &package) {
            Ok(restored_dir) => result.target_checkpoint_path = Some(restored_dir),
            Err(e) => {
                return self.fail_with_rollback(
                    config,
                    result,
                    format!("Restore on target failed: {}", e),
                );
            }
        }
        self.registry.update(&result);

        if self.cancelled(config, &mut result) {
            return result;
        }

        let _ = result.transition_to(MigrationStatus::Validating);
        self.registry.update(&result);

        // An inconclusive query never triggers rollback; the process may be
        // running fine despite a failed check over the transport.
        if let Err(warning) = self.confirm_running_on_target(config) {
            tracing::warn!(container_id = %config.container_id, warning = %warning, "Target validation inconclusive");
            result.warnings.push(warning);
        }

        let _ = result.transition_to(MigrationStatus::Completed);
        result.success = true;
        result.migration_time = Some(started.elapsed());
        self.registry.update(&result);

        tracing::info!(
            container_id = %config.container_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Migration completed"
        );

        result
    }

    /// All tracked attempts that have not reached a terminal state.
    pub fn list_active_migrations(&self) -> Vec<MigrationResult> {
        self.registry.active()
    }

    /// Status of a tracked migration; terminal results remain queryable.
    pub fn get_migration_status(&self, id: &ContainerId) -> Option<MigrationResult> {
        self.registry.get(id)
    }

    /// Request cooperative cancellation of an in-flight migration.
    ///
    /// The flag is checked between pipeline stages; an already-dispatched
    /// external command is never interrupted.
    pub fn cancel_migration(&self, id: &ContainerId) -> bool {
        self.registry.request_cancel(id)
    }

    fn transport_for(&self, host: &TargetHost) -> Transport {
        Transport::new(self.runner.clone(), host.clone(), self.settings.timeouts)
    }

    fn remote_package_path(&self, id: &ContainerId) -> String {
        format!(
            "{}/{}_checkpoint.tar.gz",
            self.settings.remote_work_dir, id
        )
    }

    fn remote_restore_dir(&self, id: &ContainerId) -> String {
        format!("{}/{}_restored", self.settings.remote_work_dir, id)
    }

    /// Package the checkpoint, verify it locally, and push it to the target.
    fn transfer_stage(
        &self,
        config: &MigrationConfig,
        checkpoint_path: &Path,
    ) -> Result<CheckpointPackage, MigrateError> {
        let package = self.packager.package_checkpoint(checkpoint_path, None)?;

        if !self
            .packager
            .verify_package_integrity(&package.package_path)?
        {
            return Err(IntegrityError::ChecksumMismatch {
                expected: package.checksum.clone(),
                actual: crate::checkpoint::file_sha256(&package.package_path)?,
            }
            .into());
        }

        self.transfer.transfer(&TransferConfig {
            source_path: package.package_path.clone(),
            target_host: config.target_host.clone(),
            target_path: self.remote_package_path(&config.container_id),
            cleanup_source: false,
        })?;

        Ok(package)
    }

    /// Verify, unpack, and restore the package on the target host.
    fn restore_on_target(
        &self,
        config: &MigrationConfig,
        package: &CheckpointPackage,
    ) -> Result<String, MigrateError> {
        let transport = self.transport_for(&config.target_host);
        let remote_package = self.remote_package_path(&config.container_id);
        let restore_dir = self.remote_restore_dir(&config.container_id);

        // The sidecar checksum must hold on the target before any restore.
        let output = transport.shell(&format!("sha256sum {}", remote_package))?;
        if !output.success() {
            return Err(IntegrityError::RemoteVerifyFailed {
                detail: output.detail(),
            }
            .into());
        }
        let remote_checksum = output
            .stdout
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        if remote_checksum != package.checksum {
            return Err(IntegrityError::ChecksumMismatch {
                expected: package.checksum.clone(),
                actual: remote_checksum,
            }
            .into());
        }

        let unpack = format!(
            "mkdir -p {dir} && tar -xzf {package} -C {dir}",
            dir = restore_dir,
            package = remote_package,
        );
        let output = transport.shell_slow(&unpack)?;
        if !output.success() {
            return Err(TransferError::RemoteExecFailed {
                target: config.target_host.to_string(),
                detail: output.detail(),
            }
            .into());
        }

        let restore_cmd = match &config.target_host {
            TargetHost::Device { .. } => format!(
                "cd /data/local/tmp && LD_LIBRARY_PATH={lib} {binary} restore -D {dir} -v4 --shell-job --ext-unix-sk --file-locks",
                lib = DEVICE_LIBRARY_PATH,
                binary = DEVICE_CHECKPOINT_BINARY,
                dir = restore_dir,
            ),
            TargetHost::Remote { .. } => format!(
                "criu restore -D {dir} -v4 --shell-job --ext-unix-sk --file-locks",
                dir = restore_dir,
            ),
        };

        tracing::info!(
            container_id = %config.container_id,
            target = %config.target_host,
            restore_dir = %restore_dir,
            "Restoring container on target"
        );

        let output = transport.shell_slow(&restore_cmd)?;
        if !output.success() {
            return Err(TransferError::RemoteExecFailed {
                target: config.target_host.to_string(),
                detail: output.detail(),
            }
            .into());
        }

        Ok(restore_dir)
    }

    /// Query the target for a running container via the transport.
    fn confirm_running_on_target(&self, config: &MigrationConfig) -> Result<(), String> {
        let transport = self.transport_for(&config.target_host);
        let query = format!("docker ps -q --filter name={}", config.container_id);

        match transport.shell(&query) {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                tracing::info!(container_id = %config.container_id, "Container confirmed running on target");
                Ok(())
            }
            Ok(_) => {
                Err("Container not confirmed running on target (inconclusive check)".to_string())
            }
            Err(e) => Err(format!("Target validation query failed: {}", e)),
        }
    }

    fn fail(&self, mut result: MigrationResult, message: String) -> MigrationResult {
        tracing::error!(container_id = %result.container_id, error = %message, "Migration failed");
        result.error_message = Some(message);
        let _ = result.transition_to(MigrationStatus::Failed);
        self.registry.update(&result);
        result
    }

    /// Mark the attempt failed, then try to restore the retained source
    /// checkpoint when rollback is requested. Best-effort.
    fn fail_with_rollback(
        &self,
        config: &MigrationConfig,
        result: MigrationResult,
        message: String,
    ) -> MigrationResult {
        let mut result = self.fail(result, message);

        if !config.rollback_on_failure {
            return result;
        }

        match result.source_checkpoint_path.clone() {
            None => {
                result
                    .warnings
                    .push("no checkpoint available, cannot rollback".to_string());
            }
            Some(path) => {
                tracing::info!(
                    container_id = %config.container_id,
                    checkpoint = %path.display(),
                    "Attempting rollback from source checkpoint"
                );
                let restore = self
                    .engine
                    .restore_checkpoint(&path, Some(&config.container_id));
                if restore.success {
                    let _ = result.transition_to(MigrationStatus::RolledBack);
                    result
                        .warnings
                        .push("migration rolled back from source checkpoint".to_string());
                } else {
                    result.warnings.push(format!(
                        "rollback also failed: {}",
                        restore
                            .error_message
                            .unwrap_or_else(|| "unknown error".to_string())
                    ));
                }
            }
        }

        self.registry.update(&result);
        result
    }

    fn cancelled(&self, config: &MigrationConfig, result: &mut MigrationResult) -> bool {
        if !self.registry.cancel_requested(&config.container_id) {
            return false;
        }

        tracing::info!(container_id = %config.container_id, "Migration cancelled between stages");
        result.error_message = Some("Migration cancelled by user".to_string());
        let _ = result.transition_to(MigrationStatus::Cancelled);
        self.registry.update(result);
        true
    }
}
