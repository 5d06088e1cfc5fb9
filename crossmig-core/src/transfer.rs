//! Transfer layer: moves a checkpoint package to a target host.
//!
//! The mechanism is selected by the target addressing scheme (device bridge
//! vs remote copy). No retries happen here; a failed transfer is reported to
//! the orchestrator, which owns rollback.

use std::path::PathBuf;
use std::sync::Arc;

use crate::checkpoint::CheckpointPackager;
use crate::config::Timeouts;
use crate::error::{MigrateError, NotFoundError};
use crate::runner::CommandRunner;
use crate::transport::Transport;
use crate::types::TargetHost;

/// Configuration for one package transfer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub source_path: PathBuf,
    pub target_host: TargetHost,
    pub target_path: String,
    pub cleanup_source: bool,
}

/// Moves packages over the dual transport.
pub struct PackageTransfer {
    runner: Arc<dyn CommandRunner>,
    timeouts: Timeouts,
}

impl PackageTransfer {
    pub fn new(runner: Arc<dyn CommandRunner>, timeouts: Timeouts) -> Self {
        Self { runner, timeouts }
    }

    /// Transfer a package (and its sidecar) to the target host.
    pub fn transfer(&self, config: &TransferConfig) -> Result<(), MigrateError> {
        if !config.source_path.is_file() {
            return Err(NotFoundError::Package {
                path: config.source_path.clone(),
            }
            .into());
        }

        let transport = Transport::new(
            self.runner.clone(),
            config.target_host.clone(),
            self.timeouts,
        );

        tracing::info!(
            source = %config.source_path.display(),
            target = %config.target_host,
            target_path = %config.target_path,
            "Transferring checkpoint package"
        );

        transport.push(&config.source_path, &config.target_path)?;

        // The sidecar travels too; losing it only makes the package
        // unverifiable on the target, so a failed push is a warning.
        let sidecar = crate::checkpoint::sidecar_path(&config.source_path);
        if sidecar.exists() {
            let sidecar_target = format!("{}.metadata.json", config.target_path);
            if let Err(e) = transport.push(&sidecar, &sidecar_target) {
                tracing::warn!(
                    sidecar = %sidecar.display(),
                    error = %e,
                    "Failed to transfer sidecar metadata"
                );
            }
        }

        if config.cleanup_source {
            let packager = CheckpointPackager::new(
                config
                    .source_path
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from(".")),
            );
            if let Err(e) = packager.cleanup_package(&config.source_path) {
                tracing::warn!(
                    source = %config.source_path.display(),
                    error = %e,
                    "Failed to clean up source package"
                );
            } else {
                tracing::info!(source = %config.source_path.display(), "Source package cleaned up");
            }
        }

        tracing::info!(target = %config.target_host, "Checkpoint transfer completed");
        Ok(())
    }
}
