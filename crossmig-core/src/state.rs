// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Migration state machine with typed state transitions.
//!
//! Implements the migration lifecycle: Pending → InProgress → Checkpointing →
//! Transferring → Restoring → Validating → Completed, with Failed, RolledBack
//! and Cancelled exits. Transitions are forward-only except Failed →
//! RolledBack. Invalid transitions result in StateTransitionError.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;
use crate::types::ContainerId;

/// Migration lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Attempt registered but not yet started.
    Pending,

    /// Prerequisites and compatibility are being assessed.
    InProgress,

    /// A checkpoint of the source container is being taken.
    Checkpointing,

    /// The packaged checkpoint is moving to the target host.
    Transferring,

    /// The checkpoint is being restored on the target.
    Restoring,

    /// The restored container is being confirmed on the target.
    Validating,

    /// Migration confirmed on the target.
    Completed,

    /// Migration failed; the source may still be rolled back.
    Failed,

    /// The source container was restored from the retained checkpoint.
    RolledBack,

    /// The attempt was cancelled cooperatively between stages.
    Cancelled,
}

impl MigrationStatus {
    /// Get the state name for reports and error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Checkpointing => "checkpointing",
            Self::Transferring => "transferring",
            Self::Restoring => "restoring",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: MigrationStatus) -> bool {
        matches!(
            (self, target),
            // Pipeline order, forward only
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Checkpointing)
                | (Self::Checkpointing, Self::Transferring)
                | (Self::Transferring, Self::Restoring)
                | (Self::Restoring, Self::Validating)
                | (Self::Validating, Self::Completed)
                // Failure and cancellation exits from any non-terminal state
                | (Self::Pending, Self::Failed)
                | (Self::InProgress, Self::Failed)
                | (Self::Checkpointing, Self::Failed)
                | (Self::Transferring, Self::Failed)
                | (Self::Restoring, Self::Failed)
                | (Self::Validating, Self::Failed)
                | (Self::Pending, Self::Cancelled)
                | (Self::InProgress, Self::Cancelled)
                | (Self::Checkpointing, Self::Cancelled)
                | (Self::Transferring, Self::Cancelled)
                | (Self::Restoring, Self::Cancelled)
                | (Self::Validating, Self::Cancelled)
                // The one backward-looking exception
                | (Self::Failed, Self::RolledBack)
        )
    }

    /// True when the migration has reached an end state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RolledBack | Self::Cancelled
        )
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of one migration attempt, mutated through the state machine until
/// a terminal state, then retained for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub success: bool,
    pub status: MigrationStatus,
    pub container_id: ContainerId,
    pub source_checkpoint_path: Option<std::path::PathBuf>,
    pub target_checkpoint_path: Option<String>,
    pub migration_time: Option<Duration>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
}

impl MigrationResult {
    /// Create a fresh Pending result for a container.
    pub fn new(container_id: ContainerId) -> Self {
        Self {
            success: false,
            status: MigrationStatus::Pending,
            container_id,
            source_checkpoint_path: None,
            target_checkpoint_path: None,
            migration_time: None,
            error_message: None,
            warnings: Vec::new(),
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: MigrationStatus) -> Result<(), StateTransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                container_id: self.container_id.clone(),
                from: self.status.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            container_id = %self.container_id,
            from = self.status.name(),
            to = target.name(),
            "Migration state transition"
        );

        self.status = target;
        Ok(())
    }
}
