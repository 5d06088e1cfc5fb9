//! Custom error types for crossmig.
//!
//! This module defines explicit enum error types as per coding guidelines.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ContainerId;

/// Top-level error type for the migration core.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {context} - {message}")]
    Metadata {
        context: &'static str,
        message: String,
    },
}

/// The external checkpoint/restore capability is missing or broken.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("checkpoint binary not found at any expected path")]
    BinaryNotFound,

    #[error("checkpoint binary is not executable: {path}")]
    BinaryNotExecutable { path: PathBuf },

    #[error("checkpoint binary self-check failed: {detail}")]
    SelfCheckFailed { detail: String },
}

/// A container, checkpoint, or package the caller named does not exist.
#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("container {0} not found")]
    Container(ContainerId),

    #[error("checkpoint directory not found: {path}")]
    Checkpoint { path: PathBuf },

    #[error("checkpoint package not found: {path}")]
    Package { path: PathBuf },
}

/// Input or on-disk state that fails validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("container {0} is not running")]
    NotRunning(ContainerId),

    #[error("could not resolve process id for container {0}")]
    PidUnresolved(ContainerId),

    #[error("invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("checkpoint at {path} is missing required files: {files:?}")]
    MissingCheckpointFiles { path: PathBuf, files: Vec<String> },

    #[error("checkpoint metadata is missing required fields: {fields:?}")]
    MissingMetadataFields { fields: Vec<String> },

    #[error("a migration for container {0} is already in progress")]
    MigrationInProgress(ContainerId),
}

/// Moving a package to the target host failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("cannot reach target host {host}")]
    Unreachable { host: String },

    #[error("transfer to {target} failed: {detail}")]
    CommandFailed { target: String, detail: String },

    #[error("remote command on {target} failed: {detail}")]
    RemoteExecFailed { target: String, detail: String },
}

/// Package content does not match its recorded checksum.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("could not verify package on target: {detail}")]
    RemoteVerifyFailed { detail: String },
}

/// An external operation exceeded its allotted time. Never retried.
#[derive(Debug, Error)]
pub enum TimeoutError {
    #[error("operation '{operation}' timed out after {timeout_secs}s")]
    Expired {
        operation: String,
        timeout_secs: u64,
    },
}

/// State transition errors for the migration state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to} for container {container_id}")]
    InvalidTransition {
        container_id: ContainerId,
        from: &'static str,
        to: &'static str,
    },
}

/// Result type alias using MigrateError.
pub type MigrateResult<T> = Result<T, MigrateError>;
