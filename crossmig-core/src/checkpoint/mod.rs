//! Checkpoint lifecycle management module.
//!
//! Provides validated checkpoint creation/restoration over the external
//! checkpoint/restore binary, and packaging of raw checkpoint directories
//! into portable, checksummed archives.

mod engine;
mod package;

pub use engine::{
    CheckpointConfig, CheckpointEngine, CheckpointInfo, CheckpointMetadata, CheckpointOptions,
    CheckpointResult,
};
pub use package::{
    file_sha256, sidecar_path, CheckpointPackage, CheckpointPackager, PackageInfo, PackageSidecar,
};
