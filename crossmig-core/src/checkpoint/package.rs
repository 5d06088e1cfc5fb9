// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Checkpoint packaging.
//!
//! Converts a raw checkpoint directory into one compressed, checksummed
//! archive with sidecar metadata, and back. The sidecar checksum must match
//! the archive before anything is restored from it; a package without a
//! sidecar is unverifiable and passes.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::engine::CheckpointMetadata;
use crate::error::{IntegrityError, MigrateError, NotFoundError};

const PACKAGE_SUFFIX: &str = ".tar.gz";
const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Sidecar metadata stored alongside a package archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSidecar {
    pub container_id: String,
    pub checkpoint_time: String,
    pub checksum: String,
    pub size_bytes: u64,
    pub architecture: String,
    pub kernel_version: String,
    pub runtime_version: String,
    /// ISO-8601 with offset.
    pub package_time: String,
}

/// A packaged checkpoint ready for transfer.
#[derive(Debug, Clone)]
pub struct CheckpointPackage {
    pub package_path: PathBuf,
    pub container_id: String,
    pub checkpoint_time: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub metadata: CheckpointMetadata,
}

/// Inspection view of a package on disk.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub package_path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub sidecar: Option<PackageSidecar>,
}

/// Packages checkpoint directories into portable archives.
pub struct CheckpointPackager {
    work_dir: PathBuf,
}

impl CheckpointPackager {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Archive a checkpoint directory into one `.tar.gz` plus sidecar.
    pub fn package_checkpoint(
        &self,
        checkpoint_dir: &Path,
        output_path: Option<PathBuf>,
    ) -> Result<CheckpointPackage, MigrateError> {
        if !checkpoint_dir.is_dir() {
            return Err(NotFoundError::Checkpoint {
                path: checkpoint_dir.to_path_buf(),
            }
            .into());
        }

        let metadata_path = checkpoint_dir.join("metadata.json");
        if !metadata_path.exists() {
            return Err(NotFoundError::Checkpoint {
                path: metadata_path,
            }
            .into());
        }

        let metadata = read_checkpoint_metadata(&metadata_path)?;
        let container_id = if metadata.container_id.is_empty() {
            "unknown".to_string()
        } else {
            metadata.container_id.clone()
        };

        let output_path = output_path.unwrap_or_else(|| {
            self.work_dir
                .join(format!("{}_checkpoint{}", container_id, PACKAGE_SUFFIX))
        });

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MigrateError::Io {
                context: "creating package output directory",
                source: e,
            })?;
        }

        tracing::info!(
            checkpoint = %checkpoint_dir.display(),
            package = %output_path.display(),
            "Packaging checkpoint"
        );

        let file = std::fs::File::create(&output_path).map_err(|e| MigrateError::Io {
            context: "creating package archive",
            source: e,
        })?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all("", checkpoint_dir)
            .map_err(|e| MigrateError::Io {
                context: "archiving checkpoint directory",
                source: e,
            })?;
        let encoder = builder.into_inner().map_err(|e| MigrateError::Io {
            context: "finishing package archive",
            source: e,
        })?;
        encoder.finish().map_err(|e| MigrateError::Io {
            context: "finishing package compression",
            source: e,
        })?;

        let checksum = file_sha256(&output_path)?;
        let size_bytes = output_path
            .metadata()
            .map_err(|e| MigrateError::Io {
                context: "reading package size",
                source: e,
            })?
            .len();

        let sidecar = PackageSidecar {
            container_id: container_id.clone(),
            checkpoint_time: metadata.checkpoint_time.clone(),
            checksum: checksum.clone(),
            size_bytes,
            architecture: metadata.architecture.clone(),
            kernel_version: metadata.kernel_version.clone(),
            runtime_version: metadata.runtime_version.clone(),
            package_time: chrono::Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
        };
        write_sidecar(&sidecar_path(&output_path), &sidecar)?;

        tracing::info!(
            package = %output_path.display(),
            size_bytes = size_bytes,
            "Checkpoint packaged"
        );

        Ok(CheckpointPackage {
            package_path: output_path,
            container_id,
            checkpoint_time: metadata.checkpoint_time.clone(),
            size_bytes,
            checksum,
            metadata,
        })
    }

    /// Extract a package into `output_dir` or a fresh directory under the
    /// work dir. Integrity is verified before anything is extracted.
    pub fn unpack_checkpoint(
        &self,
        package_path: &Path,
        output_dir: Option<PathBuf>,
    ) -> Result<PathBuf, MigrateError> {
        if !package_path.is_file() {
            return Err(NotFoundError::Package {
                path: package_path.to_path_buf(),
            }
            .into());
        }

        if !self.verify_package_integrity(package_path)? {
            let sidecar = read_sidecar(&sidecar_path(package_path))?;
            return Err(IntegrityError::ChecksumMismatch {
                expected: sidecar.checksum,
                actual: file_sha256(package_path)?,
            }
            .into());
        }

        let output_dir = match output_dir {
            Some(dir) => dir,
            None => {
                let stem = read_sidecar(&sidecar_path(package_path))
                    .map(|s| s.container_id)
                    .unwrap_or_else(|_| "unknown".to_string());
                self.work_dir.join(format!("{}_restored", stem))
            }
        };

        // Start from a clean directory so stale image files never mix in.
        if output_dir.exists() {
            std::fs::remove_dir_all(&output_dir).map_err(|e| MigrateError::Io {
                context: "removing stale unpack directory",
                source: e,
            })?;
        }
        std::fs::create_dir_all(&output_dir).map_err(|e| MigrateError::Io {
            context: "creating unpack directory",
            source: e,
        })?;

        tracing::info!(
            package = %package_path.display(),
            output = %output_dir.display(),
            "Unpacking checkpoint"
        );

        let file = std::fs::File::open(package_path).map_err(|e| MigrateError::Io {
            context: "opening package archive",
            source: e,
        })?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive.unpack(&output_dir).map_err(|e| MigrateError::Io {
            context: "extracting package archive",
            source: e,
        })?;

        Ok(output_dir)
    }

    /// Recompute the archive checksum and compare against the sidecar.
    ///
    /// A package without a sidecar is unverifiable and passes; a mismatch
    /// against an existing sidecar fails.
    pub fn verify_package_integrity(&self, package_path: &Path) -> Result<bool, MigrateError> {
        if !package_path.is_file() {
            return Err(NotFoundError::Package {
                path: package_path.to_path_buf(),
            }
            .into());
        }

        let sidecar_file = sidecar_path(package_path);
        if !sidecar_file.exists() {
            tracing::warn!(
                package = %package_path.display(),
                "No sidecar metadata found; skipping integrity verification"
            );
            return Ok(true);
        }

        let sidecar = read_sidecar(&sidecar_file)?;
        if sidecar.checksum.is_empty() {
            tracing::warn!(package = %package_path.display(), "No checksum in sidecar metadata");
            return Ok(true);
        }

        let actual = file_sha256(package_path)?;
        if actual != sidecar.checksum {
            tracing::error!(
                package = %package_path.display(),
                expected = %sidecar.checksum,
                actual = %actual,
                "Package checksum mismatch"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Inspect a package: size, current checksum, sidecar if present.
    pub fn get_package_info(&self, package_path: &Path) -> Result<PackageInfo, MigrateError> {
        if !package_path.is_file() {
            return Err(NotFoundError::Package {
                path: package_path.to_path_buf(),
            }
            .into());
        }

        let size_bytes = package_path
            .metadata()
            .map_err(|e| MigrateError::Io {
                context: "reading package size",
                source: e,
            })?
            .len();

        let sidecar_file = sidecar_path(package_path);
        let sidecar = if sidecar_file.exists() {
            Some(read_sidecar(&sidecar_file)?)
        } else {
            None
        };

        Ok(PackageInfo {
            package_path: package_path.to_path_buf(),
            size_bytes,
            checksum: file_sha256(package_path)?,
            sidecar,
        })
    }

    /// Enumerate packages in `directory` (the work dir when None).
    pub fn list_packages(&self, directory: Option<&Path>) -> Vec<PackageInfo> {
        let search_dir = directory.unwrap_or(&self.work_dir);
        let entries = match std::fs::read_dir(search_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut packages = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(PACKAGE_SUFFIX) {
                continue;
            }
            if let Ok(info) = self.get_package_info(&path) {
                packages.push(info);
            }
        }
        packages
    }

    /// Remove a package and its sidecar. Missing files are not an error.
    pub fn cleanup_package(&self, package_path: &Path) -> Result<(), MigrateError> {
        for path in [package_path.to_path_buf(), sidecar_path(package_path)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| MigrateError::Io {
                    context: "removing package file",
                    source: e,
                })?;
                tracing::info!(path = %path.display(), "Removed package file");
            }
        }
        Ok(())
    }

    /// Working directory packages are created under.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

/// Path of the sidecar metadata file for a package archive.
pub fn sidecar_path(package_path: &Path) -> PathBuf {
    let mut name = package_path.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// SHA-256 of a file's contents, hex-encoded.
pub fn file_sha256(path: &Path) -> Result<String, MigrateError> {
    let mut file = std::fs::File::open(path).map_err(|e| MigrateError::Io {
        context: "opening file for checksum",
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|e| MigrateError::Io {
            context: "reading file for checksum",
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn read_checkpoint_metadata(path: &Path) -> Result<CheckpointMetadata, MigrateError> {
    let content = std::fs::read_to_string(path).map_err(|e| MigrateError::Io {
        context: "reading checkpoint metadata",
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| MigrateError::Metadata {
        context: "parsing checkpoint metadata",
        message: e.to_string(),
    })
}

fn read_sidecar(path: &Path) -> Result<PackageSidecar, MigrateError> {
    let content = std::fs::read_to_string(path).map_err(|e| MigrateError::Io {
        context: "reading package sidecar",
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| MigrateError::Metadata {
        context: "parsing package sidecar",
        message: e.to_string(),
    })
}

fn write_sidecar(path: &Path, sidecar: &PackageSidecar) -> Result<(), MigrateError> {
    let json = serde_json::to_string_pretty(sidecar).map_err(|e| MigrateError::Metadata {
        context: "serializing package sidecar",
        message: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| MigrateError::Io {
        context: "writing package sidecar",
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_checkpoint_dir(dir: &Path) {
        std::fs::create_dir_all(dir.join("images")).unwrap();
        std::fs::write(
            dir.join("metadata.json"),
            r#"{
                "container_id": "web1",
                "checkpoint_time": "2025-11-02T10:00:00+00:00",
                "architecture": "x86_64",
                "kernel_version": "6.6.0",
                "runtime_version": "Docker version 27.0"
            }"#,
        )
        .unwrap();
        std::fs::write(dir.join("dump.log"), "dump completed ok\n").unwrap();
        std::fs::write(dir.join("images").join("pages-1.img"), [0u8, 1, 2, 3, 7]).unwrap();
    }

    #[test]
    fn test_package_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let packager = CheckpointPackager::new(tmp.path());
        let err = packager
            .package_checkpoint(&tmp.path().join("absent"), None)
            .unwrap_err();
        assert!(matches!(err, MigrateError::NotFound(_)));
    }

    #[test]
    fn test_package_missing_metadata() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        std::fs::create_dir_all(&dir).unwrap();

        let packager = CheckpointPackager::new(tmp.path());
        assert!(packager.package_checkpoint(&dir, None).is_err());
    }

    #[test]
    fn test_package_unpack_round_trip() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir);

        let packager = CheckpointPackager::new(tmp.path().join("work"));
        let package = packager.package_checkpoint(&dir, None).unwrap();
        assert_eq!(package.container_id, "web1");
        assert!(package.package_path.exists());
        assert!(sidecar_path(&package.package_path).exists());

        let restored = packager
            .unpack_checkpoint(&package.package_path, None)
            .unwrap();

        for file in ["metadata.json", "dump.log", "images/pages-1.img"] {
            let original = std::fs::read(dir.join(file)).unwrap();
            let unpacked = std::fs::read(restored.join(file)).unwrap();
            assert_eq!(original, unpacked, "{} changed in round trip", file);
        }
    }

    #[test]
    fn test_verify_integrity_after_packaging() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir);

        let packager = CheckpointPackager::new(tmp.path().join("work"));
        let package = packager.package_checkpoint(&dir, None).unwrap();

        assert!(packager
            .verify_package_integrity(&package.package_path)
            .unwrap());
    }

    #[test]
    fn test_verify_integrity_detects_mutation() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir);

        let packager = CheckpointPackager::new(tmp.path().join("work"));
        let package = packager.package_checkpoint(&dir, None).unwrap();

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&package.package_path)
            .unwrap();
        file.write_all(b"tamper").unwrap();
        drop(file);

        assert!(!packager
            .verify_package_integrity(&package.package_path)
            .unwrap());
        assert!(packager
            .unpack_checkpoint(&package.package_path, None)
            .is_err());
    }

    #[test]
    fn test_verify_integrity_passes_without_sidecar() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir);

        let packager = CheckpointPackager::new(tmp.path().join("work"));
        let package = packager.package_checkpoint(&dir, None).unwrap();
        std::fs::remove_file(sidecar_path(&package.package_path)).unwrap();

        assert!(packager
            .verify_package_integrity(&package.package_path)
            .unwrap());
    }

    #[test]
    fn test_verify_integrity_missing_package() {
        let tmp = TempDir::new().unwrap();
        let packager = CheckpointPackager::new(tmp.path());
        assert!(packager
            .verify_package_integrity(&tmp.path().join("absent.tar.gz"))
            .is_err());
    }

    #[test]
    fn test_get_package_info_and_list() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir);

        let work = tmp.path().join("work");
        let packager = CheckpointPackager::new(&work);
        let package = packager.package_checkpoint(&dir, None).unwrap();

        let info = packager.get_package_info(&package.package_path).unwrap();
        assert_eq!(info.checksum, package.checksum);
        assert_eq!(info.size_bytes, package.size_bytes);
        let sidecar = info.sidecar.unwrap();
        assert_eq!(sidecar.container_id, "web1");
        assert_eq!(sidecar.architecture, "x86_64");

        let listed = packager.list_packages(None);
        assert_eq!(listed.len(), 1);

        assert!(packager.list_packages(Some(&tmp.path().join("empty"))).is_empty());
    }

    #[test]
    fn test_cleanup_package_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir);

        let packager = CheckpointPackager::new(tmp.path().join("work"));
        let package = packager.package_checkpoint(&dir, None).unwrap();

        assert!(packager.cleanup_package(&package.package_path).is_ok());
        assert!(!package.package_path.exists());
        assert!(!sidecar_path(&package.package_path).exists());

        // Already gone, still success.
        assert!(packager.cleanup_package(&package.package_path).is_ok());
    }
}
