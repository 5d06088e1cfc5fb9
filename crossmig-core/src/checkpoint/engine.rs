//! Checkpoint engine over the external checkpoint/restore binary.
//!
//! Wraps dump/restore/check invocations with environment configuration,
//! container readiness validation, and checkpoint bookkeeping. Failures from
//! the underlying binary are recovered into failed [`CheckpointResult`]s at
//! this boundary so callers always get a reportable outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::config::Timeouts;
use crate::error::{EnvironmentError, MigrateError, NotFoundError, ValidationError};
use crate::runner::CommandRunner;
use crate::runtime::ContainerRuntime;
use crate::types::ContainerId;

/// Well-known locations for the checkpoint binary.
const BINARY_CANDIDATES: [&str; 6] = [
    "/usr/sbin/criu",
    "/usr/bin/criu",
    "/sbin/criu",
    "/bin/criu",
    "/usr/local/sbin/criu",
    "/usr/local/bin/criu",
];

/// Files every valid checkpoint directory must carry.
const REQUIRED_FILES: [&str; 2] = ["metadata.json", "dump.log"];

/// Dump/restore option flags.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointOptions {
    pub leave_running: bool,
    pub tcp_established: bool,
    pub shell_job: bool,
    pub ext_unix_sk: bool,
    pub file_locks: bool,
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self {
            leave_running: false,
            tcp_established: true,
            shell_job: true,
            ext_unix_sk: true,
            file_locks: true,
        }
    }
}

/// Configuration for one checkpoint operation.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub container_id: ContainerId,
    /// Base directory the checkpoint image directory is created under.
    pub checkpoint_dir: PathBuf,
    /// Scratch directory handed to the dump for logs and stats.
    pub work_dir: PathBuf,
    pub options: CheckpointOptions,
}

/// Outcome of a checkpoint engine operation.
#[derive(Debug, Clone)]
pub struct CheckpointResult {
    pub success: bool,
    pub checkpoint_path: Option<PathBuf>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
    pub duration: Option<Duration>,
}

impl CheckpointResult {
    fn ok(path: PathBuf, warnings: Vec<String>, duration: Option<Duration>) -> Self {
        Self {
            success: true,
            checkpoint_path: Some(path),
            error_message: None,
            warnings,
            duration,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            checkpoint_path: None,
            error_message: Some(message.into()),
            warnings: Vec::new(),
            duration: None,
        }
    }
}

/// Checkpoint directory metadata, written next to the dump artifacts.
///
/// Fields default to empty on read so a sparse file surfaces as a
/// missing-fields validation error instead of a parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(default)]
    pub container_id: String,
    /// ISO-8601 with offset.
    #[serde(default)]
    pub checkpoint_time: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub runtime_version: String,
}

/// One known checkpoint on disk.
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub metadata: CheckpointMetadata,
}

/// Validated wrapper over the external checkpoint/restore capability.
pub struct CheckpointEngine {
    runner: Arc<dyn CommandRunner>,
    runtime: ContainerRuntime,
    checkpoint_base_dir: PathBuf,
    /// Explicit binary path; discovered over well-known locations when None.
    binary_override: Option<PathBuf>,
    timeouts: Timeouts,
}

impl CheckpointEngine {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        runtime: ContainerRuntime,
        checkpoint_base_dir: impl Into<PathBuf>,
        binary_override: Option<PathBuf>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            runner,
            runtime,
            checkpoint_base_dir: checkpoint_base_dir.into(),
            binary_override,
            timeouts,
        }
    }

    /// Verify the checkpoint binary is present, executable, and passes its
    /// own self-check.
    pub fn configure_environment(&self) -> Result<(), MigrateError> {
        let binary = self.resolve_binary()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = binary.metadata().map_err(|e| MigrateError::Io {
                context: "reading checkpoint binary metadata",
                source: e,
            })?;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(EnvironmentError::BinaryNotExecutable { path: binary }.into());
            }
        }

        let binary_str = binary.to_string_lossy().to_string();
        let output =
            self.runner
                .run_with_timeout(&binary_str, &["check"], self.timeouts.probe())?;

        if !output.success() {
            return Err(EnvironmentError::SelfCheckFailed {
                detail: output.detail(),
            }
            .into());
        }

        tracing::info!(binary = %binary.display(), "Checkpoint environment configured");
        Ok(())
    }

    /// Check that a container can be checkpointed.
    ///
    /// A missing or stopped container fails; risky-but-checkpointable
    /// configuration is reported as warnings.
    pub fn validate_container(&self, id: &ContainerId) -> Result<Vec<String>, MigrateError> {
        let info = self.runtime.inspect(id)?;

        if !info.running {
            return Err(ValidationError::NotRunning(id.clone()).into());
        }

        let mut warnings = Vec::new();
        if info.privileged {
            warnings.push("Container is running in privileged mode".to_string());
        }
        if info.host_networking {
            warnings.push("Container uses host networking".to_string());
        }
        if !info.binds.is_empty() {
            warnings.push("Container has bind mounts".to_string());
        }
        if !info.exposed_ports.is_empty() {
            warnings.push("Container has exposed ports".to_string());
        }

        Ok(warnings)
    }

    /// Dump a running container into a checkpoint directory.
    pub fn create_checkpoint(&self, config: &CheckpointConfig) -> CheckpointResult {
        match self.try_create(config) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(container_id = %config.container_id, error = %e, "Checkpoint creation failed");
                CheckpointResult::failed(e.to_string())
            }
        }
    }

    fn try_create(&self, config: &CheckpointConfig) -> Result<CheckpointResult, MigrateError> {
        let warnings = self.validate_container(&config.container_id)?;

        let info = self.runtime.inspect(&config.container_id)?;
        let pid = info
            .pid
            .ok_or_else(|| ValidationError::PidUnresolved(config.container_id.clone()))?;

        let checkpoint_path = config.checkpoint_dir.join(config.container_id.as_str());
        // A stale image directory would mix dumps; start clean.
        if checkpoint_path.exists() {
            std::fs::remove_dir_all(&checkpoint_path).map_err(|e| MigrateError::Io {
                context: "removing stale checkpoint directory",
                source: e,
            })?;
        }
        std::fs::create_dir_all(&checkpoint_path).map_err(|e| MigrateError::Io {
            context: "creating checkpoint directory",
            source: e,
        })?;
        std::fs::create_dir_all(&config.work_dir).map_err(|e| MigrateError::Io {
            context: "creating checkpoint work directory",
            source: e,
        })?;

        let binary = self.resolve_binary()?;
        let binary_str = binary.to_string_lossy().to_string();
        let log_file = checkpoint_path.join("dump.log");

        let pid_str = pid.to_string();
        let checkpoint_str = checkpoint_path.to_string_lossy().to_string();
        let work_str = config.work_dir.to_string_lossy().to_string();
        let log_str = log_file.to_string_lossy().to_string();

        let mut args = vec![
            "dump",
            "-t",
            pid_str.as_str(),
            "-D",
            checkpoint_str.as_str(),
            "--work-dir",
            work_str.as_str(),
            "-v4",
            "--log-file",
            log_str.as_str(),
        ];
        if config.options.leave_running {
            args.push("--leave-running");
        }
        if config.options.tcp_established {
            args.push("--tcp-established");
        }
        if config.options.shell_job {
            args.push("--shell-job");
        }
        if config.options.ext_unix_sk {
            args.push("--ext-unix-sk");
        }
        if config.options.file_locks {
            args.push("--file-locks");
        }

        tracing::info!(
            container_id = %config.container_id,
            pid = pid,
            path = %checkpoint_path.display(),
            "Creating checkpoint"
        );

        let start = Instant::now();
        let output = self
            .runner
            .run_with_timeout(&binary_str, &args, self.timeouts.checkpoint())?;
        let elapsed = start.elapsed();

        if !output.success() {
            let log_tail = read_log_tail(&log_file);
            let mut message = format!("checkpoint dump failed: {}", output.detail());
            if !log_tail.is_empty() {
                message.push_str("\ndump log: ");
                message.push_str(&log_tail);
            }
            return Ok(CheckpointResult::failed(message));
        }

        self.write_metadata(&checkpoint_path, &config.container_id)?;

        tracing::info!(
            container_id = %config.container_id,
            elapsed_ms = elapsed.as_millis(),
            "Checkpoint created"
        );

        Ok(CheckpointResult::ok(
            checkpoint_path,
            warnings,
            Some(elapsed),
        ))
    }

    /// Validate checkpoint directory contents.
    pub fn validate_checkpoint(&self, path: &Path) -> CheckpointResult {
        match self.try_validate(path) {
            Ok(result) => result,
            Err(e) => CheckpointResult::failed(format!("Checkpoint validation failed: {}", e)),
        }
    }

    fn try_validate(&self, path: &Path) -> Result<CheckpointResult, MigrateError> {
        if !path.is_dir() {
            return Err(NotFoundError::Checkpoint {
                path: path.to_path_buf(),
            }
            .into());
        }

        let missing: Vec<String> = REQUIRED_FILES
            .iter()
            .filter(|name| !path.join(name).exists())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingCheckpointFiles {
                path: path.to_path_buf(),
                files: missing,
            }
            .into());
        }

        let metadata = read_metadata(path)?;
        let mut missing_fields = Vec::new();
        for (field, value) in [
            ("container_id", &metadata.container_id),
            ("checkpoint_time", &metadata.checkpoint_time),
            ("architecture", &metadata.architecture),
        ] {
            if value.is_empty() {
                missing_fields.push(field.to_string());
            }
        }
        if !missing_fields.is_empty() {
            return Err(ValidationError::MissingMetadataFields {
                fields: missing_fields,
            }
            .into());
        }

        let log_content =
            std::fs::read_to_string(path.join("dump.log")).map_err(|e| MigrateError::Io {
                context: "reading dump log",
                source: e,
            })?;

        let mut warnings = Vec::new();
        if log_content.contains("Error") {
            warnings.push("Errors found in dump log".to_string());
        }
        if log_content.contains("Warning") {
            warnings.push("Warnings found in dump log".to_string());
        }

        Ok(CheckpointResult::ok(path.to_path_buf(), warnings, None))
    }

    /// Restore a process tree from a checkpoint directory on this host.
    pub fn restore_checkpoint(
        &self,
        path: &Path,
        target_container_id: Option<&ContainerId>,
    ) -> CheckpointResult {
        let validation = self.validate_checkpoint(path);
        if !validation.success {
            return validation;
        }

        match self.try_restore(path, target_container_id) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Checkpoint restore failed");
                CheckpointResult::failed(format!("Checkpoint restore failed: {}", e))
            }
        }
    }

    fn try_restore(
        &self,
        path: &Path,
        target_container_id: Option<&ContainerId>,
    ) -> Result<CheckpointResult, MigrateError> {
        let binary = self.resolve_binary()?;
        let binary_str = binary.to_string_lossy().to_string();

        let checkpoint_str = path.to_string_lossy().to_string();
        let log_str = path.join("restore.log").to_string_lossy().to_string();

        tracing::info!(
            path = %path.display(),
            target = target_container_id.map(|id| id.as_str()).unwrap_or("original"),
            "Restoring checkpoint"
        );

        let start = Instant::now();
        let output = self.runner.run_with_timeout(
            &binary_str,
            &[
                "restore",
                "-D",
                checkpoint_str.as_str(),
                "-v4",
                "--log-file",
                log_str.as_str(),
                "--shell-job",
                "--ext-unix-sk",
                "--file-locks",
            ],
            self.timeouts.restore(),
        )?;
        let elapsed = start.elapsed();

        if !output.success() {
            return Ok(CheckpointResult::failed(format!(
                "checkpoint restore failed: {}",
                output.detail()
            )));
        }

        tracing::info!(
            path = %path.display(),
            elapsed_ms = elapsed.as_millis(),
            "Checkpoint restored"
        );

        Ok(CheckpointResult::ok(
            path.to_path_buf(),
            Vec::new(),
            Some(elapsed),
        ))
    }

    /// Enumerate checkpoints under the base directory.
    pub fn list_checkpoints(&self) -> Vec<CheckpointInfo> {
        let entries = match std::fs::read_dir(&self.checkpoint_base_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut checkpoints = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Ok(metadata) = read_metadata(&path) {
                checkpoints.push(CheckpointInfo { path, metadata });
            }
        }
        checkpoints
    }

    /// Remove a checkpoint directory. A missing path is not an error.
    pub fn cleanup_checkpoint(&self, path: &Path) -> Result<(), MigrateError> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path).map_err(|e| MigrateError::Io {
            context: "removing checkpoint directory",
            source: e,
        })?;
        tracing::info!(path = %path.display(), "Checkpoint cleaned up");
        Ok(())
    }

    /// Base directory checkpoints are created under.
    pub fn checkpoint_base_dir(&self) -> &Path {
        &self.checkpoint_base_dir
    }

    fn resolve_binary(&self) -> Result<PathBuf, MigrateError> {
        if let Some(ref binary) = self.binary_override {
            if binary.exists() {
                return Ok(binary.clone());
            }
            return Err(EnvironmentError::BinaryNotFound.into());
        }

        for candidate in BINARY_CANDIDATES {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Ok(p);
            }
        }

        if let Ok(output) = self.runner.run("which", &["criu"]) {
            if output.success() {
                let path = output.stdout.trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }

        Err(EnvironmentError::BinaryNotFound.into())
    }

    fn write_metadata(
        &self,
        checkpoint_path: &Path,
        container_id: &ContainerId,
    ) -> Result<(), MigrateError> {
        let metadata = CheckpointMetadata {
            container_id: container_id.to_string(),
            checkpoint_time: chrono::Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            architecture: self.host_probe("uname", &["-m"]),
            kernel_version: self.host_probe("uname", &["-r"]),
            runtime_version: self.runtime.version(),
        };

        let json =
            serde_json::to_string_pretty(&metadata).map_err(|e| MigrateError::Metadata {
                context: "serializing checkpoint metadata",
                message: e.to_string(),
            })?;

        std::fs::write(checkpoint_path.join("metadata.json"), json).map_err(|e| {
            MigrateError::Io {
                context: "writing checkpoint metadata",
                source: e,
            }
        })
    }

    fn host_probe(&self, program: &str, args: &[&str]) -> String {
        match self.runner.run_with_timeout(program, args, self.timeouts.probe()) {
            Ok(output) if output.success() => output.stdout.trim().to_string(),
            _ => "unknown".to_string(),
        }
    }
}

fn read_metadata(checkpoint_path: &Path) -> Result<CheckpointMetadata, MigrateError> {
    let content = std::fs::read_to_string(checkpoint_path.join("metadata.json")).map_err(|e| {
        MigrateError::Io {
            context: "reading checkpoint metadata",
            source: e,
        }
    })?;
    serde_json::from_str(&content).map_err(|e| MigrateError::Metadata {
        context: "parsing checkpoint metadata",
        message: e.to_string(),
    })
}

fn read_log_tail(log_file: &Path) -> String {
    match std::fs::read_to_string(log_file) {
        Ok(content) => {
            let lines: Vec<&str> = content.lines().rev().take(10).collect();
            lines.into_iter().rev().collect::<Vec<_>>().join("\n")
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScriptedRunner;
    use std::time::Duration;
    use tempfile::TempDir;

    const RUNNING_INSPECT: &str = r#"[{
        "State": {"Status": "running", "Pid": 4242},
        "Config": {"ExposedPorts": {"80/tcp": {}}},
        "HostConfig": {"Privileged": true, "NetworkMode": "host", "Binds": ["/data:/data"]}
    }]"#;

    fn engine_with(runner: ScriptedRunner, base: &Path, binary: Option<PathBuf>) -> CheckpointEngine {
        let runner = Arc::new(runner);
        let runtime = ContainerRuntime::new(runner.clone(), Duration::from_secs(10));
        CheckpointEngine::new(runner, runtime, base, binary, Timeouts::default())
    }

    fn write_checkpoint_dir(dir: &Path, log: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let metadata = CheckpointMetadata {
            container_id: "web1".to_string(),
            checkpoint_time: "2025-11-02T10:00:00+00:00".to_string(),
            architecture: "x86_64".to_string(),
            kernel_version: "6.6.0".to_string(),
            runtime_version: "Docker version 27.0".to_string(),
        };
        std::fs::write(
            dir.join("metadata.json"),
            serde_json::to_string_pretty(&metadata).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.join("dump.log"), log).unwrap();
    }

    #[test]
    fn test_configure_environment_missing_binary() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_with(
            ScriptedRunner::new().fail("which criu", 1, ""),
            tmp.path(),
            Some(tmp.path().join("no-such-criu")),
        );
        let err = engine.configure_environment().unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Environment(EnvironmentError::BinaryNotFound)
        ));
    }

    #[test]
    fn test_configure_environment_self_check_failed() {
        let tmp = TempDir::new().unwrap();
        let binary = tmp.path().join("criu");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let engine = engine_with(
            ScriptedRunner::new().fail("check", 1, "kernel too old"),
            tmp.path(),
            Some(binary),
        );
        let err = engine.configure_environment().unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Environment(EnvironmentError::SelfCheckFailed { .. })
        ));
    }

    #[test]
    fn test_validate_container_warnings() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_with(
            ScriptedRunner::new().ok("docker inspect", RUNNING_INSPECT),
            tmp.path(),
            None,
        );
        let warnings = engine
            .validate_container(&ContainerId::new("web1").unwrap())
            .unwrap();

        // Privileged, host networking, bind mounts, exposed ports.
        assert_eq!(warnings.len(), 4);
    }

    #[test]
    fn test_validate_container_not_running() {
        let tmp = TempDir::new().unwrap();
        let stopped = r#"[{"State": {"Status": "exited", "Pid": 0}, "Config": {}, "HostConfig": {}}]"#;
        let engine = engine_with(
            ScriptedRunner::new().ok("docker inspect", stopped),
            tmp.path(),
            None,
        );
        let err = engine
            .validate_container(&ContainerId::new("web1").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Validation(ValidationError::NotRunning(_))
        ));
    }

    #[test]
    fn test_validate_checkpoint_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_with(ScriptedRunner::new(), tmp.path(), None);
        let result = engine.validate_checkpoint(&tmp.path().join("absent"));
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("not found"));
    }

    #[test]
    fn test_validate_checkpoint_missing_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("metadata.json"), "{}").unwrap();

        let engine = engine_with(ScriptedRunner::new(), tmp.path(), None);
        let result = engine.validate_checkpoint(&dir);
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("dump.log"));
    }

    #[test]
    fn test_validate_checkpoint_log_tokens_become_warnings() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir, "(00.1) Warning: fdinfo busy\n(00.2) Error (foo.c:1): bad fd\n");

        let engine = engine_with(ScriptedRunner::new(), tmp.path(), None);
        let result = engine.validate_checkpoint(&dir);
        assert!(result.success);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_restore_requires_valid_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let engine = engine_with(ScriptedRunner::new(), tmp.path(), None);
        let result = engine.restore_checkpoint(&tmp.path().join("absent"), None);
        assert!(!result.success);
    }

    #[test]
    fn test_restore_runs_restore_command() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ckpt");
        write_checkpoint_dir(&dir, "dump ok\n");

        let binary = tmp.path().join("criu");
        std::fs::write(&binary, "").unwrap();

        let engine = engine_with(
            ScriptedRunner::new().ok("restore -D", ""),
            tmp.path(),
            Some(binary),
        );
        let result = engine.restore_checkpoint(&dir, Some(&ContainerId::new("web1").unwrap()));
        assert!(result.success, "{:?}", result.error_message);
    }

    #[test]
    fn test_list_checkpoints_skips_foreign_dirs() {
        let tmp = TempDir::new().unwrap();
        write_checkpoint_dir(&tmp.path().join("web1"), "ok\n");
        std::fs::create_dir_all(tmp.path().join("scratch")).unwrap();

        let engine = engine_with(ScriptedRunner::new(), tmp.path(), None);
        let checkpoints = engine.list_checkpoints();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].metadata.container_id, "web1");
    }

    #[test]
    fn test_cleanup_checkpoint_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("gone");
        let engine = engine_with(ScriptedRunner::new(), tmp.path(), None);

        assert!(engine.cleanup_checkpoint(&dir).is_ok());

        std::fs::create_dir_all(&dir).unwrap();
        assert!(engine.cleanup_checkpoint(&dir).is_ok());
        assert!(!dir.exists());
        assert!(engine.cleanup_checkpoint(&dir).is_ok());
    }
}
