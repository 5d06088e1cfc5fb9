// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end integration tests for crossmig.
//!
//! These tests drive the full migration pipeline through the scripted
//! command runner, so no container runtime, checkpoint binary, or device
//! needs to be installed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crossmig_core::checkpoint::file_sha256;
use crossmig_core::runner::{CommandOutput, ScriptedRunner};
use crossmig_core::{
    Architecture, ConfigLoader, ContainerId, MigrationConfig, MigrationOrchestrator,
    MigrationStatus, Settings, TargetHost,
};

const RUNNING_INSPECT: &str = r#"[{
    "State": {"Status": "running", "Pid": 4242},
    "Config": {"ExposedPorts": {"80/tcp": {}}, "Architecture": "amd64"},
    "HostConfig": {"Privileged": false, "NetworkMode": "bridge"}
}]"#;

fn settings(tmp: &TempDir) -> Settings {
    Settings {
        work_dir: tmp.path().join("work"),
        checkpoint_dir: tmp.path().join("checkpoints"),
        checkpoint_binary: Some(fake_binary(tmp)),
        ..Settings::default()
    }
}

fn fake_binary(tmp: &TempDir) -> PathBuf {
    let binary = tmp.path().join("criu");
    if !binary.exists() {
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }
    binary
}

fn ok_output(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Writes the dump log the way the real dump would, so the checkpoint
/// directory validates during rollback.
fn dump_rule(cmdline: &str) -> CommandOutput {
    if let Some(dir) = cmdline
        .split(" -D ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
    {
        let _ = std::fs::write(Path::new(dir).join("dump.log"), "dump completed ok\n");
    }
    ok_output("")
}

/// Baseline rules shared by every scenario: running container, healthy
/// checkpoint environment, reachable device.
fn baseline_runner() -> ScriptedRunner {
    ScriptedRunner::new()
        .ok("docker inspect", RUNNING_INSPECT)
        .ok("docker --version", "Docker version 27.0.3")
        .ok("criu check", "Looks good.")
        .ok("echo ok", "ok")
        .ok("uname -m", "x86_64")
        .ok("uname -r", "6.6.30")
        .on("dump -t", dump_rule)
}

fn web1_config() -> MigrationConfig {
    MigrationConfig::new(
        ContainerId::new("web1").unwrap(),
        TargetHost::parse("adb:deviceA").unwrap(),
    )
}

/// Scenario: running, unprivileged, bridge-networked container and a
/// reachable device target migrate end to end.
#[test]
fn test_full_migration_to_device_completes() {
    let tmp = TempDir::new().unwrap();
    let package_path = tmp.path().join("work").join("web1_checkpoint.tar.gz");

    let sha_package = package_path.clone();
    let runner = baseline_runner()
        .ok("push", "")
        .on("sha256sum", move |_| match file_sha256(&sha_package) {
            Ok(sum) => ok_output(&format!(
                "{}  /data/local/tmp/migration/web1_checkpoint.tar.gz\n",
                sum
            )),
            Err(_) => CommandOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: "no such file".to_string(),
            },
        })
        .ok("tar -xzf", "")
        .ok("restore -D", "")
        .ok("docker ps", "9f86d081884c\n");

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), Arc::new(runner)).unwrap();
    let config = web1_config();
    let result = orchestrator.migrate_container(&config);

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.status, MigrationStatus::Completed);
    assert!(result.migration_time.is_some());
    assert_eq!(
        result.source_checkpoint_path.as_deref(),
        Some(tmp.path().join("checkpoints").join("web1").as_path())
    );
    assert_eq!(
        result.target_checkpoint_path.as_deref(),
        Some("/data/local/tmp/migration/web1_restored")
    );

    // Terminal result is retained for status queries.
    let tracked = orchestrator
        .get_migration_status(&config.container_id)
        .unwrap();
    assert_eq!(tracked.status, MigrationStatus::Completed);
    assert!(orchestrator.list_active_migrations().is_empty());
}

/// Scenario: transfer fails after a successful checkpoint and the local
/// restore of the retained checkpoint succeeds.
#[test]
fn test_transfer_failure_rolls_back() {
    let tmp = TempDir::new().unwrap();
    let runner = baseline_runner()
        .fail("push", 1, "device write failed")
        .ok("restore -D", "");

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), Arc::new(runner)).unwrap();
    let result = orchestrator.migrate_container(&web1_config());

    assert!(!result.success);
    assert_eq!(result.status, MigrationStatus::RolledBack);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("transfer failed"));
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("rolled back")));
}

/// Same transfer failure, but the local restore fails too: terminal FAILED
/// with an added warning that rollback also failed.
#[test]
fn test_transfer_failure_rollback_also_fails() {
    let tmp = TempDir::new().unwrap();
    let runner = baseline_runner()
        .fail("push", 1, "device write failed")
        .fail("restore -D", 1, "restore error");

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), Arc::new(runner)).unwrap();
    let result = orchestrator.migrate_container(&web1_config());

    assert!(!result.success);
    assert_eq!(result.status, MigrationStatus::Failed);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("rollback also failed")));
}

/// With rollback disabled a transfer failure stays FAILED and no restore
/// is attempted.
#[test]
fn test_transfer_failure_rollback_disabled() {
    let tmp = TempDir::new().unwrap();
    let runner = Arc::new(
        baseline_runner()
            .fail("push", 1, "device write failed")
            .ok("restore -D", ""),
    );

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), runner.clone()).unwrap();
    let mut config = web1_config();
    config.rollback_on_failure = false;

    let result = orchestrator.migrate_container(&config);

    assert_eq!(result.status, MigrationStatus::Failed);
    assert!(!result.warnings.iter().any(|w| w.contains("rollback")));
    assert!(!runner
        .calls()
        .iter()
        .any(|call| call.contains("restore -D")));
}

/// An inconclusive target validation query is recorded as a warning and
/// never rolls the migration back.
#[test]
fn test_inconclusive_validation_is_warning_only() {
    let tmp = TempDir::new().unwrap();
    let package_path = tmp.path().join("work").join("web1_checkpoint.tar.gz");

    let sha_package = package_path.clone();
    let runner = baseline_runner()
        .ok("push", "")
        .on("sha256sum", move |_| match file_sha256(&sha_package) {
            Ok(sum) => ok_output(&format!("{}  package\n", sum)),
            Err(_) => ok_output(""),
        })
        .ok("tar -xzf", "")
        .ok("restore -D", "")
        .ok("docker ps", "");

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), Arc::new(runner)).unwrap();
    let result = orchestrator.migrate_container(&web1_config());

    assert!(result.success);
    assert_eq!(result.status, MigrationStatus::Completed);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("not confirmed running")));
}

/// A checksum mismatch on the target blocks the restore and triggers the
/// rollback path.
#[test]
fn test_remote_checksum_mismatch_blocks_restore() {
    let tmp = TempDir::new().unwrap();
    let runner = Arc::new(
        baseline_runner()
            .ok("push", "")
            .ok("sha256sum", "deadbeef  package\n")
            .ok("restore -D", ""),
    );

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), runner.clone()).unwrap();
    let result = orchestrator.migrate_container(&web1_config());

    assert_eq!(result.status, MigrationStatus::RolledBack);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("checksum mismatch"));
    // The corrupt package was never unpacked on the target.
    assert!(!runner.calls().iter().any(|call| call.contains("tar -xzf")));
}

/// Checkpoint failure is terminal; nothing exists yet to roll back.
#[test]
fn test_checkpoint_failure_is_terminal() {
    let tmp = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .ok("docker inspect", RUNNING_INSPECT)
            .ok("docker --version", "Docker version 27.0.3")
            .ok("criu check", "")
            .ok("echo ok", "ok")
            .fail("dump -t", 1, "Can't dump task"),
    );

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), runner.clone()).unwrap();
    let result = orchestrator.migrate_container(&web1_config());

    assert_eq!(result.status, MigrationStatus::Failed);
    assert!(result
        .error_message
        .as_deref()
        .unwrap()
        .contains("Checkpoint creation failed"));
    assert!(!runner.calls().iter().any(|call| call.contains("restore")));
}

/// Settings round-trip through the YAML loader.
#[test]
fn test_settings_loading_and_validation() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("crossmig.yaml");

    std::fs::write(
        &config_path,
        r#"
work_dir: /var/tmp/crossmig-test
remote_work_dir: /data/local/tmp/migration
timeouts:
  probe_secs: 5
  restore_secs: 60
"#,
    )
    .unwrap();

    let settings = ConfigLoader::load_file(&config_path).unwrap();
    assert_eq!(settings.work_dir, PathBuf::from("/var/tmp/crossmig-test"));
    assert_eq!(
        settings.timeouts.restore(),
        std::time::Duration::from_secs(60)
    );

    let invalid = "timeouts:\n  probe_secs: 300\n";
    assert!(ConfigLoader::load_string(invalid).is_err());
}

/// Dry-run building blocks: a stopped container is reported by both the
/// prerequisite check and the compatibility gate without side effects.
#[test]
fn test_dry_run_checks_on_stopped_container() {
    let tmp = TempDir::new().unwrap();
    let stopped = r#"[{
        "State": {"Status": "exited", "Pid": 0},
        "Config": {},
        "HostConfig": {"NetworkMode": "bridge"}
    }]"#;
    let runner = ScriptedRunner::new()
        .ok("docker inspect", stopped)
        .ok("criu check", "")
        .ok("echo ok", "ok");

    let orchestrator = MigrationOrchestrator::new(settings(&tmp), Arc::new(runner)).unwrap();
    let config = web1_config();

    let report = orchestrator.validate_migration_prerequisites(&config);
    assert!(!report.is_ok());
    assert!(report.errors.iter().any(|e| e.contains("not running")));

    let compat =
        orchestrator.check_container_compatibility(&config.container_id, &Architecture::aarch64());
    // A stopped container still inspects cleanly; compatibility only judges
    // configuration.
    assert!(compat.is_compatible);
}
