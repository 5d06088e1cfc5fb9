//! Dual transport addressing for migration targets.
//!
//! A target is reached either over the device bridge (`adb push`/`adb shell`)
//! or a remote shell (`scp`/`ssh`), selected by the [`TargetHost`] variant.
//! The transport exposes the three primitives the pipeline needs: probe,
//! push, shell.

use std::path::Path;
use std::sync::Arc;

use crate::config::Timeouts;
use crate::error::{MigrateError, TransferError};
use crate::runner::{CommandOutput, CommandRunner};
use crate::types::TargetHost;

/// Connect timeout passed to the remote shell itself, matching the probe
/// budget so a dead host fails inside our own deadline.
const SSH_CONNECT_TIMEOUT: &str = "ConnectTimeout=10";

/// Push/pull/shell access to one migration target.
pub struct Transport {
    runner: Arc<dyn CommandRunner>,
    host: TargetHost,
    timeouts: Timeouts,
}

impl Transport {
    pub fn new(runner: Arc<dyn CommandRunner>, host: TargetHost, timeouts: Timeouts) -> Self {
        Self {
            runner,
            host,
            timeouts,
        }
    }

    pub fn host(&self) -> &TargetHost {
        &self.host
    }

    /// Check that the target answers a trivial shell round-trip.
    pub fn probe(&self) -> Result<(), MigrateError> {
        let output = match &self.host {
            TargetHost::Device { .. } => {
                let mut args = self.bridge_args();
                args.extend(["shell", "echo", "ok"].map(String::from));
                self.run("adb", &args, self.timeouts.probe())?
            }
            TargetHost::Remote { address } => self.run(
                "ssh",
                &[
                    "-o".to_string(),
                    SSH_CONNECT_TIMEOUT.to_string(),
                    address.clone(),
                    "echo".to_string(),
                    "ok".to_string(),
                ],
                self.timeouts.probe(),
            )?,
        };

        if !output.success() {
            return Err(TransferError::Unreachable {
                host: self.host.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Copy a local file to `remote_path` on the target.
    pub fn push(&self, local: &Path, remote_path: &str) -> Result<(), MigrateError> {
        let local = local.to_string_lossy().to_string();

        let output = match &self.host {
            TargetHost::Device { .. } => {
                let mut args = self.bridge_args();
                args.extend(["push".to_string(), local, remote_path.to_string()]);
                self.run("adb", &args, self.timeouts.transfer())?
            }
            TargetHost::Remote { address } => self.run(
                "scp",
                &[local, format!("{}:{}", address, remote_path)],
                self.timeouts.transfer(),
            )?,
        };

        if !output.success() {
            return Err(TransferError::CommandFailed {
                target: self.host.to_string(),
                detail: output.detail(),
            }
            .into());
        }
        Ok(())
    }

    /// Run a shell command on the target and return its output.
    ///
    /// A non-zero remote exit is returned to the caller for interpretation;
    /// only spawn failures and timeouts are errors here.
    pub fn shell(&self, command: &str) -> Result<CommandOutput, MigrateError> {
        match &self.host {
            TargetHost::Device { .. } => {
                let mut args = self.bridge_args();
                args.extend(["shell".to_string(), command.to_string()]);
                self.run("adb", &args, self.timeouts.shell())
            }
            TargetHost::Remote { address } => self.run(
                "ssh",
                &[address.clone(), command.to_string()],
                self.timeouts.shell(),
            ),
        }
    }

    /// Like [`shell`](Self::shell) but with the restore-scale timeout.
    pub fn shell_slow(&self, command: &str) -> Result<CommandOutput, MigrateError> {
        match &self.host {
            TargetHost::Device { .. } => {
                let mut args = self.bridge_args();
                args.extend(["shell".to_string(), command.to_string()]);
                self.run("adb", &args, self.timeouts.restore())
            }
            TargetHost::Remote { address } => self.run(
                "ssh",
                &[address.clone(), command.to_string()],
                self.timeouts.restore(),
            ),
        }
    }

    fn bridge_args(&self) -> Vec<String> {
        match &self.host {
            TargetHost::Device { serial: Some(s) } => vec!["-s".to_string(), s.clone()],
            _ => Vec::new(),
        }
    }

    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: std::time::Duration,
    ) -> Result<CommandOutput, MigrateError> {
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.runner.run_with_timeout(program, &arg_refs, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScriptedRunner;

    fn transport(runner: ScriptedRunner, host: &str) -> (Arc<ScriptedRunner>, Transport) {
        let runner = Arc::new(runner);
        let t = Transport::new(
            runner.clone(),
            TargetHost::parse(host).unwrap(),
            Timeouts::default(),
        );
        (runner, t)
    }

    #[test]
    fn test_probe_device_ok() {
        let (runner, t) = transport(ScriptedRunner::new().ok("adb -s deviceA shell echo ok", "ok"), "adb:deviceA");
        assert!(t.probe().is_ok());
        assert!(runner.calls()[0].starts_with("adb -s deviceA shell"));
    }

    #[test]
    fn test_probe_unreachable_remote() {
        let (_, t) = transport(
            ScriptedRunner::new().fail("ssh", 255, "connection refused"),
            "user@arm-host",
        );
        let err = t.probe().unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Transfer(TransferError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_push_selects_mechanism_by_host() {
        let (runner, t) = transport(ScriptedRunner::new().ok("scp", ""), "user@arm-host");
        t.push(Path::new("/tmp/p.tar.gz"), "/data/p.tar.gz").unwrap();
        assert!(runner.calls()[0].starts_with("scp /tmp/p.tar.gz user@arm-host:"));

        let (runner, t) = transport(ScriptedRunner::new().ok("adb push", ""), "adb:default");
        t.push(Path::new("/tmp/p.tar.gz"), "/data/p.tar.gz").unwrap();
        assert!(runner.calls()[0].starts_with("adb push"));
    }

    #[test]
    fn test_push_failure_is_transfer_error() {
        let (_, t) = transport(ScriptedRunner::new().fail("adb", 1, "device offline"), "adb:deviceA");
        let err = t.push(Path::new("/tmp/p"), "/data/p").unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Transfer(TransferError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_shell_returns_nonzero_to_caller() {
        let (_, t) = transport(ScriptedRunner::new().fail("ssh", 2, "no such file"), "user@host");
        let output = t.shell("tar -xzf missing.tar.gz").unwrap();
        assert!(!output.success());
        assert_eq!(output.detail(), "no such file");
    }
}
