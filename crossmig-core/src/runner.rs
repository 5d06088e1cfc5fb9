//! External command invocation port.
//!
//! All external tools (container runtime, checkpoint binary, transports) are
//! reached through the [`CommandRunner`] trait so pipeline logic stays
//! unit-testable without the real binaries installed. A timeout is a failure;
//! no layer retries on its own.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{MigrateError, TimeoutError};

/// How long to sleep between child liveness polls.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured output of one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code, None when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// True when the command exited zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The most useful diagnostic text: stderr when present, stdout otherwise.
    pub fn detail(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }
}

/// Port for running external commands.
///
/// True preemption of an in-flight command (process-group signaling) is NOT a
/// capability of this port; cancellation stays cooperative between pipeline
/// stages.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, MigrateError>;

    /// Run a command with a deadline. Expiry kills the child and returns
    /// a TimeoutError.
    fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, MigrateError>;
}

/// Production runner backed by std::process.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, MigrateError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| MigrateError::Io {
                context: "spawning external command",
                source: e,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, MigrateError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MigrateError::Io {
                context: "spawning external command",
                source: e,
            })?;

        // Drain pipes on reader threads so a chatty child cannot block on a
        // full pipe buffer while we poll for exit.
        let stdout_handle = child.stdout.take().map(spawn_reader);
        let stderr_handle = child.stderr.take().map(spawn_reader);

        let start = Instant::now();
        let status = loop {
            match child.try_wait().map_err(|e| MigrateError::Io {
                context: "waiting for external command",
                source: e,
            })? {
                Some(status) => break status,
                None => {
                    if start.elapsed() >= timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        join_reader(stdout_handle);
                        join_reader(stderr_handle);

                        return Err(TimeoutError::Expired {
                            operation: format!("{} {}", program, args.join(" ")),
                            timeout_secs: timeout.as_secs(),
                        }
                        .into());
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: join_reader(stdout_handle),
            stderr: join_reader(stderr_handle),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = source.read_to_string(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<std::thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

type ResponseFn = Box<dyn Fn(&str) -> CommandOutput + Send + Sync>;

enum Response {
    Fixed(CommandOutput),
    Computed(ResponseFn),
}

struct Rule {
    pattern: String,
    response: Response,
}

/// Scripted command runner for exercising pipelines without external binaries.
///
/// Rules are matched in registration order against the full command line
/// (program plus arguments); the first matching rule answers. Unmatched
/// commands get exit code 127 so a missing rule surfaces as a command failure
/// rather than a panic. Every invocation is recorded for assertions.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with a zero exit and `stdout`.
    pub fn ok(mut self, pattern: &str, stdout: &str) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            response: Response::Fixed(CommandOutput {
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        });
        self
    }

    /// Answer commands containing `pattern` with a non-zero exit and `stderr`.
    pub fn fail(mut self, pattern: &str, code: i32, stderr: &str) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            response: Response::Fixed(CommandOutput {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
        });
        self
    }

    /// Answer commands containing `pattern` by computing the output from the
    /// full command line at call time.
    pub fn on<F>(mut self, pattern: &str, f: F) -> Self
    where
        F: Fn(&str) -> CommandOutput + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            response: Response::Computed(Box::new(f)),
        });
        self
    }

    /// Command lines this runner has answered, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn respond(&self, cmdline: &str) -> CommandOutput {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(cmdline.to_string());
        }

        for rule in &self.rules {
            if cmdline.contains(&rule.pattern) {
                return match &rule.response {
                    Response::Fixed(output) => output.clone(),
                    Response::Computed(f) => f(cmdline),
                };
            }
        }

        CommandOutput {
            code: Some(127),
            stdout: String::new(),
            stderr: format!("scripted runner: no rule for: {}", cmdline),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, MigrateError> {
        Ok(self.respond(&format!("{} {}", program, args.join(" "))))
    }

    fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<CommandOutput, MigrateError> {
        self.run(program, args)
    }
}
