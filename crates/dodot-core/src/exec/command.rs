//! Child process execution with a per-operation timeout.
//!
//! Both stdout and stderr are captured through pipes and forwarded line by
//! line to the caller's stdout/stderr and to the tracing log, so
//! provisioning output lands in the log file too. A timed-out child is
//! killed and reported as `ActionExecute`.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;
use wait_timeout::ChildExt;

use crate::error::{Error, ErrorCode, Result};
use crate::op::OpKind;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// One command invocation, lifted out of [`OpKind::Execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path.
    pub command: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory, when the op pins one.
    pub working_dir: Option<PathBuf>,
    /// Extra environment pairs.
    pub env: Vec<(String, String)>,
    /// Effective timeout.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Build a spec from an execute operation.
    ///
    /// # Errors
    ///
    /// `Internal` when the operation is not an execute.
    pub fn from_op(kind: &OpKind) -> Result<Self> {
        let OpKind::Execute {
            command,
            args,
            working_dir,
            env,
            timeout_secs,
        } = kind
        else {
            return Err(Error::new(
                ErrorCode::Internal,
                "command runner handed a non-execute operation",
            ));
        };
        Ok(Self {
            command: command.clone(),
            args: args.clone(),
            working_dir: working_dir.clone(),
            env: env.clone(),
            timeout: timeout_secs.map_or(DEFAULT_TIMEOUT, Duration::from_secs),
        })
    }
}

/// Runs commands on behalf of the executor.
pub trait CommandRunner: Send + Sync {
    /// Run to completion; non-zero exit and timeout are errors.
    fn run(&self, spec: &CommandSpec) -> Result<()>;
}

/// [`CommandRunner`] that spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Construct the process runner.
    pub fn new() -> Self {
        Self
    }
}

/// Echo one captured stream line by line and mirror it into the log.
fn forward_lines<R: Read>(reader: R, stderr: bool) {
    for line in BufReader::new(reader).lines() {
        let Ok(line) = line else { break };
        if stderr {
            eprintln!("{line}");
            info!(stream = "stderr", "{line}");
        } else {
            println!("{line}");
            info!(stream = "stdout", "{line}");
        }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<()> {
        let program = if spec.command.contains('/') {
            PathBuf::from(&spec.command)
        } else {
            which::which(&spec.command).map_err(|_| {
                Error::new(
                    ErrorCode::NotFound,
                    format!("command not found on PATH: {}", spec.command),
                )
            })?
        };

        let mut command = Command::new(&program);
        command.args(&spec.args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|err| {
            Error::new(
                ErrorCode::ActionExecute,
                format!("failed to spawn {}: {err}", program.display()),
            )
        })?;

        // The pumps drain the pipes while we wait; killing the child closes
        // its pipe ends, so the scope always finishes.
        std::thread::scope(|scope| {
            if let Some(stdout) = child.stdout.take() {
                scope.spawn(move || forward_lines(stdout, false));
            }
            if let Some(stderr) = child.stderr.take() {
                scope.spawn(move || forward_lines(stderr, true));
            }

            match child.wait_timeout(spec.timeout).map_err(Error::from)? {
                Some(status) if status.success() => Ok(()),
                Some(status) => Err(Error::new(
                    ErrorCode::ActionExecute,
                    format!("{} exited with {status}", spec.command),
                )),
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    Err(Error::new(
                        ErrorCode::ActionExecute,
                        format!(
                            "{} timed out after {}s",
                            spec.command,
                            spec.timeout.as_secs()
                        ),
                    ))
                }
            }
        })
    }
}

/// [`CommandRunner`] that records invocations instead of spawning.
///
/// Engine-level tests pair this with the in-memory filesystem; commands
/// whose program name contains the configured marker fail.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    fail_marker: Option<String>,
}

impl RecordingRunner {
    /// Runner where every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner failing any command whose program name contains `marker`.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_marker: Some(marker.to_string()),
        }
    }

    /// Commands run so far.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().expect("runner lock").clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> Result<()> {
        self.calls.lock().expect("runner lock").push(spec.clone());
        match &self.fail_marker {
            Some(marker) if spec.command.contains(marker.as_str()) => Err(Error::new(
                ErrorCode::ActionExecute,
                format!("{} exited with status 1", spec.command),
            )),
            _ => Ok(()),
        }
    }
}
