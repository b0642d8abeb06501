//! Process execution primitive.
//!
//! Both the exec and compose backends and the command readiness probe run
//! external programs through a [`CommandRunner`], so tests can swap in an
//! in-memory runner.

use crate::error::{JunbanError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default timeout for command execution in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;

/// A program invocation, already split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Hard limit on execution time.
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }

    /// Parses a command line using shell-style word splitting.
    pub fn parse(command: &str) -> Result<Self> {
        let parts = shell_words::split(command).map_err(|e| {
            JunbanError::config_with_source(format!("Failed to parse command '{}'", command), e)
        })?;
        let mut parts = parts.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| JunbanError::config("Empty command"))?;

        Ok(Self::new(program).args(parts))
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn working_dir(mut self, dir: Option<String>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Appends environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets the execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Renders the invocation for log and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, shell_words::join(&self.args))
        }
    }
}

/// Outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    /// Describes a failed run for error messages.
    pub fn failure_reason(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        };
        let output = self.output.trim();
        if output.is_empty() {
            status
        } else {
            format!("{}: {}", status, output)
        }
    }
}

/// Executes external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion.
    ///
    /// A non-zero exit is reported through [`CommandOutput::success`]; `Err`
    /// means the process could not be run or exceeded its timeout.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runs commands as child processes of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let rendered = spec.display();
        debug!(command = %rendered, "Executing command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(working_dir) = &spec.working_dir {
            cmd.current_dir(working_dir);
        }

        for (key, value) in &spec.env {
            if key.is_empty() {
                warn!(command = %rendered, "Skipping environment variable with empty name");
                continue;
            }
            cmd.env(key, value);
        }

        let output = timeout(spec.timeout, cmd.output())
            .await
            .map_err(|_| JunbanError::Timeout {
                operation: format!("command execution: {}", rendered),
                seconds: spec.timeout.as_secs(),
            })?
            .map_err(|e| {
                JunbanError::backend_with_source(
                    format!("Failed to execute command '{}': {}", rendered, e),
                    e,
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n{}", stdout, stderr)
        };

        debug!(
            command = %rendered,
            exit_code = output.status.code(),
            stdout = %stdout,
            stderr = %stderr,
            "Command completed"
        );

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined_output,
        })
    }
}
