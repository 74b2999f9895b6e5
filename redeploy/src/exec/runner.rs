//! Command runner abstraction and the local implementation

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{CommandFailure, DeployError};
use crate::filesys::file::File;
use crate::utils::with_suffix;

/// A shell command line plus the directory it runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    script: String,
    cwd: Option<PathBuf>,
}

impl ShellCommand {
    /// A raw shell script, passed to the shell as is
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            cwd: None,
        }
    }

    /// A command built from arguments, each escaped for the shell
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let script = args
            .into_iter()
            .map(|arg| shell_escape(arg.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        Self::new(script)
    }

    /// Run from `dir` instead of the runner's working directory
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Source an environment script before running
    pub fn sourcing(mut self, env_script: &Path) -> Self {
        self.script = format!(
            ". {} && {}",
            shell_escape(&env_script.to_string_lossy()),
            self.script
        );
        self
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// The script with its directory change folded in, for runners that
    /// cannot set a working directory themselves
    pub fn command_line(&self) -> String {
        match &self.cwd {
            Some(dir) => format!(
                "cd {} && {}",
                shell_escape(&dir.to_string_lossy()),
                self.script
            ),
            None => self.script.clone(),
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.script)
    }
}

/// What a finished command left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given status and stderr
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Turn a non-zero exit into the error kind of the calling step
    pub fn check(
        self,
        command: &ShellCommand,
        kind: fn(CommandFailure) -> DeployError,
    ) -> Result<Self, DeployError> {
        if self.success() {
            Ok(self)
        } else {
            Err(kind(CommandFailure::new(
                command.to_string(),
                self.status,
                self.stderr,
            )))
        }
    }
}

/// Trait for executing shell commands on a host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its output
    async fn capture(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError>;

    /// Run a command with its output passed through to the operator.
    /// Only the status is returned.
    async fn stream(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError>;

    /// Write a file on the host, replacing it atomically
    async fn put_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), DeployError>;
}

/// A runner whose commands execute on this machine.
///
/// Install and checkout steps pair its commands with direct filesystem
/// access, so they only accept runners carrying this marker.
pub trait LocalHost: CommandRunner {}

/// Runs commands on this machine through `bash -o pipefail -c`
#[derive(Debug, Clone, Default)]
pub struct LocalRunner;

impl LocalRunner {
    fn command(&self, command: &ShellCommand) -> Command {
        let mut cmd = Command::new("bash");
        cmd.args(["-o", "pipefail", "-c", command.script()]);
        if let Some(dir) = command.cwd() {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn capture(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        debug!("Running: {}", command.command_line());
        let output = self
            .command(command)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(CommandOutput {
            status: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn stream(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        debug!("Running: {}", command.command_line());
        let status = self
            .command(command)
            .stdin(Stdio::null())
            .status()
            .await?;
        Ok(CommandOutput {
            status: exit_code(status),
            ..Default::default()
        })
    }

    async fn put_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), DeployError> {
        let staged = File::new(with_suffix(path, ".tmp"));
        staged.write_bytes(contents).await?;
        staged.set_mode(mode).await?;
        staged.rename_to(&File::new(path)).await
    }
}

impl LocalHost for LocalRunner {}

/// Exit code of a finished process; 128 + signal when killed by a signal
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Quote a string for a POSIX shell, leaving plain words bare
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '%' | ':' | '=' | '@' | '+' | ',')
    }) {
        return s.to_string();
    }
    let escaped = s.replace('\'', "'\\''");
    format!("'{}'", escaped)
}
