//! Runs commands on the target host over `ssh`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::runner::{exit_code, shell_escape, CommandOutput, CommandRunner, ShellCommand};
use crate::errors::{CommandFailure, DeployError};
use crate::models::target::Target;
use crate::storage::settings::RemoteSettings;
use crate::utils::with_suffix;

/// Status `ssh` exits with when the session itself failed
pub const SSH_TRANSPORT_STATUS: i32 = 255;

/// A remote shell on one target host.
///
/// Every command is a single blocking round-trip. A 255 exit is taken to be
/// a connection or authentication failure.
#[derive(Debug, Clone)]
pub struct SshRunner {
    program: PathBuf,
    destination: String,
    port: u16,
    options: Vec<String>,
}

impl SshRunner {
    pub fn new(target: &Target, remote: &RemoteSettings) -> Self {
        Self {
            program: PathBuf::from("ssh"),
            destination: format!("{}@{}", remote.user, target.domain()),
            port: remote.port,
            options: remote.ssh_options.clone(),
        }
    }

    /// Use another ssh client binary
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// `user@host` as handed to ssh
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Arguments for `ssh` that run `line` on the target
    pub fn ssh_args(&self, line: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), self.port.to_string()];
        args.extend(self.options.iter().cloned());
        args.push(self.destination.clone());
        args.push("--".to_string());
        args.push(line.to_string());
        args
    }

    fn command(&self, line: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.ssh_args(line));
        cmd
    }

    fn transport_check(&self, output: CommandOutput) -> Result<CommandOutput, DeployError> {
        if output.status == SSH_TRANSPORT_STATUS {
            return Err(DeployError::TransportError(CommandFailure::new(
                format!("ssh {}", self.destination),
                output.status,
                output.stderr,
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl CommandRunner for SshRunner {
    async fn capture(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        let line = command.command_line();
        debug!("Running on {}: {}", self.destination, line);
        let output = self
            .command(&line)
            .stdin(Stdio::null())
            .output()
            .await?;
        self.transport_check(CommandOutput {
            status: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn stream(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        let line = command.command_line();
        debug!("Running on {}: {}", self.destination, line);
        let status = self.command(&line).stdin(Stdio::null()).status().await?;
        self.transport_check(CommandOutput {
            status: exit_code(status),
            ..Default::default()
        })
    }

    async fn put_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), DeployError> {
        let dest = shell_escape(&path.to_string_lossy());
        let staged = shell_escape(&with_suffix(path, ".tmp").to_string_lossy());
        let parent = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "/".to_string());
        let line = format!(
            "mkdir -p {parent} && cat > {staged} && chmod {mode:o} {staged} && mv -f {staged} {dest}",
            parent = shell_escape(&parent),
        );
        debug!(
            "Uploading {} bytes to {}:{}",
            contents.len(),
            self.destination,
            path.display()
        );

        let mut child = self
            .command(&line)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let mut truncated = false;
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(contents).await {
                Ok(()) => {}
                // ssh exited early; its status and stderr say why
                Err(e) if e.kind() == ErrorKind::BrokenPipe => truncated = true,
                Err(e) => return Err(e.into()),
            }
        }
        let output = child.wait_with_output().await?;

        let output = self.transport_check(CommandOutput {
            status: exit_code(output.status),
            stdout: String::new(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })?;
        let cmd = ShellCommand::new(line);
        let output = output.check(&cmd, DeployError::InstallError)?;
        if truncated {
            return Err(DeployError::InstallError(CommandFailure::new(
                cmd.to_string(),
                output.status,
                format!("remote closed stdin before {} bytes were sent", contents.len()),
            )));
        }
        Ok(())
    }
}
