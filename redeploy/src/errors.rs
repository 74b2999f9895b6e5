//! Error types for redeploy

use std::fmt;

use thiserror::Error;

use crate::deploy::pipeline::StepLog;

/// A shell command that ran and exited unsuccessfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// The command as it was handed to the shell
    pub command: String,

    /// Exit status (128 + signal number when killed by a signal)
    pub status: i32,

    /// Captured standard error, empty when the command streamed its output
    pub stderr: String,
}

impl CommandFailure {
    pub fn new(command: impl Into<String>, status: i32, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` exited with status {}", self.command, self.status)?;
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

/// Main error type for redeploy
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The target host could not be reached or refused the session
    #[error("Transport error: {0}")]
    TransportError(CommandFailure),

    /// Clone, fetch, checkout or reset failed
    #[error("Source control error: {0}")]
    SourceControlError(CommandFailure),

    /// Package manager or toolchain bootstrap failed
    #[error("Provisioning error: {0}")]
    ProvisioningError(CommandFailure),

    #[error("Build error: {0}")]
    BuildError(CommandFailure),

    /// Binary swap or account creation failed
    #[error("Install error: {0}")]
    InstallError(CommandFailure),

    /// The supervisor refused to reload, enable or restart the unit
    #[error("Service error: {0}")]
    ServiceError(CommandFailure),

    /// The pipeline on the target host exited unsuccessfully
    #[error("Remote run failed: {0}")]
    RemoteError(CommandFailure),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        log: StepLog,
        source: Box<DeployError>,
    },
}

impl DeployError {
    /// The command failure behind this error, if a command caused it
    pub fn command_failure(&self) -> Option<&CommandFailure> {
        match self {
            DeployError::TransportError(f)
            | DeployError::SourceControlError(f)
            | DeployError::ProvisioningError(f)
            | DeployError::BuildError(f)
            | DeployError::InstallError(f)
            | DeployError::ServiceError(f)
            | DeployError::RemoteError(f) => Some(f),
            DeployError::StepFailed { source, .. } => source.command_failure(),
            _ => None,
        }
    }

    /// Step log of the pipeline that produced this error, if any
    pub fn step_log(&self) -> Option<&StepLog> {
        match self {
            DeployError::StepFailed { log, .. } => Some(log),
            _ => None,
        }
    }

    /// Process exit code to report for this error.
    ///
    /// A failing command's status propagates unmodified; everything else
    /// exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self.command_failure() {
            Some(failure) if failure.status != 0 => failure.status,
            _ => 1,
        }
    }
}
