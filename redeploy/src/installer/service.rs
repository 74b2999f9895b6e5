//! Service account and supervisor unit

use async_trait::async_trait;
use tracing::info;

use crate::deploy::step::{Step, StepContext, StepOutcome};
use crate::errors::{CommandFailure, DeployError};
use crate::exec::ShellCommand;

/// Create the unprivileged service account if it does not exist.
///
/// An existing account is never modified or recreated.
pub struct EnsureAccount {
    user: String,
}

impl EnsureAccount {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

#[async_trait]
impl Step for EnsureAccount {
    fn name(&self) -> &'static str {
        "ensure-account"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let probe = ShellCommand::args(["id", "-u", self.user.as_str()]);
        if ctx.runner.capture(&probe).await?.success() {
            return Ok(StepOutcome::Satisfied);
        }

        info!("Creating service account {}", self.user);
        let cmd = ShellCommand::args([
            "useradd",
            "--system",
            "--no-create-home",
            "--shell",
            "/usr/sbin/nologin",
            self.user.as_str(),
        ]);
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::InstallError)?;
        Ok(StepOutcome::Applied)
    }
}

/// Install the unit file from the working copy, then reload, enable and
/// restart it and check it came up.
pub struct ReconcileUnit;

#[async_trait]
impl Step for ReconcileUnit {
    fn name(&self) -> &'static str {
        "reconcile-unit"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let source = ctx.layout.unit_source();
        let dest = ctx.layout.unit();
        let copy_op = format!("cp {} {}", source.path().display(), dest.path().display());

        let wanted = source.read_bytes_opt().await?.ok_or_else(|| {
            DeployError::InstallError(CommandFailure::new(
                copy_op.as_str(),
                1,
                format!("unit file {} not found", source.path().display()),
            ))
        })?;
        if dest.read_bytes_opt().await?.as_deref() != Some(wanted.as_slice()) {
            info!("Installing unit {}", dest.path().display());
            dest.write_bytes(&wanted).await.map_err(|e| {
                DeployError::InstallError(CommandFailure::new(copy_op.as_str(), 1, e.to_string()))
            })?;
        }

        let unit = ctx.layout.unit_name();
        for cmd in [
            ShellCommand::args(["systemctl", "daemon-reload"]),
            ShellCommand::args(["systemctl", "enable", unit.as_str()]),
            ShellCommand::args(["systemctl", "restart", unit.as_str()]),
        ] {
            ctx.runner
                .stream(&cmd)
                .await?
                .check(&cmd, DeployError::ServiceError)?;
        }

        let probe = ShellCommand::args(["systemctl", "is-active", unit.as_str()]);
        let state = ctx
            .runner
            .capture(&probe)
            .await?
            .check(&probe, DeployError::ServiceError)?;
        info!("{} is {}", unit, state.stdout_trimmed());
        Ok(StepOutcome::Applied)
    }
}
