//! Release build and binary swap

use async_trait::async_trait;
use tracing::info;

use crate::deploy::fsm::{BinaryEvent, BinaryFsm};
use crate::deploy::step::{Step, StepContext, StepOutcome};
use crate::errors::{CommandFailure, DeployError};
use crate::exec::ShellCommand;
use crate::filesys::file::File;
use crate::utils::file_digest;

/// Compile the release artifact from the working copy
pub struct BuildRelease {
    command: String,
}

impl BuildRelease {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Step for BuildRelease {
    fn name(&self) -> &'static str {
        "build-release"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let cmd = ShellCommand::new(self.command.as_str())
            .sourcing(&ctx.layout.toolchain_env)
            .in_dir(&ctx.layout.clone_dir);
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::BuildError)?;

        let artifact = ctx.layout.artifact();
        if !artifact.exists().await {
            return Err(DeployError::BuildError(CommandFailure::new(
                self.command.as_str(),
                1,
                format!("no artifact at {}", artifact.path().display()),
            )));
        }
        Ok(StepOutcome::Applied)
    }
}

fn install_failure(operation: String, err: DeployError) -> DeployError {
    DeployError::InstallError(CommandFailure::new(operation, 1, err.to_string()))
}

async fn rename(from: &File, to: &File) -> Result<(), DeployError> {
    from.rename_to(to).await.map_err(|e| {
        install_failure(
            format!("mv {} {}", from.path().display(), to.path().display()),
            e,
        )
    })
}

/// Install the built artifact, keeping the previous binary as the backup.
///
/// The artifact is staged next to the binary first so the final swap is two
/// renames on the same filesystem.
pub struct SwapBinary;

#[async_trait]
impl Step for SwapBinary {
    fn name(&self) -> &'static str {
        "swap-binary"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let layout = ctx.layout;
        let artifact = layout.artifact();
        let staging = layout.staging();
        let binary = layout.binary();
        let backup = layout.backup();

        let mut fsm = BinaryFsm::observe(layout).await;
        let previous = file_digest(binary.path()).await?;

        artifact.copy_to(&staging).await.map_err(|e| {
            install_failure(
                format!("cp {} {}", artifact.path().display(), staging.path().display()),
                e,
            )
        })?;
        staging.set_mode(0o755).await?;

        if fsm.needs_backup() {
            rename(&binary, &backup).await?;
        }
        rename(&staging, &binary).await?;

        let state = fsm.process(BinaryEvent::BuildSucceeded);
        let current = file_digest(binary.path()).await?;
        info!(
            previous = previous.as_deref().unwrap_or("none"),
            current = current.as_deref().unwrap_or("none"),
            state = ?state,
            "Installed {}",
            binary.path().display()
        );
        Ok(StepOutcome::Applied)
    }
}
