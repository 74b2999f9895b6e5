//! Git steps that pin the working copy to the tip of a remote branch

use async_trait::async_trait;
use tracing::{debug, info};

use crate::deploy::step::{Step, StepContext, StepOutcome};
use crate::errors::{CommandFailure, DeployError};
use crate::exec::ShellCommand;
use crate::filesys::dir::Dir;
use crate::models::target::BranchRef;

fn git<I, S>(ctx: &StepContext<'_>, args: I) -> ShellCommand
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<String> = std::iter::once("git".to_string())
        .chain(args.into_iter().map(|a| a.as_ref().to_string()))
        .collect();
    ShellCommand::args(args).in_dir(&ctx.layout.clone_dir)
}

/// Resolve a revision to a commit id, `None` when it does not exist
pub async fn rev_parse(ctx: &StepContext<'_>, rev: &str) -> Result<Option<String>, DeployError> {
    let cmd = git(ctx, ["rev-parse", "--verify", "--quiet", rev]);
    let output = ctx.runner.capture(&cmd).await?;
    match output.status {
        0 => Ok(Some(output.stdout_trimmed().to_string())),
        1 => Ok(None),
        _ => Err(DeployError::SourceControlError(CommandFailure::new(
            cmd.to_string(),
            output.status,
            output.stderr,
        ))),
    }
}

/// Tip of the remote-tracking branch, failing if origin has no such branch
async fn remote_tip(ctx: &StepContext<'_>, branch: &BranchRef) -> Result<String, DeployError> {
    rev_parse(ctx, &branch.remote_ref()).await?.ok_or_else(|| {
        DeployError::SourceControlError(CommandFailure::new(
            format!("git rev-parse --verify {}", branch.remote_ref()),
            1,
            format!("branch '{}' not found on origin", branch),
        ))
    })
}

/// Clone the repository if there is no working copy yet
pub struct EnsureClone {
    repository: String,
}

impl EnsureClone {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }
}

#[async_trait]
impl Step for EnsureClone {
    fn name(&self) -> &'static str {
        "ensure-clone"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        if ctx.layout.git_dir().exists().await {
            debug!("Working copy present at {}", ctx.layout.clone_dir.display());
            return Ok(StepOutcome::Satisfied);
        }

        if let Some(parent) = ctx.layout.clone_dir.parent() {
            Dir::new(parent).create().await?;
        }

        info!("Cloning {} into {}", self.repository, ctx.layout.clone_dir.display());
        let dest = ctx.layout.clone_dir.to_string_lossy();
        let cmd = ShellCommand::args(["git", "clone", self.repository.as_str(), dest.as_ref()]);
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::SourceControlError)?;
        Ok(StepOutcome::Applied)
    }
}

/// Fetch every branch from origin
pub struct FetchOrigin {
    branch: BranchRef,
}

impl FetchOrigin {
    pub fn new(branch: BranchRef) -> Self {
        Self { branch }
    }
}

#[async_trait]
impl Step for FetchOrigin {
    fn name(&self) -> &'static str {
        "fetch-origin"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let before = rev_parse(ctx, &self.branch.remote_ref()).await?;

        let cmd = git(ctx, ["fetch", "--prune", "origin"]);
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::SourceControlError)?;

        let after = remote_tip(ctx, &self.branch).await?;
        if before.as_deref() == Some(after.as_str()) {
            debug!("origin/{} unchanged at {}", self.branch, after);
            Ok(StepOutcome::Satisfied)
        } else {
            info!("origin/{} now at {}", self.branch, after);
            Ok(StepOutcome::Applied)
        }
    }
}

/// Point a local branch of the same name at the fetched tip and check it out
pub struct PinBranch {
    branch: BranchRef,
}

impl PinBranch {
    pub fn new(branch: BranchRef) -> Self {
        Self { branch }
    }
}

#[async_trait]
impl Step for PinBranch {
    fn name(&self) -> &'static str {
        "pin-branch"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let tip = remote_tip(ctx, &self.branch).await?;
        let local = rev_parse(ctx, &self.branch.local_ref()).await?;
        let current = ctx
            .runner
            .capture(&git(ctx, ["symbolic-ref", "--quiet", "--short", "HEAD"]))
            .await?;
        let on_branch = current.success() && current.stdout_trimmed() == self.branch.name();

        let remote_ref = self.branch.remote_ref();
        let cmd = git(
            ctx,
            ["checkout", "--force", "-B", self.branch.name(), remote_ref.as_str()],
        );
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::SourceControlError)?;

        if on_branch && local.as_deref() == Some(tip.as_str()) {
            Ok(StepOutcome::Satisfied)
        } else {
            info!("Branch {} pinned to {}", self.branch, tip);
            Ok(StepOutcome::Applied)
        }
    }
}

/// Hard-reset the working tree to the fetched tip and drop untracked files.
///
/// Afterwards HEAD must equal the remote tip.
pub struct ResetToTip {
    branch: BranchRef,
}

impl ResetToTip {
    pub fn new(branch: BranchRef) -> Self {
        Self { branch }
    }
}

#[async_trait]
impl Step for ResetToTip {
    fn name(&self) -> &'static str {
        "reset-to-tip"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let head_before = rev_parse(ctx, "HEAD").await?;
        let status_cmd = git(ctx, ["status", "--porcelain"]);
        let dirty = !ctx
            .runner
            .capture(&status_cmd)
            .await?
            .check(&status_cmd, DeployError::SourceControlError)?
            .stdout_trimmed()
            .is_empty();

        let remote_ref = self.branch.remote_ref();
        for cmd in [
            git(ctx, ["reset", "--hard", remote_ref.as_str()]),
            git(ctx, ["clean", "-fd"]),
        ] {
            ctx.runner
                .stream(&cmd)
                .await?
                .check(&cmd, DeployError::SourceControlError)?;
        }

        let tip = remote_tip(ctx, &self.branch).await?;
        let head = rev_parse(ctx, "HEAD").await?;
        if head.as_deref() != Some(tip.as_str()) {
            return Err(DeployError::SourceControlError(CommandFailure::new(
                "git rev-parse --verify HEAD",
                1,
                format!(
                    "HEAD is {} but origin/{} is {}",
                    head.as_deref().unwrap_or("unborn"),
                    self.branch,
                    tip
                ),
            )));
        }

        if dirty || head_before != head {
            info!("Working tree reset to {}", tip);
            Ok(StepOutcome::Applied)
        } else {
            Ok(StepOutcome::Satisfied)
        }
    }
}
