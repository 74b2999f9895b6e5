//! Operator command: ship redeploy to the target and run checkout there

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, info_span, Instrument};

use crate::deploy::pipeline::{Pipeline, StepLog};
use crate::deploy::step::{Step, StepContext, StepOutcome};
use crate::errors::{CommandFailure, DeployError};
use crate::exec::{CommandRunner, ShellCommand};
use crate::filesys::file::File;
use crate::installer::provision::InstallPackages;
use crate::models::target::{BranchRef, Target};
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;
use crate::utils::sha256_hash;

/// Place a file on the target unless an identical one is already there
pub struct UploadFile {
    name: &'static str,
    path: PathBuf,
    contents: Vec<u8>,
    mode: u32,
}

impl UploadFile {
    pub fn new(name: &'static str, path: impl Into<PathBuf>, contents: Vec<u8>, mode: u32) -> Self {
        Self {
            name,
            path: path.into(),
            contents,
            mode,
        }
    }
}

#[async_trait]
impl Step for UploadFile {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let wanted = sha256_hash(&self.contents);
        let probe = ShellCommand::args(["sha256sum", &*self.path.to_string_lossy()]);
        let remote = ctx.runner.capture(&probe).await?;
        if remote.success() && remote.stdout.split_whitespace().next() == Some(wanted.as_str()) {
            return Ok(StepOutcome::Satisfied);
        }

        info!("Uploading {} ({} bytes)", self.path.display(), self.contents.len());
        ctx.runner.put_file(&self.path, &self.contents, self.mode).await?;
        Ok(StepOutcome::Applied)
    }
}

/// Run the checkout manager on the target and wait for it to finish
pub struct RunRemote {
    command: ShellCommand,
}

impl RunRemote {
    pub fn new(command: ShellCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Step for RunRemote {
    fn name(&self) -> &'static str {
        "remote-checkout"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let output = ctx.runner.stream(&self.command).await?;
        if !output.success() {
            return Err(DeployError::RemoteError(CommandFailure::new(
                self.command.to_string(),
                output.status,
                output.stderr,
            )));
        }
        Ok(StepOutcome::Applied)
    }
}

/// Command line that runs the checkout manager on the target
pub fn remote_checkout_command(settings: &Settings, branch: &BranchRef, target: &Target) -> ShellCommand {
    let binary = settings.remote.binary_path.to_string_lossy();
    let config = settings.remote.settings_path.to_string_lossy();
    let mut args = vec![&*binary, "--config", &*config];
    if settings.json_logs {
        args.push("--json-logs");
    }
    args.extend(["checkout", branch.name(), target.domain()]);
    ShellCommand::args(args)
}

/// Baseline packages, upload, remote run
pub fn deploy_pipeline(
    settings: &Settings,
    binary: Vec<u8>,
    branch: &BranchRef,
    target: &Target,
) -> Result<Pipeline, DeployError> {
    let forwarded = serde_json::to_vec_pretty(settings)?;
    Ok(Pipeline::new("deploy")
        .step(InstallPackages::new(settings.remote.baseline_packages.clone()))
        .step(UploadFile::new(
            "upload-binary",
            &settings.remote.binary_path,
            binary,
            0o755,
        ))
        .step(UploadFile::new(
            "upload-settings",
            &settings.remote.settings_path,
            forwarded,
            0o600,
        ))
        .step(RunRemote::new(remote_checkout_command(settings, branch, target))))
}

/// Deploy `branch` to `target` through `runner`, shipping `binary` as the
/// remote redeploy executable
pub async fn deploy_with(
    runner: &dyn CommandRunner,
    settings: &Settings,
    binary: Vec<u8>,
    branch: &BranchRef,
    target: &Target,
) -> Result<StepLog, DeployError> {
    settings.repository()?;
    let layout = HostLayout::from_settings(settings);
    let ctx = StepContext::new(runner, &layout);
    let pipeline = deploy_pipeline(settings, binary, branch, target)?;

    let span = info_span!("deploy", branch = %branch, domain = %target);
    async {
        info!("Deploying {} to {}", branch, target);
        let log = pipeline.run(&ctx).await?;
        eprintln!("{}", log.render());
        Ok(log)
    }
    .instrument(span)
    .await
}

/// Deploy using the running executable as the remote binary
pub async fn deploy(
    runner: &dyn CommandRunner,
    settings: &Settings,
    branch: &BranchRef,
    target: &Target,
) -> Result<StepLog, DeployError> {
    let binary = File::new(std::env::current_exe()?).read_bytes().await?;
    deploy_with(runner, settings, binary, branch, target).await
}
