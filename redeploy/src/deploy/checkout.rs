//! Checkout manager: pin the working copy, then hand off to the installer

use tracing::{info, info_span, Instrument};

use crate::deploy::git::{EnsureClone, FetchOrigin, PinBranch, ResetToTip};
use crate::deploy::pipeline::{Pipeline, StepLog};
use crate::deploy::step::StepContext;
use crate::errors::DeployError;
use crate::exec::LocalHost;
use crate::installer::install::install;
use crate::models::target::{BranchRef, Target};
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;

/// Logs of a complete checkout-and-install run
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub checkout: StepLog,
    pub install: StepLog,
}

/// Steps that leave the working copy at the tip of `origin/<branch>`
pub fn checkout_pipeline(repository: &str, branch: &BranchRef) -> Pipeline {
    Pipeline::new("checkout")
        .step(EnsureClone::new(repository))
        .step(FetchOrigin::new(branch.clone()))
        .step(PinBranch::new(branch.clone()))
        .step(ResetToTip::new(branch.clone()))
}

/// Pin the working copy to `branch`, then build and install for `target`.
///
/// The installer only runs once the checkout succeeded.
pub async fn checkout<R: LocalHost>(
    runner: &R,
    settings: &Settings,
    branch: &BranchRef,
    target: &Target,
) -> Result<DeployReport, DeployError> {
    let repository = settings.repository()?;
    let layout = HostLayout::from_settings(settings);
    let ctx = StepContext::new(runner, &layout);

    let span = info_span!("deploy", branch = %branch, domain = %target);
    async {
        info!("Checking out {} from {}", branch, repository);
        let checkout = checkout_pipeline(repository, branch).run(&ctx).await?;
        eprintln!("{}", checkout.render());

        let install = install(runner, settings, target).await?;
        Ok(DeployReport { checkout, install })
    }
    .instrument(span)
    .await
}
