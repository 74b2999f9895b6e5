//! Build & install pipeline

use tracing::{info, info_span, warn, Instrument};

use crate::deploy::fsm::{BinaryEvent, BinaryFsm};
use crate::deploy::pipeline::{Pipeline, StepLog};
use crate::deploy::step::StepContext;
use crate::errors::DeployError;
use crate::exec::LocalHost;
use crate::installer::build::{BuildRelease, SwapBinary};
use crate::installer::provision::{
    EnsureToolchain, InstallPackages, QuietLogin, SetHostname, SourceToolchain,
};
use crate::installer::service::{EnsureAccount, ReconcileUnit};
use crate::models::target::Target;
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;

/// Steps that build the working copy and bring the service up for `target`
pub fn install_pipeline(settings: &Settings, target: &Target) -> Pipeline {
    Pipeline::new("install")
        .step(QuietLogin)
        .step(SetHostname::new(target.clone()))
        .step(InstallPackages::new(settings.host.packages.clone()))
        .step(EnsureToolchain::new(settings.host.toolchain_installer.as_str()))
        .step(SourceToolchain)
        .step(BuildRelease::new(settings.host.build_command.as_str()))
        .step(SwapBinary)
        .step(EnsureAccount::new(settings.service.user.as_str()))
        .step(ReconcileUnit)
}

/// Run the install pipeline on this host.
///
/// Steps check and write files directly, so `runner` must execute here too.
pub async fn install<R: LocalHost>(
    runner: &R,
    settings: &Settings,
    target: &Target,
) -> Result<StepLog, DeployError> {
    let layout = HostLayout::from_settings(settings);
    let ctx = StepContext::new(runner, &layout);

    let span = info_span!("install", service = %layout.service, domain = %target);
    async {
        info!("Installing {} on {}", layout.service, target);
        match install_pipeline(settings, target).run(&ctx).await {
            Ok(log) => {
                eprintln!("{}", log.render());
                Ok(log)
            }
            Err(e) => {
                if e.step_log().and_then(StepLog::failed_step) == Some("build-release") {
                    let mut fsm = BinaryFsm::observe(&layout).await;
                    let state = fsm.process(BinaryEvent::BuildFailed(e.to_string()));
                    warn!(state = ?state, "Build failed, installed binary left untouched");
                }
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}
