//! Host provisioning steps

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::deploy::step::{Step, StepContext, StepOutcome};
use crate::errors::{CommandFailure, DeployError};
use crate::exec::{shell_escape, ShellCommand};
use crate::models::target::Target;

/// Silence login banners for the deploying account
pub struct QuietLogin;

#[async_trait]
impl Step for QuietLogin {
    fn name(&self) -> &'static str {
        "quiet-login"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let marker = ctx.layout.hushlogin();
        if marker.exists().await {
            return Ok(StepOutcome::Satisfied);
        }
        marker.write_string("").await?;
        Ok(StepOutcome::Applied)
    }
}

/// Make the host's name match its domain
pub struct SetHostname {
    target: Target,
}

impl SetHostname {
    pub fn new(target: Target) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Step for SetHostname {
    fn name(&self) -> &'static str {
        "set-hostname"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let probe = ShellCommand::new("hostname");
        let current = ctx
            .runner
            .capture(&probe)
            .await?
            .check(&probe, DeployError::ProvisioningError)?;
        if current.stdout_trimmed() == self.target.domain() {
            return Ok(StepOutcome::Satisfied);
        }

        info!("Renaming host {:?} to {}", current.stdout_trimmed(), self.target);
        let cmd = ShellCommand::args(["hostnamectl", "set-hostname", self.target.domain()]);
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::ProvisioningError)?;
        Ok(StepOutcome::Applied)
    }
}

/// Install OS packages that are not installed yet
pub struct InstallPackages {
    packages: Vec<String>,
}

impl InstallPackages {
    pub fn new(packages: Vec<String>) -> Self {
        Self { packages }
    }

    fn query(&self) -> ShellCommand {
        let names = self
            .packages
            .iter()
            .map(|p| shell_escape(p))
            .collect::<Vec<_>>()
            .join(" ");
        ShellCommand::new(format!(
            "dpkg-query -W -f='${{Package}} ${{db:Status-Status}}\\n' {}",
            names
        ))
    }
}

/// Names reported as installed by `dpkg-query -f='${Package} ${db:Status-Status}\n'`
pub fn installed_packages(query_output: &str) -> HashSet<&str> {
    query_output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(name), Some("installed")) => Some(name),
                _ => None,
            }
        })
        .collect()
}

#[async_trait]
impl Step for InstallPackages {
    fn name(&self) -> &'static str {
        "install-packages"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        if self.packages.is_empty() {
            return Ok(StepOutcome::Satisfied);
        }

        // dpkg-query exits non-zero for unknown packages but still lists the known ones
        let output = ctx.runner.capture(&self.query()).await?;
        let installed = installed_packages(&output.stdout);
        let missing: Vec<&str> = self
            .packages
            .iter()
            .map(String::as_str)
            .filter(|p| !installed.contains(p))
            .collect();
        if missing.is_empty() {
            debug!("All {} packages installed", self.packages.len());
            return Ok(StepOutcome::Satisfied);
        }

        info!("Installing packages: {}", missing.join(" "));
        let update = ShellCommand::new("DEBIAN_FRONTEND=noninteractive apt-get update");
        let install = ShellCommand::new(format!(
            "DEBIAN_FRONTEND=noninteractive apt-get install --yes {}",
            missing
                .iter()
                .map(|p| shell_escape(p))
                .collect::<Vec<_>>()
                .join(" ")
        ));
        for cmd in [update, install] {
            ctx.runner
                .stream(&cmd)
                .await?
                .check(&cmd, DeployError::ProvisioningError)?;
        }
        Ok(StepOutcome::Applied)
    }
}

/// Bootstrap the toolchain unless its environment script already exists
pub struct EnsureToolchain {
    installer: String,
}

impl EnsureToolchain {
    pub fn new(installer: impl Into<String>) -> Self {
        Self {
            installer: installer.into(),
        }
    }
}

#[async_trait]
impl Step for EnsureToolchain {
    fn name(&self) -> &'static str {
        "ensure-toolchain"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let marker = ctx.layout.toolchain_env();
        if marker.exists().await {
            debug!("Toolchain present at {}", marker.path().display());
            return Ok(StepOutcome::Satisfied);
        }

        info!("Toolchain missing, running installer");
        let cmd = ShellCommand::new(self.installer.as_str());
        ctx.runner
            .stream(&cmd)
            .await?
            .check(&cmd, DeployError::ProvisioningError)?;

        if !marker.exists().await {
            return Err(DeployError::ProvisioningError(CommandFailure::new(
                self.installer.as_str(),
                1,
                format!("installer did not create {}", marker.path().display()),
            )));
        }
        Ok(StepOutcome::Applied)
    }
}

/// Source the toolchain environment and check the compiler driver runs.
///
/// Every later toolchain command sources the same script.
pub struct SourceToolchain;

#[async_trait]
impl Step for SourceToolchain {
    fn name(&self) -> &'static str {
        "source-toolchain"
    }

    async fn reconcile(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, DeployError> {
        let cmd = ShellCommand::new("cargo --version").sourcing(&ctx.layout.toolchain_env);
        let output = ctx
            .runner
            .capture(&cmd)
            .await?
            .check(&cmd, DeployError::ProvisioningError)?;
        info!("Using {}", output.stdout_trimmed());
        Ok(StepOutcome::Satisfied)
    }
}
