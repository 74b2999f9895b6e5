//! redeploy - Entry Point
//!
//! `redeploy deploy <branch> <domain>` runs on the operator's machine and
//! drives the same binary on the target over SSH.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use redeploy::app::{deploy, status};
use redeploy::deploy::checkout::checkout;
use redeploy::errors::DeployError;
use redeploy::exec::{LocalRunner, SshRunner};
use redeploy::installer::install::install;
use redeploy::logs::{init_logging, LogLevel, LogOptions};
use redeploy::models::target::{BranchRef, Target};
use redeploy::storage::settings::Settings;
use redeploy::utils::version_info;

#[derive(Parser)]
#[command(name = "redeploy")]
#[command(about = "Checkout, build and install a service onto a remote host")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to /etc/redeploy/settings.json when present)
    #[arg(long, global = true, env = "REDEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides the settings file)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a branch of the service repository to a host
    Deploy {
        /// Branch to deploy
        branch: BranchRef,

        /// Domain name of the target host
        domain: Target,
    },

    /// Pin the local working copy to a branch, then build and install
    Checkout {
        branch: BranchRef,
        domain: Target,
    },

    /// Build and install whatever the working copy holds
    Install { domain: Target },

    /// Print what is installed on this host as JSON
    Status,

    /// Print version information as JSON
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{json}"),
            Err(e) => exit_with(e.into()),
        }
        return;
    }

    let mut settings = match Settings::load(cli.config.as_deref()).await {
        Ok(settings) => settings,
        Err(e) => exit_with(e),
    };
    if let Some(level) = cli.log_level {
        settings.log_level = level;
    }
    settings.json_logs |= cli.json_logs;

    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    if let Err(e) = run(cli.command, &settings).await {
        exit_with(e);
    }
}

async fn run(command: Commands, settings: &Settings) -> Result<(), DeployError> {
    match command {
        Commands::Deploy { branch, domain } => {
            let runner = SshRunner::new(&domain, &settings.remote);
            deploy::deploy(&runner, settings, &branch, &domain).await?;
        }
        Commands::Checkout { branch, domain } => {
            checkout(&LocalRunner, settings, &branch, &domain).await?;
        }
        Commands::Install { domain } => {
            install(&LocalRunner, settings, &domain).await?;
        }
        Commands::Status => {
            let report = status::collect(settings).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Version => {}
    }
    Ok(())
}

fn exit_with(e: DeployError) -> ! {
    eprintln!("Error: {e}");
    if let Some(log) = e.step_log() {
        eprintln!("{}", log.render());
    }
    std::process::exit(e.exit_code());
}
