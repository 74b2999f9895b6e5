//! Settings file management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Settings file consulted when no path is given explicitly
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/redeploy/settings.json";

/// Deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for a rolling log file; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// The service being deployed
    #[serde(default)]
    pub service: ServiceSettings,

    /// Where the source comes from and where it is checked out
    #[serde(default)]
    pub source: SourceSettings,

    /// Host provisioning
    #[serde(default)]
    pub host: HostSettings,

    /// How the operator reaches the target
    #[serde(default)]
    pub remote: RemoteSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_dir: None,
            json_logs: false,
            service: ServiceSettings::default(),
            source: SourceSettings::default(),
            host: HostSettings::default(),
            remote: RemoteSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit path must exist. Without one, the default settings file is
    /// used when present and built-in defaults otherwise.
    pub async fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let file = match path {
            Some(path) => File::new(path),
            None => {
                let file = File::new(DEFAULT_SETTINGS_PATH);
                if !file.exists().await {
                    debug!("No settings file at {}, using defaults", DEFAULT_SETTINGS_PATH);
                    return Ok(Self::default());
                }
                file
            }
        };

        if !file.exists().await {
            return Err(DeployError::ConfigError(format!(
                "settings file not found: {}",
                file.path().display()
            )));
        }

        debug!("Loading settings from {}", file.path().display());
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that could never produce a working deploy
    pub fn validate(&self) -> Result<(), DeployError> {
        let name = &self.service.name;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(DeployError::ConfigError(format!(
                "invalid service name: {:?}",
                name
            )));
        }
        if self.service.user.is_empty() {
            return Err(DeployError::ConfigError("service user is empty".to_string()));
        }
        if self.host.build_command.trim().is_empty() {
            return Err(DeployError::ConfigError("build command is empty".to_string()));
        }
        Ok(())
    }

    /// The repository URL, which has no usable default
    pub fn repository(&self) -> Result<&str, DeployError> {
        let repository = self.source.repository.trim();
        if repository.is_empty() {
            return Err(DeployError::ConfigError(
                "source.repository is not set".to_string(),
            ));
        }
        Ok(repository)
    }
}

/// Service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name: names the binary, the cargo artifact and the unit
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Unprivileged account the unit runs as
    #[serde(default = "default_service_name")]
    pub user: String,

    /// Unit file inside the repository, relative to the clone root.
    /// Defaults to `<name>.service`.
    #[serde(default)]
    pub unit_file: Option<PathBuf>,
}

fn default_service_name() -> String {
    "cratebot".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            user: default_service_name(),
            unit_file: None,
        }
    }
}

/// Source checkout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Clone URL of the service repository
    #[serde(default)]
    pub repository: String,

    /// Working copy on the target. Defaults to `/opt/<service>/src`.
    #[serde(default)]
    pub clone_dir: Option<PathBuf>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            repository: String::new(),
            clone_dir: None,
        }
    }
}

/// Host provisioning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Home directory of the deploying account (holds the toolchain)
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,

    /// Directory the release binary is installed into
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,

    /// Supervisor unit directory
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,

    /// OS packages the build needs
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// Bootstrap command run when the toolchain is missing
    #[serde(default = "default_toolchain_installer")]
    pub toolchain_installer: String,

    /// Release build command, run from the clone root
    #[serde(default = "default_build_command")]
    pub build_command: String,
}

fn default_home_dir() -> PathBuf {
    PathBuf::from("/root")
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_packages() -> Vec<String> {
    ["build-essential", "pkg-config", "libssl-dev", "libsqlite3-dev", "vim"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_toolchain_installer() -> String {
    "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y".to_string()
}

fn default_build_command() -> String {
    "cargo build --release".to_string()
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            install_dir: default_install_dir(),
            unit_dir: default_unit_dir(),
            packages: default_packages(),
            toolchain_installer: default_toolchain_installer(),
            build_command: default_build_command(),
        }
    }
}

/// Operator-side SSH settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// SSH login user
    #[serde(default = "default_remote_user")]
    pub user: String,

    /// SSH port
    #[serde(default = "default_remote_port")]
    pub port: u16,

    /// Extra arguments passed to every `ssh` invocation
    #[serde(default = "default_ssh_options")]
    pub ssh_options: Vec<String>,

    /// Where the redeploy binary is placed on the target
    #[serde(default = "default_remote_binary")]
    pub binary_path: PathBuf,

    /// Where the forwarded settings are placed on the target
    #[serde(default = "default_remote_settings")]
    pub settings_path: PathBuf,

    /// Packages ensured before anything else runs on the target
    #[serde(default = "default_baseline_packages")]
    pub baseline_packages: Vec<String>,
}

fn default_remote_user() -> String {
    "root".to_string()
}

fn default_remote_port() -> u16 {
    22
}

fn default_ssh_options() -> Vec<String> {
    vec!["-o".to_string(), "BatchMode=yes".to_string()]
}

fn default_remote_binary() -> PathBuf {
    PathBuf::from("/usr/local/sbin/redeploy")
}

fn default_remote_settings() -> PathBuf {
    PathBuf::from(DEFAULT_SETTINGS_PATH)
}

fn default_baseline_packages() -> Vec<String> {
    vec!["git".to_string(), "curl".to_string()]
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            user: default_remote_user(),
            port: default_remote_port(),
            ssh_options: default_ssh_options(),
            binary_path: default_remote_binary(),
            settings_path: default_remote_settings(),
            baseline_packages: default_baseline_packages(),
        }
    }
}
