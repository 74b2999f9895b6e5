//! Host layout: every fixed path the pipelines touch on the target

use std::path::PathBuf;

use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::storage::settings::Settings;
use crate::utils::with_suffix;

/// Suffix of the single backup generation
pub const BACKUP_SUFFIX: &str = ".bak";

/// Suffix of the staged binary before it is renamed into place
pub const STAGING_SUFFIX: &str = ".new";

/// Filesystem layout on the target host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Service name the paths are derived from
    pub service: String,

    /// Working copy of the source repository
    pub clone_dir: PathBuf,

    /// Release binary
    pub binary_path: PathBuf,

    /// Unit file the supervisor reads
    pub unit_path: PathBuf,

    /// Unit file shipped in the repository
    pub unit_source: PathBuf,

    /// Toolchain environment script, also the "toolchain installed" marker
    pub toolchain_env: PathBuf,

    /// Marker that silences login banners
    pub hushlogin: PathBuf,
}

impl HostLayout {
    /// Derive the layout from settings
    pub fn from_settings(settings: &Settings) -> Self {
        let service = settings.service.name.clone();
        let clone_dir = settings
            .source
            .clone_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/opt").join(&service).join("src"));
        let unit_file = settings
            .service
            .unit_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.service", service)));

        Self {
            binary_path: settings.host.install_dir.join(&service),
            unit_path: settings.host.unit_dir.join(format!("{}.service", service)),
            unit_source: clone_dir.join(unit_file),
            toolchain_env: settings.host.home_dir.join(".cargo").join("env"),
            hushlogin: settings.host.home_dir.join(".hushlogin"),
            clone_dir,
            service,
        }
    }

    /// Unit name as the supervisor knows it
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service)
    }

    pub fn clone_root(&self) -> Dir {
        Dir::new(&self.clone_dir)
    }

    /// The `.git` directory whose presence means the clone exists
    pub fn git_dir(&self) -> Dir {
        self.clone_root().subdir(".git")
    }

    /// Artifact produced by the release build
    pub fn artifact(&self) -> File {
        File::new(
            self.clone_dir
                .join("target")
                .join("release")
                .join(&self.service),
        )
    }

    pub fn binary(&self) -> File {
        File::new(&self.binary_path)
    }

    pub fn backup(&self) -> File {
        File::new(with_suffix(&self.binary_path, BACKUP_SUFFIX))
    }

    pub fn staging(&self) -> File {
        File::new(with_suffix(&self.binary_path, STAGING_SUFFIX))
    }

    pub fn unit(&self) -> File {
        File::new(&self.unit_path)
    }

    pub fn unit_source(&self) -> File {
        File::new(&self.unit_source)
    }

    pub fn toolchain_env(&self) -> File {
        File::new(&self.toolchain_env)
    }

    pub fn hushlogin(&self) -> File {
        File::new(&self.hushlogin)
    }
}
