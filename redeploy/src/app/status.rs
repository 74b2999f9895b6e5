//! Report of what is installed on this host

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{BinaryFsm, BinaryState};
use crate::errors::DeployError;
use crate::storage::layout::HostLayout;
use crate::storage::settings::Settings;
use crate::utils::{file_digest, version_info, VersionInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub version: VersionInfo,
    pub hostname: Option<String>,
    pub service: String,
    pub binary_path: PathBuf,
    pub binary_state: BinaryState,
    pub binary_sha256: Option<String>,
    pub backup_sha256: Option<String>,
    pub clone_present: bool,
    pub toolchain_present: bool,
    pub unit_installed: bool,
}

/// Inspect the local filesystem for the deployed service's artifacts
pub async fn collect(settings: &Settings) -> Result<StatusReport, DeployError> {
    let layout = HostLayout::from_settings(settings);
    let fsm = BinaryFsm::observe(&layout).await;

    Ok(StatusReport {
        version: version_info(),
        hostname: sysinfo::System::host_name(),
        service: layout.service.clone(),
        binary_path: layout.binary_path.clone(),
        binary_state: fsm.state(),
        binary_sha256: file_digest(layout.binary().path()).await?,
        backup_sha256: file_digest(layout.backup().path()).await?,
        clone_present: layout.git_dir().exists().await,
        toolchain_present: layout.toolchain_env().exists().await,
        unit_installed: layout.unit().exists().await,
    })
}
