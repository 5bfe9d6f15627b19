//! Command handlers and the helpers they share.

pub mod config_cmd;
pub mod render;
pub mod simulate;

use std::path::{Path, PathBuf};

use devlink_config::Config;
use devlink_core::DeviceLink;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file path: `--config` if given, otherwise the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(devlink_config::config_path)
}

/// Load the config file plus environment, then apply flag overrides.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = devlink_config::load_config_from(&config_path(global))?;
    if let Some(ref node) = global.node {
        cfg.node_name.clone_from(node);
    }
    Ok(cfg)
}

/// Read a single DeviceLink document. YAML is accepted, so is JSON.
pub fn load_manifest(path: &Path) -> Result<DeviceLink, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ManifestUnreadable {
        path: path.display().to_string(),
        source,
    })?;
    let link: DeviceLink =
        serde_yaml::from_str(&text).map_err(|e| CliError::ManifestInvalid {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    if link.metadata.name.is_empty() {
        return Err(CliError::ManifestInvalid {
            path: path.display().to_string(),
            reason: "metadata.name is required".into(),
        });
    }
    Ok(link)
}
