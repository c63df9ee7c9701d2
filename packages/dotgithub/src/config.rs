//! Project configuration read from `dotgithub.json5` (or `dotgithub.json`).

use std::{
    fs,
    path::{Path, PathBuf},
};

use dotgithub_renderer::WORKFLOWS_DIR;
use dotgithub_validator::{RunnerAllowList, ValidatorConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base name of the config file, without extension.
pub const CONFIG_FILE_NAME: &str = "dotgithub";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] json5::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where compiled manifests are written, relative to the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Runner labels allowed in addition to the GitHub-hosted ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runners: Vec<String>,

    /// Accept any runner label without a warning
    #[serde(default)]
    pub allow_unknown_runners: bool,
}

impl Config {
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(WORKFLOWS_DIR))
    }

    #[must_use]
    pub fn validator_config(&self) -> ValidatorConfig {
        let mut runners = RunnerAllowList::default();
        runners.extend(self.runners.iter().cloned());

        ValidatorConfig {
            runners,
            allow_unknown_runners: self.allow_unknown_runners,
        }
    }
}

/// Get the path to the config file in `dir`, preferring .json5 but also checking .json
#[must_use]
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    let json5_path = dir.join(format!("{CONFIG_FILE_NAME}.json5"));
    if json5_path.exists() {
        return Some(json5_path);
    }

    let json_path = dir.join(format!("{CONFIG_FILE_NAME}.json"));
    if json_path.exists() {
        return Some(json_path);
    }

    None
}

/// Load a config file from disk.
///
/// # Errors
///
/// * If the config file cannot be read
/// * If the config file is malformed
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = json5::from_str(&content)?;
    log::debug!("load_config_file: loaded {}", path.display());
    Ok(config)
}

/// Load the config from `dir`, falling back to defaults when there is no config file.
///
/// # Errors
///
/// * If the config file cannot be read
/// * If the config file is malformed
pub fn load_config(dir: &Path) -> Result<Config, ConfigError> {
    find_config_file(dir).map_or_else(
        || {
            log::debug!("load_config: no config file in {}", dir.display());
            Ok(Config::default())
        },
        |path| load_config_file(&path),
    )
}
