use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_FAILURE_STATUS: &str = "ERROR";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PanelConfig {
    pub version: u32,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            version: 1,
            wizard: WizardConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Disable the controls of every step before the review once the
    /// mutation succeeds.
    pub disable_steps_on_commit: bool,
    /// Ask the host to make its template editor read-only after a commit.
    pub read_only_editor_on_commit: bool,
    /// Mutation status that means the commit failed.
    pub failure_status: String,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            disable_steps_on_commit: true,
            read_only_editor_on_commit: true,
            failure_status: DEFAULT_FAILURE_STATUS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Start managed availability fetches as soon as a panel opens.
    pub fetch_on_open: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_on_open: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve home directory for config path")]
    HomeDirectoryUnavailable,
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {message}")]
    Validation { message: String },
}

pub fn resolve_config_path() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(base_dirs
        .home_dir()
        .join(".config")
        .join("ctlpanel")
        .join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<PanelConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed: PanelConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&parsed)?;
    Ok(parsed)
}

/// Loads the config when the file exists and falls back to defaults when it
/// does not. A present but broken file is still an error.
pub fn load_config_or_default(path: &Path) -> Result<PanelConfig, ConfigError> {
    if !path.exists() {
        return Ok(PanelConfig::default());
    }
    load_config(path)
}

pub fn validate_config(config: &PanelConfig) -> Result<(), ConfigError> {
    if config.version != 1 {
        return Err(ConfigError::Validation {
            message: "version must be 1".to_string(),
        });
    }

    if config.wizard.failure_status.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "wizard.failure_status must be non-empty".to_string(),
        });
    }

    Ok(())
}
