//! Global Configuration (~/.oktest/config.toml)
//!
//! User-level defaults shared by every project on the machine.

use crate::{ColorChoice, ConfigError, ConfigResult, LogLevel, ReportStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.oktest/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Preferred reporter style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ReportStyle>,

    /// Preferred color mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorChoice>,

    /// Preferred log level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })
    }

    /// Get the global config file path (~/.oktest/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".oktest").join("config.toml"))
    }

    pub fn style(&self) -> Option<ReportStyle> {
        self.defaults.as_ref().and_then(|d| d.style)
    }

    pub fn color(&self) -> Option<ColorChoice> {
        self.defaults.as_ref().and_then(|d| d.color)
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.defaults.as_ref().and_then(|d| d.log_level)
    }

    /// Merge another global config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &GlobalConfig) {
        if other.defaults.is_some() {
            self.defaults = other.defaults.clone();
        }
    }
}
