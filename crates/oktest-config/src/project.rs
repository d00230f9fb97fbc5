//! Project Configuration (oktest.toml)
//!
//! Handles project-level configuration stored in `oktest.toml` at the project root.

use crate::{ColorChoice, ConfigError, ConfigResult, LogLevel, ReportStyle};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name searched for when walking up from the start directory
pub const PROJECT_CONFIG_FILE: &str = "oktest.toml";

/// Project configuration from oktest.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Discovery and selection settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunConfig>,

    /// Reporter settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportConfig>,

    /// Logging settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,
}

/// `[run]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Prefix marking a plain method as a test (default: "test")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_prefix: Option<String>,

    /// Substring filter applied to test names and descriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// `[report]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ReportStyle>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorChoice>,

    /// Print subject/situation headers in verbose mode (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_context: Option<bool>,
}

/// `[log]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate values serde cannot check on its own
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(prefix) = self.test_prefix() {
            validate_prefix(prefix)?;
        }
        Ok(())
    }

    pub fn test_prefix(&self) -> Option<&str> {
        self.run.as_ref().and_then(|r| r.test_prefix.as_deref())
    }

    pub fn filter(&self) -> Option<&str> {
        self.run.as_ref().and_then(|r| r.filter.as_deref())
    }

    pub fn style(&self) -> Option<ReportStyle> {
        self.report.as_ref().and_then(|r| r.style)
    }

    pub fn color(&self) -> Option<ColorChoice> {
        self.report.as_ref().and_then(|r| r.color)
    }

    pub fn show_context(&self) -> Option<bool> {
        self.report.as_ref().and_then(|r| r.show_context)
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.log.as_ref().and_then(|l| l.level)
    }
}

/// A test prefix must be a non-empty identifier fragment
pub(crate) fn validate_prefix(prefix: &str) -> ConfigResult<()> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidValue {
            field: "run.test_prefix".to_string(),
            reason: format!("must be a non-empty identifier, got '{}'", prefix),
        });
    }
    Ok(())
}
