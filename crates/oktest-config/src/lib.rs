//! oktest Configuration System
//!
//! Provides configuration management for oktest runs including:
//! - Project configuration (oktest.toml)
//! - Global user configuration (~/.oktest/config.toml)
//! - Environment overrides (OKTEST_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.oktest/config.toml)
//! 2. Project config (./oktest.toml, searched upwards)
//! 3. Environment variables (OKTEST_*, NO_COLOR, TEST)
//! 4. Caller overrides on [`Settings`]
//!
//! # Example
//!
//! ```no_run
//! use oktest_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let settings = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("style = {}", settings.style);
//! ```

pub mod global;
pub mod loader;
pub mod project;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How the console reporter renders progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStyle {
    /// One line per test, nested under its subject/situation
    #[default]
    Verbose,
    /// One status character per test
    Simple,
    /// Status characters without color or context headers
    Plain,
}

/// Whether reporters may emit ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Minimum level for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

macro_rules! keyword_enum {
    ($ty:ident, $field:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            /// The configuration keyword for this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> ConfigResult<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ConfigError::InvalidValue {
                        field: $field.to_string(),
                        reason: format!(
                            "expected one of {}, got '{}'",
                            [$(concat!("'", $text, "'")),+].join(", "),
                            other
                        ),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

keyword_enum!(ReportStyle, "style", {
    "verbose" => Verbose,
    "simple" => Simple,
    "plain" => Plain,
});

keyword_enum!(ColorChoice, "color", {
    "auto" => Auto,
    "always" => Always,
    "never" => Never,
});

keyword_enum!(LogLevel, "log.level", {
    "error" => Error,
    "warn" => Warn,
    "info" => Info,
    "debug" => Debug,
    "trace" => Trace,
});

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{ConfigLoader, Settings};
pub use project::ProjectConfig;
