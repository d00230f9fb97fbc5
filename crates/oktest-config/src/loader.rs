//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{validate_prefix, ProjectConfig, PROJECT_CONFIG_FILE};
use crate::{ColorChoice, ConfigResult, LogLevel, ReportStyle};
use std::env;
use std::path::{Path, PathBuf};

/// Default prefix marking a plain method as a test
pub const DEFAULT_TEST_PREFIX: &str = "test";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.oktest/config.toml) - lowest priority
/// 2. Project config (./oktest.toml) - overrides global
/// 3. Environment variables (OKTEST_*) - overrides project
/// 4. Caller overrides - highest priority (builder methods on [`Settings`])
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Fully merged settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub style: ReportStyle,
    pub color: ColorChoice,
    pub show_context: bool,
    pub test_prefix: String,
    /// Substring a test name or description must contain to be selected
    pub filter: Option<String>,
    pub log_level: LogLevel,
    /// Directory holding the oktest.toml that was applied, if any
    pub project_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            style: ReportStyle::default(),
            color: ColorChoice::default(),
            show_context: true,
            test_prefix: DEFAULT_TEST_PREFIX.to_string(),
            filter: None,
            log_level: LogLevel::default(),
            project_root: None,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.oktest/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load settings starting from the given directory
    ///
    /// Walks up the directory tree to find oktest.toml, layers it over the
    /// global config, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Settings> {
        let (project_root, project) = self.find_project_config(start_dir)?;
        let global = self.load_global_config()?;

        let mut settings = Settings::merged(&global, &project);
        settings.project_root = project_root;
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Load settings from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Settings> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let global = self.load_global_config()?;

        let mut settings = Settings::merged(&global, &project);
        settings.project_root = config_path.parent().map(|p| p.to_path_buf());
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load the global configuration; a missing file or home directory yields defaults
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => match GlobalConfig::global_config_path() {
                Ok(path) => {
                    self.global_config_path = Some(path.clone());
                    path
                }
                Err(_) => return Ok(GlobalConfig::default()),
            },
        };

        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Layer project values over global defaults
    pub fn merged(global: &GlobalConfig, project: &ProjectConfig) -> Self {
        let defaults = Settings::default();
        Self {
            style: project.style().or(global.style()).unwrap_or(defaults.style),
            color: project.color().or(global.color()).unwrap_or(defaults.color),
            show_context: project.show_context().unwrap_or(defaults.show_context),
            test_prefix: project
                .test_prefix()
                .map(str::to_string)
                .unwrap_or(defaults.test_prefix),
            filter: project.filter().map(str::to_string),
            log_level: project
                .log_level()
                .or(global.log_level())
                .unwrap_or(defaults.log_level),
            project_root: None,
        }
    }

    /// Apply environment variable overrides from the process environment
    ///
    /// Recognised variables: OKTEST_STYLE, OKTEST_COLOR, NO_COLOR,
    /// OKTEST_FILTER (falling back to TEST), OKTEST_LOG
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides using an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(style) = lookup("OKTEST_STYLE") {
            self.style = style.parse()?;
        }

        if let Some(color) = lookup("OKTEST_COLOR") {
            self.color = color.parse()?;
        }
        // NO_COLOR wins over everything, per https://no-color.org
        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            self.color = ColorChoice::Never;
        }

        if let Some(filter) = lookup("OKTEST_FILTER").or_else(|| lookup("TEST")) {
            self.filter = if filter.is_empty() { None } else { Some(filter) };
        }

        if let Some(level) = lookup("OKTEST_LOG") {
            self.log_level = level.parse()?;
        }

        Ok(())
    }

    pub fn with_style(mut self, style: ReportStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_test_prefix(mut self, prefix: impl Into<String>) -> ConfigResult<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        self.test_prefix = prefix;
        Ok(self)
    }

    /// Whether colors should be emitted, given whether the output is a terminal
    pub fn use_color(&self, is_terminal: bool) -> bool {
        match self.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => is_terminal && self.style != ReportStyle::Plain,
        }
    }
}
