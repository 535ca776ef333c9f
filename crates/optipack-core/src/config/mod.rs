//! Configuration management for Optipack.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every section implements `Default`, so a partial file only needs
//! the keys it changes.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use crate::types::Preset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Optipack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Processing settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Archive output settings
    pub archive: ArchiveConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Named size presets
    pub presets: Vec<Preset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            processing: ProcessingConfig::default(),
            limits: LimitsConfig::default(),
            archive: ArchiveConfig::default(),
            logging: LoggingConfig::default(),
            presets: default_presets(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.optipack.optipack/config.toml
    /// - Linux: ~/.config/optipack/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\optipack\config\config.toml
    ///
    /// Falls back to ~/.optipack/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "optipack", "optipack")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".optipack").join("config.toml")
            })
    }

    /// Get the resolved static file directory (with ~ expansion), if configured.
    pub fn static_dir(&self) -> Option<PathBuf> {
        self.server
            .static_dir
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
