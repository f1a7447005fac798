//! Configuration file handling for `~/.dlang/config.ini`.
//!
//! Parsing lives in [`super::parser`], serialization in [`super::writer`].

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::settings::Settings;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl Settings {
    /// Load settings from the default path (`~/.dlang/config.ini`).
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&config_file_path())
    }

    /// Load settings from a specific path.
    ///
    /// A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(SettingsError::DirectoryError)?;
        }

        let content = super::writer::to_config_string(self);
        std::fs::write(path, content).map_err(|e| SettingsError::WriteError(e.to_string()))
    }
}

/// Get the path to the config directory (`~/.dlang`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dlang")
}

/// Get the path to the config file (`~/.dlang/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_PARALLEL_DOWNLOADS};

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.network.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(settings.network.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(settings.install.parallel_downloads, DEFAULT_PARALLEL_DOWNLOADS);
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut settings = Settings::default();
        settings.network.max_retries = 5;
        settings.network.max_delay_ms = 10_000;
        settings.network.api_base_url = "https://git.example.com/api/v3".to_string();
        settings.install.parallel_downloads = 8;
        settings.save_to(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, "[network]\nmax_retries = lots\n").unwrap();

        let err = Settings::load_from(&config_path).unwrap_err();
        match err {
            SettingsError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "network");
                assert_eq!(key, "max_retries");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_file_path_is_under_dlang_dir() {
        let path = config_file_path();
        assert!(path.ends_with(".dlang/config.ini"));
    }
}
