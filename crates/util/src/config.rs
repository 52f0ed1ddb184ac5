//! Toolform configuration file.
//!
//! A small JSON document read from `~/.config/toolform/config.json` on most
//! platforms, or from the path named by [`CONFIG_PATH_ENV`]. A missing file
//! yields defaults; a malformed file yields defaults and a warning.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::expand_tilde;

/// Environment variable allowing callers to override the config file path.
pub const CONFIG_PATH_ENV: &str = "TOOLFORM_CONFIG_PATH";

/// Default filename for the JSON payload.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default zlib level applied to cache tokens.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default literal a checkbox submits when ticked.
pub const DEFAULT_CHECKBOX_TRUE_TOKEN: &str = "True";

/// Error surfaced when reading or writing the config file fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure (for example, permissions or missing directory).
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolformConfig {
    /// zlib level (0-9) used when encoding cache tokens.
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    /// Directory searched for `<tool_id>.yaml` manifests.
    #[serde(default)]
    pub tools_dir: Option<String>,
    /// Literal a ticked checkbox submits.
    #[serde(default = "default_checkbox_true_token")]
    pub checkbox_true_token: String,
}

impl Default for ToolformConfig {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            tools_dir: None,
            checkbox_true_token: DEFAULT_CHECKBOX_TRUE_TOKEN.to_string(),
        }
    }
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_checkbox_true_token() -> String {
    DEFAULT_CHECKBOX_TRUE_TOKEN.to_string()
}

impl ToolformConfig {
    /// Loads the config from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_config_path())
    }

    /// Loads the config from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<ToolformConfig>(&data) {
                Ok(config) => config,
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        error = %error,
                        "Failed to parse config file; using defaults"
                    );
                    ToolformConfig::default()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => ToolformConfig::default(),
            Err(error) => return Err(ConfigError::Io(error)),
        };
        if config.compression_level > 9 {
            warn!(level = config.compression_level, "compression level out of range; clamping to 9");
            config.compression_level = 9;
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}

/// Get the default path for the config file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolform")
        .join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolformConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, ToolformConfig::default());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let config = ToolformConfig::load_from(&path).unwrap();
        assert_eq!(config.compression_level, DEFAULT_COMPRESSION_LEVEL);
    }

    #[test]
    fn round_trips_and_clamps_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = ToolformConfig {
            compression_level: 12,
            tools_dir: Some("~/tools".into()),
            checkbox_true_token: "on".into(),
        };
        config.save_to(&path).unwrap();

        let loaded = ToolformConfig::load_from(&path).unwrap();
        assert_eq!(loaded.compression_level, 9);
        assert_eq!(loaded.tools_dir.as_deref(), Some("~/tools"));
        assert_eq!(loaded.checkbox_true_token, "on");
    }

    #[test]
    fn env_var_overrides_default_path() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("/tmp/toolform-test/config.json"), || {
            assert_eq!(default_config_path(), PathBuf::from("/tmp/toolform-test/config.json"));
        });
    }
}
