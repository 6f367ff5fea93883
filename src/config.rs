//! Configuration management for the Calibre-Web client.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories, with environment overrides for
//! the server connection.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "calibre-web-client";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Environment variables overriding the `server` section.
pub const ENV_URL: &str = "CALIBRE_URL";
pub const ENV_USERNAME: &str = "CALIBRE_USERNAME";
pub const ENV_PASSWORD: &str = "CALIBRE_PASSWORD";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server location and credentials.
    pub server: ServerConfig,

    /// HTTP client settings.
    pub http: HttpConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Calibre-Web server connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL, e.g. `https://books.example.org` or `http://nas:8083/calibre`.
    pub url: String,

    pub username: String,

    pub password: String,
}

impl ServerConfig {
    /// Checks whether credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User agent sent with every request.
    pub user_agent: String,

    /// Per-request timeout in seconds. Unset means the transport default.
    pub timeout_secs: Option<u64>,

    /// Upper bound on listing pages walked before the listing is considered broken.
    pub max_list_pages: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("calibre-web-client/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: None,
            max_list_pages: 10_000,
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory downloads are written to.
    pub download_directory: PathBuf,

    /// Netscape cookie file used to seed the session.
    pub cookie_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_directory: PathBuf::from("."),
            cookie_file: None,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overrides server settings from `CALIBRE_URL`, `CALIBRE_USERNAME` and
    /// `CALIBRE_PASSWORD` when they are set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key| lookup(key).filter(|value| !value.is_empty());

        if let Some(url) = get(ENV_URL) {
            self.server.url = url;
        }
        if let Some(username) = get(ENV_USERNAME) {
            self.server.username = username;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.server.password = password;
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.url.trim().is_empty() {
            return Err(ConfigError::MissingValue(format!(
                "server.url (set it in the config file or {})",
                ENV_URL
            )));
        }

        if let Err(e) = url::Url::parse(&self.server.url) {
            return Err(ConfigError::InvalidValue {
                key: "server.url".to_string(),
                message: e.to_string(),
            });
        }

        if self.http.max_list_pages == 0 {
            return Err(ConfigError::InvalidValue {
                key: "http.max_list_pages".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.server.url.is_empty());
        assert!(!config.server.has_credentials());
        assert_eq!(config.http.max_list_pages, 10_000);
        assert_eq!(config.http.timeout_secs, None);
        assert!(config.http.user_agent.starts_with("calibre-web-client/"));
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.server.url = "http://nas:8083".to_string();
        config.http.timeout_secs = Some(45);
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.server.url, "http://nas:8083");
        assert_eq!(loaded.http.timeout_secs, Some(45));
    }

    #[test]
    fn test_missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(config.server.url.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[server]\nurl = \"https://books.example.org\"\n").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.url, "https://books.example.org");
        assert_eq!(config.http.max_list_pages, 10_000);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingValue(_))));

        let mut config = Config::default();
        config.server.url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        config.server.url = "http://nas:8083/calibre".to_string();
        assert!(config.validate().is_ok());

        config.http.max_list_pages = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_URL, "https://books.example.org"),
            (ENV_USERNAME, "admin"),
            (ENV_PASSWORD, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.server.password = "from-file".to_string();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.url, "https://books.example.org");
        assert_eq!(config.server.username, "admin");
        assert_eq!(config.server.password, "from-file");
    }
}
