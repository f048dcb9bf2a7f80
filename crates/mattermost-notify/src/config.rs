//! Configuration for the Mattermost bridge.
//!
//! Configuration can come from a TOML file, from environment variables, or
//! both: [`NotifyConfig::load`] reads the file first and lets the
//! environment override individual keys.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::credentials::Credentials;

/// Environment variable to disable all notifications.
pub const ENV_NOTIFY_DISABLED: &str = "NOTIFY_DISABLED";
const ENV_URL: &str = "MATTERMOST_URL";
const ENV_TOKEN: &str = "MATTERMOST_TOKEN";
const ENV_DEFAULT_CHANNEL: &str = "MATTERMOST_DEFAULT_CHANNEL";
const ENV_TIMEOUT_SECS: &str = "MATTERMOST_TIMEOUT_SECS";
const ENV_MAX_FILE_SIZE: &str = "MATTERMOST_MAX_FILE_SIZE";
const ENV_ALLOWED_PATHS: &str = "MATTERMOST_ALLOWED_PATHS";
const ENV_ALLOWED_URLS: &str = "MATTERMOST_ALLOWED_URLS";
const ENV_AUTHOR_NAME: &str = "MATTERMOST_AUTHOR_NAME";
const ENV_AUTHOR_ICON: &str = "MATTERMOST_AUTHOR_ICON";

pub const DEFAULT_CHANNEL: &str = "town-square";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Mattermost's own default `MaxFileSize` (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_AUTHOR_NAME: &str = "Home Assistant";
pub const DEFAULT_AUTHOR_ICON: &str =
    "https://www.home-assistant.io/images/favicon-192x192-full.png";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is missing
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// Server URL could not be normalized
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Setting has a value that cannot be parsed
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Bridge configuration, supplied once at setup and reused for every send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Mattermost server URL (scheme optional).
    pub server_url: Option<String>,
    /// Bot access token.
    pub token: Option<String>,
    /// Channel used when a request names no target.
    pub default_channel: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Largest attachment accepted, in bytes.
    pub max_file_size: u64,
    /// Directories local attachments may be read from (empty = any).
    pub allowed_paths: Vec<PathBuf>,
    /// URL prefixes remote attachments may be fetched from (empty = any).
    pub allowed_urls: Vec<String>,
    /// Author shown on message attachments.
    pub author_name: String,
    /// Author icon shown on message attachments.
    pub author_icon: String,
    /// Disable every notification channel.
    pub disabled: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            token: None,
            default_channel: DEFAULT_CHANNEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_paths: vec![],
            allowed_urls: vec![],
            author_name: DEFAULT_AUTHOR_NAME.to_string(),
            author_icon: DEFAULT_AUTHOR_ICON.to_string(),
            disabled: false,
        }
    }
}

impl NotifyConfig {
    /// Build configuration from environment variables only.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for unparseable numeric values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML for this
    /// structure.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from an optional TOML file, then apply environment
    /// overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if an
    /// environment variable holds an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields with values returned by `lookup`.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a file setting.
    pub(crate) fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_URL) {
            self.server_url = Some(url);
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(channel) = get(ENV_DEFAULT_CHANNEL) {
            self.default_channel = channel;
        }
        if let Some(value) = get(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_u64(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = get(ENV_MAX_FILE_SIZE) {
            self.max_file_size = parse_u64(ENV_MAX_FILE_SIZE, &value)?;
        }
        if let Some(value) = get(ENV_ALLOWED_PATHS) {
            self.allowed_paths = split_list(&value).map(PathBuf::from).collect();
        }
        if let Some(value) = get(ENV_ALLOWED_URLS) {
            self.allowed_urls = split_list(&value).map(str::to_string).collect();
        }
        if let Some(name) = get(ENV_AUTHOR_NAME) {
            self.author_name = name;
        }
        if let Some(icon) = get(ENV_AUTHOR_ICON) {
            self.author_icon = icon;
        }
        if let Some(value) = get(ENV_NOTIFY_DISABLED) {
            self.disabled = value.eq_ignore_ascii_case("true") || value == "1";
        }

        Ok(())
    }

    /// Check whether a server URL and token are both present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.token.is_some()
    }

    /// Build credentials from the configured URL and token.
    ///
    /// # Errors
    /// Returns [`ConfigError::Missing`] if either is absent, or
    /// [`ConfigError::InvalidUrl`] if the URL cannot be normalized.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let url = self.server_url.as_deref().ok_or(ConfigError::Missing(ENV_URL))?;
        let token = self.token.as_deref().ok_or(ConfigError::Missing(ENV_TOKEN))?;
        Credentials::new(url, token)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = NotifyConfig::default();
        assert_eq!(config.default_channel, "town-square");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_file_size, 104_857_600);
        assert!(!config.is_configured());
        assert!(!config.disabled);
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = NotifyConfig::default();
        config
            .apply_env(lookup(&[
                ("MATTERMOST_URL", "chat.example.com"),
                ("MATTERMOST_TOKEN", "tok"),
                ("MATTERMOST_DEFAULT_CHANNEL", "alerts"),
                ("MATTERMOST_TIMEOUT_SECS", "5"),
                ("MATTERMOST_ALLOWED_PATHS", "/config/www, /media ,"),
                ("NOTIFY_DISABLED", "TRUE"),
            ]))
            .unwrap();

        assert!(config.is_configured());
        assert_eq!(config.default_channel, "alerts");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(
            config.allowed_paths,
            vec![PathBuf::from("/config/www"), PathBuf::from("/media")]
        );
        assert!(config.disabled);
    }

    #[test]
    fn test_apply_env_ignores_blank_values() {
        let mut config = NotifyConfig {
            default_channel: "ops".to_string(),
            ..NotifyConfig::default()
        };
        config
            .apply_env(lookup(&[("MATTERMOST_DEFAULT_CHANNEL", "  ")]))
            .unwrap();
        assert_eq!(config.default_channel, "ops");
    }

    #[test]
    fn test_apply_env_rejects_bad_number() {
        let mut config = NotifyConfig::default();
        let err = config
            .apply_env(lookup(&[("MATTERMOST_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "MATTERMOST_TIMEOUT_SECS",
                ..
            }
        ));
    }

    #[test]
    fn test_from_toml() {
        let config = NotifyConfig::from_toml_str(
            r#"
            server_url = "https://chat.example.com"
            token = "abc"
            default_channel = "home"
            allowed_urls = ["https://camera.local/"]
            "#,
        )
        .unwrap();

        assert_eq!(config.default_channel, "home");
        assert_eq!(config.allowed_urls, vec!["https://camera.local/"]);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(
            config.credentials().unwrap().server_url(),
            "https://chat.example.com"
        );
    }

    #[test]
    fn test_credentials_requires_url_and_token() {
        let config = NotifyConfig {
            token: Some("abc".to_string()),
            ..NotifyConfig::default()
        };
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::Missing("MATTERMOST_URL"))
        ));
    }
}
