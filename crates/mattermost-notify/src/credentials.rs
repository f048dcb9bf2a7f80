//! Server URL and bot token used for every API call.

use reqwest::header::HeaderValue;
use reqwest::Url;

use crate::config::ConfigError;
use crate::error::BridgeError;

/// API version prefix appended to the server base URL.
const API_PREFIX: &str = "/api/v4";

/// Bot credentials for a single Mattermost server.
///
/// Built once from configuration and passed by reference to every call.
/// The server URL is stored normalized: scheme present, no trailing slash,
/// no `/api/v4` suffix.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    server_url: String,
    token: String,
}

impl Credentials {
    /// Create credentials, normalizing the server URL.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidUrl`] if the URL cannot be parsed or is
    /// not `http`/`https`.
    pub fn new(server_url: &str, token: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: normalize_server_url(server_url)?,
            token: token.into(),
        })
    }

    /// Normalized base URL of the server.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// The raw bot token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Full URL for an API path such as `/users/me`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.server_url)
    }

    /// Build the `Authorization` header value for this token.
    ///
    /// # Errors
    /// Returns [`BridgeError::Auth`] if the token is empty or contains
    /// characters that are not valid in an HTTP header.
    pub fn bearer_header(&self) -> Result<HeaderValue, BridgeError> {
        if self.token.trim().is_empty() {
            return Err(BridgeError::Auth("bot token is empty".to_string()));
        }

        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|_| {
            BridgeError::Auth("bot token contains characters not allowed in a header".to_string())
        })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Normalize a user-supplied server URL.
///
/// `chat.example.com/` becomes `https://chat.example.com`, and a pasted
/// `https://chat.example.com/api/v4/` loses its API suffix.
///
/// # Errors
/// Returns [`ConfigError::InvalidUrl`] for unparseable URLs, URLs without a
/// host, or schemes other than `http`/`https`.
pub fn normalize_server_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "URL is empty".to_string(),
        });
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    let mut normalized = url.as_str().trim_end_matches('/').to_string();
    if let Some(stripped) = normalized.strip_suffix(API_PREFIX) {
        normalized = stripped.trim_end_matches('/').to_string();
    }

    Ok(normalized)
}
