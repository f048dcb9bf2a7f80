//! One-time setup checks run when the bridge is first configured.
//!
//! Mirrors what a host's configuration flow needs: confirm the server is
//! reachable and the token works, derive a display title and a stable
//! unique id for the entry, and warn (without failing) when the default
//! channel cannot be resolved yet.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::{MattermostClient, User};
use crate::config::NotifyConfig;
use crate::credentials::Credentials;
use crate::error::BridgeError;
use crate::message::sanitize_channel_names;

/// Number of token characters included in the unique id.
const UNIQUE_ID_TOKEN_CHARS: usize = 8;

/// Outcome of a successful setup validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetupInfo {
    /// Display title, `username@server`.
    pub title: String,
    /// Stable id used to reject duplicate entries.
    pub unique_id: String,
    pub username: String,
    /// Whether the default channel resolved.
    pub default_channel_ok: bool,
}

/// Unique id for a server/token pair: the server URL and the first eight
/// characters of the token.
#[must_use]
pub fn unique_id(credentials: &Credentials) -> String {
    let prefix: String = credentials
        .token()
        .chars()
        .take(UNIQUE_ID_TOKEN_CHARS)
        .collect();
    format!("{}_{prefix}", credentials.server_url())
}

/// Validate user-supplied settings against the server.
///
/// # Errors
/// Returns [`BridgeError::Connectivity`] if the server is unreachable or
/// [`BridgeError::Auth`] if the token is rejected. A default channel that
/// cannot be resolved is only logged.
pub async fn validate_input(
    credentials: Credentials,
    config: &NotifyConfig,
) -> Result<SetupInfo, BridgeError> {
    let client = MattermostClient::new(credentials, config.timeout())?;
    let User { username, .. } = client.validate().await?;

    let default_channel_ok = match sanitize_channel_names([config.default_channel.as_str()])
        .first()
    {
        Some(name) => match client.resolve_channel(name).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    channel = %name,
                    error = %e,
                    "Could not verify access to default channel, but connection is working"
                );
                false
            }
        },
        None => {
            warn!("No default channel configured");
            false
        }
    };

    let credentials = client.credentials();
    let info = SetupInfo {
        title: format!("{username}@{}", credentials.server_url()),
        unique_id: unique_id(credentials),
        username,
        default_channel_ok,
    };

    info!(title = %info.title, "Mattermost setup validated");
    Ok(info)
}
