//! Error types for the Mattermost bridge.

use thiserror::Error;

/// Errors that can occur while talking to a Mattermost server.
///
/// Every variant carries a human-readable message. None of them are retried:
/// they almost always point at configuration (wrong URL, revoked token,
/// misspelled channel) rather than transient faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Server unreachable, connection refused or request timed out
    #[error("Cannot reach Mattermost server: {0}")]
    Connectivity(String),

    /// Token missing, malformed, expired or rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Channel or team could not be resolved
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Attachment unreadable, not allowed, too large or rejected by the server
    #[error("File error: {0}")]
    File(String),

    /// Unexpected HTTP status or malformed response
    #[error("Unexpected response: {0}")]
    Transport(String),
}

/// What could not be found during channel resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFound {
    /// None of the bot's channels in any of its teams has this name
    #[error("Channel not found: {name}")]
    Channel { name: String },

    /// The bot does not belong to any team
    #[error("Bot is not a member of any team")]
    NoTeams,

    /// The bot may not list the channels of this team
    #[error("Channels of team {team_id} are not visible to the bot")]
    Team { team_id: String },

    /// A previously resolved channel no longer accepts posts
    #[error("Channel {channel_id} no longer exists")]
    StaleChannel { channel_id: String },
}

/// Stable, machine-readable classification of a [`BridgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connectivity,
    Auth,
    NotFound,
    File,
    Transport,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::File => "file",
            Self::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BridgeError {
    /// Get the stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Auth(_) => ErrorKind::Auth,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::File(_) => ErrorKind::File,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Check whether this error is of the given kind.
    #[must_use]
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Connectivity(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Connectivity(err.to_string())
        } else if err.is_decode() {
            Self::Transport(format!("malformed response body: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(BridgeError::Auth("x".into()).kind().as_str(), "auth");
        assert_eq!(
            BridgeError::Connectivity("x".into()).kind().as_str(),
            "connectivity"
        );
        assert_eq!(BridgeError::File("x".into()).kind().as_str(), "file");
        assert_eq!(
            BridgeError::Transport("x".into()).kind().as_str(),
            "transport"
        );
        assert_eq!(BridgeError::from(NotFound::NoTeams).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_not_found_messages_distinguish_cause() {
        let channel = BridgeError::from(NotFound::Channel {
            name: "alerts".to_string(),
        });
        assert_eq!(channel.to_string(), "Channel not found: alerts");

        let teams = BridgeError::from(NotFound::NoTeams);
        assert_eq!(teams.to_string(), "Bot is not a member of any team");
    }
}
