//! REST client for the Mattermost API v4.

use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::attachment::LoadedFile;
use crate::credentials::Credentials;
use crate::error::{BridgeError, NotFound};
use crate::message::PostPayload;

/// Mattermost REST client bound to one set of credentials.
#[derive(Debug, Clone)]
pub struct MattermostClient {
    credentials: Credentials,
    http: reqwest::Client,
}

/// The authenticated bot account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

/// A channel name resolved to its ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelRef {
    pub team_id: String,
    pub channel_id: String,
    pub name: String,
}

/// A created post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    pub id: String,
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    file_infos: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    id: String,
}

/// Error body returned by the Mattermost API.
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// API call being made, used to map HTTP failures to error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation<'a> {
    Ping,
    Identity,
    ListTeams,
    ListChannels { team_id: &'a str },
    UploadFile,
    CreatePost { channel_id: &'a str },
}

impl Operation<'_> {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Identity => "identity check",
            Self::ListTeams => "team listing",
            Self::ListChannels { .. } => "channel listing",
            Self::UploadFile => "file upload",
            Self::CreatePost { .. } => "post creation",
        }
    }

    /// Map a non-success HTTP status to an error.
    pub(crate) fn classify(self, status: StatusCode, detail: &str) -> BridgeError {
        let message = if detail.is_empty() {
            format!("{} returned {status}", self.as_str())
        } else {
            format!("{} returned {status}: {detail}", self.as_str())
        };

        match (self, status) {
            (Self::Ping, _) => BridgeError::Connectivity(message),
            (Self::ListChannels { team_id }, StatusCode::FORBIDDEN | StatusCode::NOT_FOUND) => {
                NotFound::Team {
                    team_id: team_id.to_string(),
                }
                .into()
            }
            (_, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => BridgeError::Auth(message),
            (
                Self::UploadFile,
                StatusCode::PAYLOAD_TOO_LARGE | StatusCode::BAD_REQUEST | StatusCode::NOT_IMPLEMENTED,
            ) => BridgeError::File(message),
            (Self::CreatePost { channel_id }, StatusCode::NOT_FOUND) => NotFound::StaleChannel {
                channel_id: channel_id.to_string(),
            }
            .into(),
            _ => BridgeError::Transport(message),
        }
    }
}

impl MattermostClient {
    /// Create a client. Every API request is bounded by `timeout`.
    ///
    /// # Errors
    /// Returns [`BridgeError::Transport`] if the HTTP client cannot be built.
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("mattermost-notify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { credentials, http })
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Send an authenticated request and check its status.
    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        operation: Operation<'_>,
    ) -> Result<Response, BridgeError> {
        let request = request.header(AUTHORIZATION, self.credentials.bearer_header()?);
        let response = request.send().await?;
        check_status(response, operation).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: Operation<'_>,
    ) -> Result<T, BridgeError> {
        let request = self.http.get(self.credentials.endpoint(path));
        let response = self.execute(request, operation).await?;
        Ok(response.json().await?)
    }

    // =========================================================================
    // Connectivity and identity
    // =========================================================================

    /// Unauthenticated reachability check.
    ///
    /// # Errors
    /// Returns [`BridgeError::Connectivity`] if the server cannot be reached
    /// or does not answer the ping successfully.
    #[instrument(skip(self), fields(server = %self.credentials.server_url()))]
    pub async fn ping(&self) -> Result<(), BridgeError> {
        let response = self
            .http
            .get(self.credentials.endpoint("/system/ping"))
            .send()
            .await
            .map_err(|e| BridgeError::Connectivity(e.to_string()))?;
        check_status(response, Operation::Ping).await?;
        debug!("Server answered ping");
        Ok(())
    }

    /// Fetch the account the token belongs to.
    ///
    /// # Errors
    /// Returns [`BridgeError::Auth`] if the token is malformed or rejected.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<User, BridgeError> {
        self.get_json("/users/me", Operation::Identity).await
    }

    /// Check reachability, then credentials.
    ///
    /// The two steps fail with distinct kinds: an unreachable server is
    /// [`BridgeError::Connectivity`], a rejected token is
    /// [`BridgeError::Auth`].
    ///
    /// # Errors
    /// See [`Self::ping`] and [`Self::me`].
    pub async fn validate(&self) -> Result<User, BridgeError> {
        self.ping().await?;
        let user = self.me().await?;
        debug!(username = %user.username, "Credentials validated");
        Ok(user)
    }

    // =========================================================================
    // Channel resolution
    // =========================================================================

    /// Teams the bot is a member of.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn teams(&self) -> Result<Vec<Team>, BridgeError> {
        self.get_json("/users/me/teams", Operation::ListTeams).await
    }

    /// Channels of a team the bot is a member of, private ones included.
    ///
    /// # Errors
    /// Returns [`NotFound::Team`] if the server refuses the listing for this
    /// team, or another error if the request fails.
    #[instrument(skip(self))]
    pub async fn member_channels(&self, team_id: &str) -> Result<Vec<Channel>, BridgeError> {
        self.get_json(
            &format!("/users/me/teams/{team_id}/channels"),
            Operation::ListChannels { team_id },
        )
        .await
    }

    /// Resolve a channel name to its ids.
    ///
    /// Only channels the bot is a member of are considered. Teams are
    /// searched in the order the server lists them; within a team the name
    /// must match exactly (case-sensitive). The first match wins. A team
    /// whose channels cannot be listed is skipped.
    ///
    /// # Errors
    /// Returns [`NotFound::NoTeams`] if the bot belongs to no team, or
    /// [`NotFound::Channel`] if none of its channels has this name.
    #[instrument(skip(self))]
    pub async fn resolve_channel(&self, name: &str) -> Result<ChannelRef, BridgeError> {
        let teams = self.teams().await?;
        if teams.is_empty() {
            return Err(NotFound::NoTeams.into());
        }

        for team in &teams {
            let channels = match self.member_channels(&team.id).await {
                Ok(channels) => channels,
                Err(BridgeError::NotFound(NotFound::Team { .. })) => {
                    warn!(team = %team.name, "Skipping team whose channels are not visible");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(channel) = channels.into_iter().find(|c| c.name == name) {
                debug!(team = %team.name, channel_id = %channel.id, "Resolved channel");
                return Ok(ChannelRef {
                    team_id: team.id.clone(),
                    channel_id: channel.id,
                    name: channel.name,
                });
            }
        }

        Err(NotFound::Channel {
            name: name.to_string(),
        }
        .into())
    }

    // =========================================================================
    // Files and posts
    // =========================================================================

    /// Upload a file into a channel and return its file id.
    ///
    /// # Errors
    /// Returns [`BridgeError::File`] if the server rejects the file.
    #[instrument(skip(self, file), fields(filename = %file.filename, size = file.bytes.len()))]
    pub async fn upload_file(
        &self,
        channel_id: &str,
        file: &LoadedFile,
    ) -> Result<String, BridgeError> {
        let part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
        let form = Form::new()
            .text("channel_id", channel_id.to_string())
            .part("files", part);

        let request = self
            .http
            .post(self.credentials.endpoint("/files"))
            .multipart(form);
        let response = self.execute(request, Operation::UploadFile).await?;
        let upload: FileUploadResponse = response.json().await?;

        upload
            .file_infos
            .into_iter()
            .next()
            .map(|info| info.id)
            .ok_or_else(|| BridgeError::Transport("upload response had no file_infos".to_string()))
    }

    /// Create a post.
    ///
    /// # Errors
    /// Returns [`NotFound::StaleChannel`] if the channel vanished, or
    /// [`BridgeError::Auth`] if the bot may not post there.
    #[instrument(skip(self, payload), fields(channel_id = %payload.channel_id))]
    pub async fn create_post(&self, payload: &PostPayload) -> Result<Post, BridgeError> {
        let request = self
            .http
            .post(self.credentials.endpoint("/posts"))
            .json(payload);

        let operation = Operation::CreatePost {
            channel_id: &payload.channel_id,
        };
        let response = self.execute(request, operation).await?;

        Ok(response.json().await?)
    }
}

/// Turn a non-success response into an error, surfacing the API message.
async fn check_status(
    response: Response,
    operation: Operation<'_>,
) -> Result<Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .unwrap_or(body);

    warn!(
        operation = operation.as_str(),
        status = %status,
        detail = %detail,
        "Mattermost request failed"
    );

    Err(operation.classify(status, detail.trim()))
}
