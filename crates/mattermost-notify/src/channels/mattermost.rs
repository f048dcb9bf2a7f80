//! Mattermost notification channel.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::attachment::{self, AttachmentPolicy, LoadedFile};
use crate::client::{ChannelRef, MattermostClient, User};
use crate::config::NotifyConfig;
use crate::credentials::Credentials;
use crate::error::BridgeError;
use crate::message::{Author, MessageAttachment, MessageData, NotificationRequest, PostPayload};
use crate::report::{Delivery, SendReport, TargetOutcome};
use crate::NotifyChannel;

/// Posts notifications to Mattermost channels with a bot token.
#[derive(Debug, Clone)]
pub struct MattermostChannel {
    client: MattermostClient,
    downloads: reqwest::Client,
    default_channel: String,
    policy: AttachmentPolicy,
    author: Author,
}

impl MattermostChannel {
    /// Create a channel from credentials and the remaining settings in
    /// `config`. No request is made; see [`Self::connect`].
    ///
    /// # Errors
    /// Returns [`BridgeError::Transport`] if an HTTP client cannot be built.
    pub fn new(credentials: Credentials, config: &NotifyConfig) -> Result<Self, BridgeError> {
        let policy = AttachmentPolicy::from_config(config);
        Ok(Self {
            client: MattermostClient::new(credentials, config.timeout())?,
            downloads: policy.download_client(config.timeout())?,
            default_channel: config.default_channel.clone(),
            policy,
            author: Author {
                name: config.author_name.clone(),
                icon: config.author_icon.clone(),
            },
        })
    }

    /// Create a channel and validate its credentials against the server.
    ///
    /// # Errors
    /// Returns [`BridgeError::Connectivity`] or [`BridgeError::Auth`] if
    /// validation fails.
    pub async fn connect(
        credentials: Credentials,
        config: &NotifyConfig,
    ) -> Result<(Self, User), BridgeError> {
        let channel = Self::new(credentials, config)?;
        let user = channel.client.validate().await?;
        info!(
            server = %channel.client.credentials().server_url(),
            username = %user.username,
            "Connected to Mattermost"
        );
        Ok((channel, user))
    }

    #[must_use]
    pub fn client(&self) -> &MattermostClient {
        &self.client
    }

    #[must_use]
    pub fn default_channel(&self) -> &str {
        &self.default_channel
    }

    /// Send a request to each of its targets.
    ///
    /// A requested file is loaded once up front; if that fails every target
    /// reports the file error and nothing is posted. Otherwise targets are
    /// handled one after another and independently.
    pub async fn send_request(&self, request: &NotificationRequest) -> SendReport {
        let targets = request.targets(&self.default_channel);
        if targets.is_empty() {
            debug!(channel = "mattermost", "Request has no targets, skipping");
            return SendReport::default();
        }

        let body = request.body();
        let data = request.message_data();

        let (file, attachments): (Option<LoadedFile>, &[MessageAttachment]) = match &data {
            MessageData::Text { attachments } => (None, attachments.as_slice()),
            MessageData::File(source) => {
                match attachment::load(source, &self.policy, &self.downloads).await {
                    Ok(file) => (Some(file), &[] as &[MessageAttachment]),
                    Err(e) => {
                        error!(channel = "mattermost", error = %e, "Failed to load attachment");
                        return SendReport::failed_all(&targets, &e);
                    }
                }
            }
        };

        // Resolutions live for this call only so renamed channels surface
        // on the next send.
        let mut resolved: HashMap<String, ChannelRef> = HashMap::new();
        let mut outcomes = Vec::with_capacity(targets.len());

        for target in targets {
            let result = self
                .deliver(&target, &body, attachments, file.as_ref(), &mut resolved)
                .await;

            match &result {
                Ok(delivery) => info!(
                    channel = "mattermost",
                    target = %target,
                    channel_id = %delivery.channel.channel_id,
                    post_id = %delivery.post_id,
                    "Notification delivered"
                ),
                Err(e) => error!(
                    channel = "mattermost",
                    target = %target,
                    kind = %e.kind(),
                    error = %e,
                    "Failed to deliver notification"
                ),
            }

            outcomes.push(TargetOutcome { target, result });
        }

        SendReport { outcomes }
    }

    async fn deliver(
        &self,
        target: &str,
        body: &str,
        attachments: &[MessageAttachment],
        file: Option<&LoadedFile>,
        resolved: &mut HashMap<String, ChannelRef>,
    ) -> Result<Delivery, BridgeError> {
        let channel = match resolved.get(target) {
            Some(channel) => channel.clone(),
            None => {
                let channel = self.client.resolve_channel(target).await?;
                resolved.insert(target.to_string(), channel.clone());
                channel
            }
        };

        let (payload, file_id) = match file {
            Some(file) => {
                let file_id = self.client.upload_file(&channel.channel_id, file).await?;
                let payload =
                    PostPayload::file(&channel.channel_id, body, file_id.clone(), &self.author);
                (payload, Some(file_id))
            }
            None => (
                PostPayload::text(&channel.channel_id, body, attachments, &self.author),
                None,
            ),
        };

        let post = self.client.create_post(&payload).await?;

        Ok(Delivery {
            channel,
            post_id: post.id,
            file_id,
        })
    }
}

#[async_trait]
impl NotifyChannel for MattermostChannel {
    fn name(&self) -> &'static str {
        "mattermost"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, request: &NotificationRequest) -> SendReport {
        self.send_request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> MattermostChannel {
        let config = NotifyConfig {
            default_channel: "alerts".to_string(),
            ..NotifyConfig::default()
        };
        let creds = Credentials::new("http://127.0.0.1:9", "tok").unwrap();
        MattermostChannel::new(creds, &config).unwrap()
    }

    #[test]
    fn test_channel_identity() {
        let channel = channel();
        assert_eq!(channel.name(), "mattermost");
        assert!(channel.enabled());
        assert_eq!(channel.default_channel(), "alerts");
    }

    #[tokio::test]
    async fn test_empty_target_list_sends_nothing() {
        let channel = channel();
        let request = NotificationRequest::new("hi").with_targets(Vec::<String>::new());
        let report = channel.send_request(&request).await;
        assert!(report.outcomes.is_empty());
    }
}
