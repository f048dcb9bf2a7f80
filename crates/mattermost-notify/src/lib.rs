//! Notification bridge between a home-automation host and Mattermost.
//!
//! The bridge authenticates with a bot token, resolves channel names to
//! channel ids within the bot's teams, and posts text messages or a single
//! file attachment through the Mattermost REST API v4.
//!
//! # Usage
//!
//! ```no_run
//! use mattermost_notify::{MattermostChannel, NotificationRequest, NotifyConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NotifyConfig::from_env()?;
//! let (channel, _bot) = MattermostChannel::connect(config.credentials()?, &config).await?;
//!
//! let request = NotificationRequest::new("Front door opened")
//!     .with_title("Alarm")
//!     .with_targets(["general", "alerts"]);
//!
//! let report = channel.send_request(&request).await;
//! for (target, error) in report.failures() {
//!     eprintln!("{target}: {error}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! See [`NotifyConfig`]. The most important environment variables are:
//!
//! - `MATTERMOST_URL`: server URL (scheme optional)
//! - `MATTERMOST_TOKEN`: bot access token
//! - `MATTERMOST_DEFAULT_CHANNEL`: channel used when a request names none
//! - `NOTIFY_DISABLED`: set to "true" to disable all notifications
//!
//! # Architecture
//!
//! - [`MattermostClient`] wraps the individual REST calls
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`MattermostChannel`] implements delivery with per-target isolation
//! - [`Notifier`] dispatches requests to all enabled channels

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attachment;
pub mod channels;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod message;
pub mod report;
pub mod setup;

pub use channels::mattermost::MattermostChannel;
pub use channels::NotifyChannel;
pub use client::{ChannelRef, MattermostClient, User};
pub use config::{ConfigError, NotifyConfig};
pub use credentials::Credentials;
pub use error::{BridgeError, ErrorKind, NotFound};
pub use message::{FileSource, MessageAttachment, MessageData, NotificationRequest, Target};
pub use report::{Delivery, SendReport, TargetOutcome};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Central notification dispatcher.
///
/// The `Notifier` manages notification channels and dispatches requests to
/// every enabled channel, either fire-and-forget or waiting for reports.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a notifier from configuration.
    ///
    /// Credentials are not checked against the server here; problems show
    /// up in the reports of the first send.
    #[must_use]
    pub fn from_config(config: &NotifyConfig) -> Self {
        if config.disabled {
            info!("Notifications disabled via NOTIFY_DISABLED");
            return Self::disabled();
        }

        let mut channels: Vec<Arc<dyn NotifyChannel>> = vec![];

        if config.is_configured() {
            let channel = config
                .credentials()
                .map_err(|e| e.to_string())
                .and_then(|creds| MattermostChannel::new(creds, config).map_err(|e| e.to_string()));

            match channel {
                Ok(channel) => {
                    info!("Mattermost notifications enabled");
                    channels.push(Arc::new(channel));
                }
                Err(e) => error!(error = %e, "Invalid Mattermost configuration"),
            }
        }

        if channels.is_empty() {
            warn!("No notification channels configured");
        } else {
            info!(
                channel_count = channels.len(),
                "Notification system initialized"
            );
        }

        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Check if any notification channels are enabled.
    #[must_use]
    pub fn has_channels(&self) -> bool {
        !self.disabled && !self.channels.is_empty()
    }

    /// Get the number of enabled channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        if self.disabled {
            0
        } else {
            self.channels.len()
        }
    }

    /// Send a request to all enabled channels (fire-and-forget).
    ///
    /// This method spawns async tasks for each channel and returns immediately.
    /// Failures are logged but not propagated to the caller.
    pub fn notify(&self, request: NotificationRequest) {
        if self.disabled {
            debug!("Notifications disabled, skipping request");
            return;
        }

        if self.channels.is_empty() {
            debug!("No channels configured, skipping request");
            return;
        }

        let request = Arc::new(request);

        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let request = Arc::clone(&request);

            tokio::spawn(async move {
                let channel_name = channel.name();

                if !channel.enabled() {
                    debug!(channel = channel_name, "Channel disabled, skipping");
                    return;
                }

                let report = channel.send(&request).await;
                if report.is_success() {
                    debug!(channel = channel_name, "Notification sent");
                } else {
                    error!(
                        channel = channel_name,
                        failures = %report.failure_summary(),
                        "Failed to send notification"
                    );
                }
            });
        }
    }

    /// Send a request and wait for all channels to complete.
    ///
    /// Unlike `notify()`, this method waits for every channel and returns
    /// their reports.
    pub async fn notify_and_wait(&self, request: &NotificationRequest) -> Vec<(String, SendReport)> {
        if self.disabled || self.channels.is_empty() {
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            if !channel.enabled() {
                continue;
            }
            let report = channel.send(request).await;
            results.push((channel.name().to_string(), report));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingChannel {
        sends: AtomicUsize,
    }

    #[async_trait]
    impl NotifyChannel for CountingChannel {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn enabled(&self) -> bool {
            true
        }

        async fn send(&self, request: &NotificationRequest) -> SendReport {
            self.sends.fetch_add(1, Ordering::SeqCst);
            SendReport::failed_all(
                &request.targets("fallback"),
                &BridgeError::Transport("offline".to_string()),
            )
        }
    }

    #[test]
    fn test_disabled_notifier() {
        let notifier = Notifier::disabled();
        assert!(!notifier.has_channels());
        assert_eq!(notifier.channel_count(), 0);
    }

    #[test]
    fn test_from_config_without_credentials() {
        let notifier = Notifier::from_config(&NotifyConfig::default());
        assert!(!notifier.has_channels());
    }

    #[test]
    fn test_from_config_disabled() {
        let config = NotifyConfig {
            server_url: Some("chat.example.com".to_string()),
            token: Some("tok".to_string()),
            disabled: true,
            ..NotifyConfig::default()
        };
        let notifier = Notifier::from_config(&config);
        assert_eq!(notifier.channel_count(), 0);
    }

    #[test]
    fn test_from_config_with_credentials() {
        let config = NotifyConfig {
            server_url: Some("chat.example.com".to_string()),
            token: Some("tok".to_string()),
            ..NotifyConfig::default()
        };
        let notifier = Notifier::from_config(&config);
        assert_eq!(notifier.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_notify_and_wait_collects_reports() {
        let channel = Arc::new(CountingChannel {
            sends: AtomicUsize::new(0),
        });
        let notifier = Notifier::with_channels(vec![channel.clone() as Arc<dyn NotifyChannel>]);

        let request = NotificationRequest::new("hi").with_targets(["a", "b"]);
        let results = notifier.notify_and_wait(&request).await;

        assert_eq!(channel.sends.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "counting");
        assert_eq!(results[0].1.failures().count(), 2);
    }
}
