//! Notification channel implementations.

pub mod mattermost;

use async_trait::async_trait;

use crate::message::NotificationRequest;
use crate::report::SendReport;

/// Trait for notification channels.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Deliver a request to every target it names.
    ///
    /// Never fails as a whole: each target's outcome is in the report.
    async fn send(&self, request: &NotificationRequest) -> SendReport;
}
