//! Delivery of formatted notifications.

use async_trait::async_trait;

use super::github::Notification;
use crate::domain::{BroadcastMessage, Targeting};
use crate::error::GatewayError;
use crate::hub::HubHandle;

/// Event kind under which webhook notifications are broadcast.
pub const GITHUB_EVENT_KIND: &str = "github";

/// Destination for formatted notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + std::fmt::Debug {
    /// Delivers one notification.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotificationFailed`] if the notification
    /// could not be handed off.
    async fn send(&self, notification: Notification) -> Result<(), GatewayError>;
}

/// Broadcasts notifications to every session that opted into `send_all`.
#[derive(Debug, Clone)]
pub struct HubNotificationSink {
    hub: HubHandle,
}

impl HubNotificationSink {
    /// Creates a sink that feeds `hub`.
    #[must_use]
    pub const fn new(hub: HubHandle) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl NotificationSink for HubNotificationSink {
    async fn send(&self, notification: Notification) -> Result<(), GatewayError> {
        let payload = serde_json::to_value(&notification)
            .map_err(|e| GatewayError::NotificationFailed(e.to_string()))?;
        self.hub
            .broadcast(BroadcastMessage::new(
                GITHUB_EVENT_KIND,
                Targeting::SendAllOnly,
                payload,
            ))
            .map_err(|e| GatewayError::NotificationFailed(e.to_string()))
    }
}
