//! External delivery of status updates.
//!
//! [`DeliveryService`] subscribes to the [`EventBus`](crate::EventBus) and
//! forwards every received [`StatusUpdate`] to the configured webhook, or
//! only logs it when delivery is suppressed. It runs as a background task
//! and stops once every bus sender is gone.

pub mod webhook;

use std::time::Duration;

use tokio::sync::broadcast;

use crate::bus::StatusUpdate;
use crate::config::NotificationConfig;
use webhook::{WebhookDelivery, WebhookError};

/// Background service draining the bus.
pub struct DeliveryService {
    webhook: Option<WebhookDelivery>,
    prefix: String,
}

impl DeliveryService {
    /// Build the service described by `config`.
    pub fn from_config(config: &NotificationConfig) -> Result<Self, WebhookError> {
        let webhook = match (&config.webhook_url, config.delivers()) {
            (Some(url), true) => Some(WebhookDelivery::new(
                url.clone(),
                Duration::from_secs(config.timeout_secs),
            )?),
            _ => None,
        };
        if webhook.is_none() {
            tracing::warn!("Status notifications are suppressed, updates will only be logged");
        }
        Ok(Self {
            webhook,
            prefix: config.routing_key_prefix.clone(),
        })
    }

    pub fn new(webhook: Option<WebhookDelivery>, prefix: impl Into<String>) -> Self {
        Self {
            webhook,
            prefix: prefix.into(),
        }
    }

    /// Run the delivery loop until the channel is closed.
    ///
    /// Returns the number of updates that could not be delivered.
    pub async fn run(self, mut receiver: broadcast::Receiver<StatusUpdate>) -> usize {
        let mut failed = 0;
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    if !self.handle(&update).await {
                        failed += 1;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification delivery lagged, some updates were dropped");
                    failed += n as usize;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event bus closed, notification delivery shutting down");
                    break;
                }
            }
        }
        failed
    }

    async fn handle(&self, update: &StatusUpdate) -> bool {
        let event_type = update.event_type(&self.prefix);
        let Some(webhook) = &self.webhook else {
            tracing::info!(
                event_type = %event_type,
                request_id = %update.request_id,
                datatype_id = update.datatype_id,
                message = %update.message,
                "Status update (not delivered)"
            );
            return true;
        };

        match webhook.deliver(&self.prefix, update).await {
            Ok(()) => {
                tracing::debug!(
                    event_type = %event_type,
                    request_id = %update.request_id,
                    datatype_id = update.datatype_id,
                    "Status update delivered"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    event_type = %event_type,
                    request_id = %update.request_id,
                    error = %e,
                    "Failed to deliver status update"
                );
                false
            }
        }
    }
}
