//! Facade used by the processor to announce task lifecycle changes.

use std::sync::Arc;

use odm_core::types::DatatypeId;
use tokio::task::JoinHandle;

use crate::bus::{EventBus, NotificationStatus, StatusUpdate};
use crate::config::NotificationConfig;
use crate::delivery::webhook::WebhookError;
use crate::delivery::DeliveryService;

pub const DEFAULT_START_MESSAGE: &str = "ODM Task started";
pub const DEFAULT_END_MESSAGE: &str = "ODM Task completed";

/// Publishes [`StatusUpdate`]s on the shared [`EventBus`].
///
/// Cloning is cheap. The delivery service stops once the last clone is
/// dropped, after draining what was already published.
#[derive(Clone)]
pub struct Notifier {
    bus: Arc<EventBus>,
}

impl Notifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Create a notifier and spawn its [`DeliveryService`].
    ///
    /// Await the returned handle after dropping every notifier clone to
    /// make sure pending updates went out; it yields the number of
    /// updates that could not be delivered.
    pub fn start(config: &NotificationConfig) -> Result<(Self, JoinHandle<usize>), WebhookError> {
        let bus = Arc::new(EventBus::default());
        let service = DeliveryService::from_config(config)?;
        let handle = tokio::spawn(service.run(bus.subscribe()));
        Ok((Self::new(bus), handle))
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StatusUpdate> {
        self.bus.subscribe()
    }

    pub fn send_task_start(&self, request_id: &str, datatype_id: DatatypeId) {
        self.publish(request_id, datatype_id, NotificationStatus::Start, DEFAULT_START_MESSAGE);
    }

    pub fn send_task_update(&self, request_id: &str, datatype_id: DatatypeId, message: impl Into<String>) {
        self.publish(request_id, datatype_id, NotificationStatus::Update, message);
    }

    pub fn send_task_end(&self, request_id: &str, datatype_id: DatatypeId, message: impl Into<String>) {
        self.publish(request_id, datatype_id, NotificationStatus::End, message);
    }

    pub fn send_task_error(&self, request_id: &str, datatype_id: DatatypeId, message: impl Into<String>) {
        self.publish(request_id, datatype_id, NotificationStatus::Error, message);
    }

    fn publish(
        &self,
        request_id: &str,
        datatype_id: DatatypeId,
        status: NotificationStatus,
        message: impl Into<String>,
    ) {
        let update = StatusUpdate::new(request_id, datatype_id, status, message);
        tracing::debug!(
            request_id,
            datatype_id,
            status = %status,
            message = %update.message,
            "Publishing status update"
        );
        if self.bus.publish(update) == 0 {
            tracing::warn!(request_id, datatype_id, status = %status, "No notification subscriber");
        }
    }
}
