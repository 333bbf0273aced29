//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`StatusUpdate`]s. It is
//! shared via `Arc<EventBus>` between the [`Notifier`](crate::Notifier)
//! and the delivery service.

use std::fmt;

use chrono::Utc;
use odm_core::types::{DatatypeId, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// StatusUpdate
// ---------------------------------------------------------------------------

/// Phase of a request / datatype pair reported to downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Start,
    Update,
    End,
    Error,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Start => "start",
            NotificationStatus::Update => "update",
            NotificationStatus::End => "end",
            NotificationStatus::Error => "error",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status message about one datatype of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub request_id: String,
    pub datatype_id: DatatypeId,
    pub status: NotificationStatus,
    pub timestamp: Timestamp,
    pub message: String,
}

impl StatusUpdate {
    /// Create an update stamped with the current time.
    pub fn new(
        request_id: impl Into<String>,
        datatype_id: DatatypeId,
        status: NotificationStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            datatype_id,
            status,
            timestamp: Utc::now(),
            message: message.into(),
        }
    }

    /// Dot-separated event type, e.g. `request.status.end`.
    pub fn event_type(&self, prefix: &str) -> String {
        format!("{prefix}.{}", self.status)
    }

    /// Stable id for deduplication on the consumer side.
    pub fn message_id(&self) -> String {
        format!("status-{}-{}-{}", self.request_id, self.datatype_id, self.status)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<StatusUpdate>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed updates are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an update to all current subscribers.
    ///
    /// Returns the number of subscribers that will see it; zero means the
    /// update was dropped.
    pub fn publish(&self, update: StatusUpdate) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
