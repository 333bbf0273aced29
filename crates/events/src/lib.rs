//! Request status notifications.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub for [`StatusUpdate`]s,
//!   backed by `tokio::sync::broadcast`.
//! - [`Notifier`] -- the facade the processor calls (`send_task_start`,
//!   `send_task_update`, ...).
//! - [`delivery`] -- forwarding of published updates to an external
//!   webhook, with retry.

pub mod bus;
pub mod config;
pub mod delivery;
pub mod notifier;

pub use bus::{EventBus, NotificationStatus, StatusUpdate};
pub use config::NotificationConfig;
pub use delivery::webhook::{WebhookDelivery, WebhookError};
pub use delivery::DeliveryService;
pub use notifier::Notifier;
