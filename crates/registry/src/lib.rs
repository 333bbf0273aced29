//! Local task registry for a request directory.
//!
//! The registry maps remote task names (`{request_id}_{datatype}`) to the
//! NodeODM task they were submitted as, so that rerunning `process` on the
//! same request adopts existing work instead of resubmitting it.
//!
//! - [`TaskRegistry`] -- load / mutate / atomically save `.odm-tasks.json`.
//! - [`TaskTracker`] -- one tracked remote task.
//! - [`RemoteTask`] / [`Reconciliation`] -- local vs remote comparison.

pub mod error;
pub mod registry;
pub mod tracker;

pub use error::RegistryError;
pub use registry::{Reconciliation, TaskRegistry};
pub use tracker::{RemoteTask, TaskTracker};
