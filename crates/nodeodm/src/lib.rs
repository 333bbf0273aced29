//! NodeODM REST client library.
//!
//! Provides typed response parsing, the HTTP API wrapper, engine
//! processing options, result-archive extraction and retry backoff for
//! talking to a NodeODM photogrammetry node.

pub mod api;
pub mod archive;
pub mod config;
pub mod error;
pub mod messages;
pub mod options;
pub mod retry;

pub use api::NodeOdmApi;
pub use config::NodeOdmConfig;
pub use error::NodeOdmError;
pub use messages::{NodeInfo, TaskInfo};
pub use options::{ProcessingOptions, Quality};
