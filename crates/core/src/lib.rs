//! Domain types shared by every `odm-tool` crate.
//!
//! - [`request`] -- the `request.json` job descriptor.
//! - [`layout`] -- the on-disk request directory convention.
//! - [`datatype`] -- imagery datatypes (RGB, thermal).
//! - [`status`] -- remote task status codes.
//! - [`naming`] -- remote task names, CKAN titles and resource names.

pub mod datatype;
pub mod error;
pub mod layout;
pub mod naming;
pub mod request;
pub mod status;
pub mod types;

pub use datatype::DataType;
pub use error::CoreError;
pub use layout::{RequestLayout, ResultFiles};
pub use request::ProcessingRequest;
pub use status::TaskStatus;
