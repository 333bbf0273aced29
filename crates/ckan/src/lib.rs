//! Upload of processed drone imagery to a CKAN data lake.
//!
//! - [`KeycloakAuthenticator`] -- OAuth2 password grant with token caching.
//! - [`CkanUploader`] -- package lookup / creation and resource upload.
//! - [`metadata`] -- INSPIRE package metadata and resource descriptors.

pub mod auth;
pub mod config;
pub mod error;
pub mod metadata;
pub mod uploader;

pub use auth::KeycloakAuthenticator;
pub use config::{CkanConfig, DatasetConfig, OAuthConfig};
pub use error::CkanError;
pub use uploader::{CkanUploader, UploadedDataset};
