use std::path::PathBuf;

/// Errors from the data lake client.
#[derive(Debug, thiserror::Error)]
pub enum CkanError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The token endpoint rejected the credentials.
    #[error("Authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    /// A CKAN action answered with a non-2xx status.
    #[error("CKAN {action} failed ({status}): {body}")]
    Api {
        action: &'static str,
        status: u16,
        body: String,
    },

    /// A CKAN action answered `success: false`.
    #[error("CKAN {action} rejected the request: {message}")]
    Action {
        action: &'static str,
        message: String,
    },

    #[error("Unexpected CKAN response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing to upload: {0}")]
    NothingToUpload(String),
}

impl CkanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
