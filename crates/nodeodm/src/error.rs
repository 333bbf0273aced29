use std::path::PathBuf;

/// Errors from the NodeODM client layer.
#[derive(Debug, thiserror::Error)]
pub enum NodeOdmError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// NodeODM returned a non-2xx status code.
    #[error("NodeODM API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// NodeODM answered 2xx with an `{"error": ...}` body.
    #[error("NodeODM engine error: {0}")]
    Engine(String),

    /// The response body did not match the expected shape.
    #[error("Unexpected NodeODM response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The engine reported a status code this client does not know.
    #[error("Unknown task status code {0}")]
    UnknownStatus(u16),

    /// Local file access failed (image upload, archive download).
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The result archive is corrupt or tries to escape its directory.
    #[error("Invalid result archive: {0}")]
    Archive(String),

    /// The operation was abandoned because shutdown was requested.
    #[error("Operation cancelled")]
    Cancelled,
}

impl NodeOdmError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Connection-level failures and 5xx responses may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeOdmError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            NodeOdmError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
