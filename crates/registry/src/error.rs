use std::path::PathBuf;

use odm_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error on task registry '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt task registry '{}': {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Task registry belongs to request '{found}', expected '{expected}'")]
    RequestMismatch { expected: String, found: String },

    #[error("Task {0} is not tracked")]
    UnknownTask(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RegistryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
