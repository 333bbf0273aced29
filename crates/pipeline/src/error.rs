use std::path::PathBuf;

use odm_ckan::CkanError;
use odm_core::CoreError;
use odm_nodeodm::NodeOdmError;
use odm_registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("NodeODM server is not available: {0}")]
    NodeUnavailable(#[source] NodeOdmError),

    #[error(transparent)]
    NodeOdm(#[from] NodeOdmError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Upload(#[from] CkanError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No tasks were created")]
    NoTasks,

    #[error("Missing result files in '{}'", .0.display())]
    MissingResults(PathBuf),

    #[error("Processing cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error stems from a shutdown request.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::NodeOdm(NodeOdmError::Cancelled)
        )
    }
}
