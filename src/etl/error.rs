use std::path::PathBuf;
use thiserror::Error;

/// Why a pipeline run stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run could not start or finish: database, schema or directory
    /// problems that are not tied to a single input file.
    #[error("Setup failed")]
    Setup(#[source] anyhow::Error),

    /// A single input file could not be loaded.
    #[error("Failed to process {}", .path.display())]
    File {
        path: PathBuf,
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn is_file_failure(&self) -> bool {
        matches!(self, PipelineError::File { .. })
    }
}
