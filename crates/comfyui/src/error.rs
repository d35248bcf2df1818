use std::path::PathBuf;

use trikot_core::JobError;

/// Errors surfaced by the execution engine adapter.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The ComfyUI API could not be reached.
    #[error("ComfyUI unavailable: {0}")]
    Unavailable(String),

    /// The workflow could not be turned into a prompt.
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// ComfyUI rejected the prompt or failed while running it.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The ComfyUI process could not be started or died during startup.
    #[error("Failed to start ComfyUI: {0}")]
    Spawn(String),

    /// Enumerating output files failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<EngineError> for JobError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(_) | EngineError::Spawn(_) => {
                JobError::EngineUnavailable(err.to_string())
            }
            EngineError::InvalidWorkflow(_) | EngineError::Execution(_) => {
                JobError::Execution(err.to_string())
            }
            EngineError::Io { path, source } => JobError::Filesystem { path, source },
        }
    }
}
