//! Failure taxonomy for a single job attempt.
//!
//! Every collaborator error (transfer, engine, filesystem) is converted
//! into a [`JobError`] at the job processor boundary. The set of
//! variants is closed: the consumption loop only needs to know that the
//! attempt failed, and logs need a stable [`kind`](JobError::kind).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The message body is missing required fields or has the wrong shape.
    #[error("Malformed job: {0}")]
    Malformed(String),

    /// A locator uses a scheme the transfer adapter cannot handle.
    #[error("Unsupported locator scheme: {0}")]
    UnsupportedScheme(String),

    /// An input fetch or output publish failed.
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// A workspace directory could not be reset.
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The workflow engine could not be reached.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The workflow engine rejected or failed to run the workflow.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The engine reported success but left no output file behind.
    #[error("Workflow did not generate any output files")]
    NoOutput,
}

impl JobError {
    /// Stable snake_case label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_job",
            Self::UnsupportedScheme(_) => "unsupported_scheme",
            Self::Transfer(_) => "transfer",
            Self::Filesystem { .. } => "filesystem",
            Self::EngineUnavailable(_) => "engine_unavailable",
            Self::Execution(_) => "execution",
            Self::NoOutput => "no_output",
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
